//! Command line options shared by the binaries.

use clap::{ArgAction, Args};
use gather_core::geometry::DEFAULT_SAME_LINE_TOLERANCE;
use gather_core::params::GatherParams;

/// Reconstruction knobs, one flag per [`GatherParams`] field.
#[derive(Args, Debug, Clone)]
pub struct ParamArgs {
    /// Max top/bottom/gap difference for two spans to share a line
    #[arg(long = "same-line-tolerance", default_value_t = DEFAULT_SAME_LINE_TOLERANCE)]
    pub same_line_tolerance: f64,

    /// Overlap ratio above which repeated blocks sit at the same position (0-1)
    #[arg(long = "header-overlap", default_value = "0.9", value_parser = parse_fraction)]
    pub header_overlap: f64,

    /// Fraction of pages a block must exceed to count as a running header (0-1)
    #[arg(long = "header-majority", default_value = "0.5", value_parser = parse_fraction)]
    pub header_majority: f64,

    /// Documents shorter than this never have running headers
    #[arg(long = "header-min-pages", default_value = "2")]
    pub header_min_pages: usize,

    /// Fraction of page height treated as top/bottom margin for page-break continuation (0-1)
    #[arg(long = "continuation-margin", default_value = "0.15", value_parser = parse_fraction)]
    pub continuation_margin: f64,

    /// Horizontal misalignment tolerated between a block and its continuation
    #[arg(long = "continuation-x-tolerance", default_value = "50.0")]
    pub continuation_x_tolerance: f64,

    /// Keep blocks tagged as page header/footer
    #[arg(long = "keep-page-furniture", action = ArgAction::SetTrue)]
    pub keep_page_furniture: bool,
}

impl ParamArgs {
    pub fn to_params(&self) -> GatherParams {
        GatherParams {
            same_line_tolerance: self.same_line_tolerance,
            header_overlap_threshold: self.header_overlap,
            header_majority: self.header_majority,
            header_min_pages: self.header_min_pages,
            continuation_margin: self.continuation_margin,
            continuation_x_tolerance: self.continuation_x_tolerance,
            drop_page_furniture: !self.keep_page_furniture,
        }
    }
}

/// Parse a number in [0.0, 1.0].
fn parse_fraction(s: &str) -> Result<f64, String> {
    let v: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("invalid float value: {s}"))?;
    if (0.0..=1.0).contains(&v) {
        Ok(v)
    } else {
        Err(format!("must be between 0.0 and 1.0, got {v}"))
    }
}
