//! Reconstruction and aggregation parameters.

use std::time::Duration;

use crate::geometry::DEFAULT_SAME_LINE_TOLERANCE;

/// Parameters for turning assembled pages into markdown.
///
/// Controls how spans are grouped into lines, how blocks continue across
/// page breaks, and which blocks count as running headers/footers.
#[derive(Debug, Clone, PartialEq)]
pub struct GatherParams {
    /// Two spans are on the same line if their tops and bottoms agree, and
    /// the gap between them is, within this many coordinate units.
    pub same_line_tolerance: f64,

    /// Two repeated blocks sit at the same page position when the overlap
    /// ratio of their normalized boxes exceeds this fraction.
    pub header_overlap_threshold: f64,

    /// A repeated block is a running header/footer when it appears on more
    /// than this fraction of the document's pages.
    pub header_majority: f64,

    /// Documents with fewer pages than this never have running headers.
    pub header_min_pages: usize,

    /// Fraction of the page height treated as the top/bottom margin when
    /// deciding whether a block continues across a page break.
    pub continuation_margin: f64,

    /// Horizontal misalignment tolerated between a block and its continuation.
    pub continuation_x_tolerance: f64,

    /// Drop blocks the layout model already tagged as page header/footer.
    pub drop_page_furniture: bool,
}

impl Default for GatherParams {
    fn default() -> Self {
        Self {
            same_line_tolerance: DEFAULT_SAME_LINE_TOLERANCE,
            header_overlap_threshold: 0.9,
            header_majority: 0.5,
            header_min_pages: 2,
            continuation_margin: 0.15,
            continuation_x_tolerance: 50.0,
            drop_page_furniture: true,
        }
    }
}

/// Timing knobs for the aggregation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// A document with no new fragment for this long is force-flushed.
    pub stale_after: Duration,
    /// How often the background sweeper scans for stale documents.
    pub sweep_interval: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(10),
        }
    }
}
