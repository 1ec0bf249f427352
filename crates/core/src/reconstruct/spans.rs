//! Span-to-line grouping.

use itertools::Itertools;

use crate::geometry::{self, BBox};
use crate::model::{BlockType, Page, Span};
use crate::params::GatherParams;

/// A visual line rebuilt from one or more spans.
#[derive(Clone, Debug, PartialEq)]
pub struct MergedLine {
    pub text: String,
    pub bbox: BBox,
}

/// A block whose spans have been grouped into lines.
#[derive(Clone, Debug, PartialEq)]
pub struct MergedBlock {
    pub lines: Vec<MergedLine>,
    pub bbox: BBox,
    pub block_type: BlockType,
    /// Position of the owning page in the document.
    pub pnum: usize,
}

impl MergedBlock {
    pub fn text_is_blank(&self) -> bool {
        self.lines.iter().all(|l| l.text.trim().is_empty())
    }

    /// Line texts joined by single spaces.
    pub fn text(&self) -> String {
        self.lines.iter().map(|l| l.text.as_str()).join(" ")
    }
}

/// Groups each block's spans into lines.
///
/// Spans are scanned in order; a span joins the current line when it sits
/// on the same row as the line's trailing span (see [`geometry::same_line`]),
/// otherwise it starts a new line. A span whose box is malformed keeps its
/// text but is never merged with a neighbour. Blocks without any visible text are
/// dropped, as are page-header/footer blocks when
/// [`GatherParams::drop_page_furniture`] is set.
///
/// Returns one list of blocks per input page, in page order.
pub fn merge_spans(pages: &[Page], params: &GatherParams) -> Vec<Vec<MergedBlock>> {
    pages
        .iter()
        .enumerate()
        .map(|(pnum, page)| {
            page.blocks
                .iter()
                .filter(|block| !(params.drop_page_furniture && block.block_type.is_page_furniture()))
                .filter_map(|block| {
                    let lines = group_spans(
                        block.lines.iter().flat_map(|l| l.spans.iter()),
                        params.same_line_tolerance,
                    );
                    let merged = MergedBlock {
                        lines,
                        bbox: block.bbox,
                        block_type: block.block_type,
                        pnum,
                    };
                    (!merged.text_is_blank()).then_some(merged)
                })
                .collect()
        })
        .collect()
}

fn group_spans<'a>(
    spans: impl Iterator<Item = &'a Span>,
    tolerance: f64,
) -> Vec<MergedLine> {
    let mut lines: Vec<MergedLine> = Vec::new();
    let mut trailing: Option<BBox> = None;

    for span in spans {
        if span.bbox.is_malformed() {
            tracing::warn!(bbox = ?span.bbox, text = %span.text, "span has a malformed box");
            lines.push(MergedLine {
                text: span.text.clone(),
                bbox: span.bbox,
            });
            trailing = None;
            continue;
        }
        match (lines.last_mut(), trailing) {
            (Some(line), Some(prev)) if geometry::same_line(&prev, &span.bbox, tolerance) => {
                if needs_space(&line.text, &span.text, &prev, &span.bbox) {
                    line.text.push(' ');
                }
                line.text.push_str(&span.text);
                line.bbox = geometry::union(&line.bbox, &span.bbox);
            }
            _ => lines.push(MergedLine {
                text: span.text.clone(),
                bbox: span.bbox,
            }),
        }
        trailing = Some(span.bbox);
    }

    lines
}

/// Spans separated by a visible gap are separate words unless either side
/// already carries the whitespace.
fn needs_space(left: &str, right: &str, prev: &BBox, next: &BBox) -> bool {
    next.x0 > prev.x1
        && !left.is_empty()
        && !right.is_empty()
        && !left.ends_with(char::is_whitespace)
        && !right.starts_with(char::is_whitespace)
}
