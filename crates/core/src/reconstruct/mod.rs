//! Layout-to-markdown reconstruction.
//!
//! The pipeline runs over a fully assembled, ordered set of pages:
//! - [`merge_spans`]: spans into visual lines, per block
//! - [`merge_lines`]: lines into text, and blocks into logical blocks that
//!   may continue across page breaks
//! - [`filter_common_titles`]: drop running headers/footers
//! - [`get_string`]: serialize blocks to markdown
//! - [`normalize`]: collapse blank-line runs and canonicalize bullets

pub mod blocks;
pub mod headers;
pub mod markdown;
pub mod normalize;
pub mod spans;

use crate::model::Page;
use crate::params::GatherParams;

pub use blocks::{FullyMergedBlock, merge_lines};
pub use headers::filter_common_titles;
pub use markdown::get_string;
pub use normalize::{normalize, replace_bullets};
pub use spans::{MergedBlock, MergedLine, merge_spans};

/// Renders assembled pages to markdown.
///
/// Returns an empty string for an empty page list.
pub fn render_markdown(pages: &[Page], params: &GatherParams) -> String {
    if pages.is_empty() {
        return String::new();
    }

    let merged_pages = merge_spans(pages, params);
    let merged_blocks = merge_lines(&merged_pages, pages, params);
    let merged_blocks = filter_common_titles(merged_blocks, pages.len(), params);
    let text = get_string(&merged_blocks);
    normalize(&text)
}
