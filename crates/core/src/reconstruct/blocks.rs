//! Line-to-text joining and block continuation across boundaries.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::geometry::{self, BBox};
use crate::model::{BlockType, Page};
use crate::params::GatherParams;

use super::headers::repeated_text;
use super::spans::{MergedBlock, MergedLine};

/// Small epsilon for comparing line geometry.
const EPSILON: f64 = 1e-9;

/// Characters inspected at the end of the text built so far when choosing a
/// separator. The patterns below only look a few characters back.
const TAIL_CHARS: usize = 8;

static HYPHEN_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{Lo}\p{Ll}\d][-—¬]\s?$").unwrap());
static HYPHEN_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-—¬]\s?$").unwrap());
static LOWER_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s?[\p{Lo}\p{Ll}\d]").unwrap());
static OPEN_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\p{Lo}\p{Ll}\d][,;(—"'*]?\s?$"#).unwrap());
static LETTER_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s?[\p{L}\d]").unwrap());
static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[。ๆ.?!]\s?$").unwrap());

/// A logical block spanning one or more layout blocks, possibly across pages.
#[derive(Clone, Debug, PartialEq)]
pub struct FullyMergedBlock {
    pub text: String,
    /// Type of the first constituent block.
    pub block_type: BlockType,
    /// Page of the first constituent block.
    pub pnum: usize,
    /// Page of the last constituent block.
    pub last_pnum: usize,
    /// Box of the first constituent block, normalized to the 0-1000 page space.
    pub bbox: BBox,
}

impl FullyMergedBlock {
    pub fn spans_pages(&self) -> bool {
        self.pnum != self.last_pnum
    }
}

fn tail(s: &str, n: usize) -> &str {
    match s.char_indices().rev().nth(n.saturating_sub(1)) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// Appends `next` to `text`, choosing how the two lines join.
///
/// A hyphen splitting a lowercase word is removed and the halves joined;
/// headings and mid-sentence breaks join with a space; sentence ends in
/// running prose and table rows start a new paragraph; anything else keeps
/// its line break.
pub fn join_line(text: &mut String, next: &str, block_type: BlockType, is_continuation: bool) {
    let end = tail(text, TAIL_CHARS);

    if HYPHEN_END.is_match(end) && LOWER_START.is_match(next) {
        let cut = HYPHEN_STRIP.find(end).map(|m| text.len() - end.len() + m.start());
        if let Some(cut) = cut {
            text.truncate(cut);
        }
        let trimmed = text.trim_end().len();
        text.truncate(trimmed);
        text.push_str(next.trim_start());
        return;
    }

    let sep = if block_type.is_heading() {
        " "
    } else if block_type == BlockType::Equation {
        "\n"
    } else if (OPEN_END.is_match(end) && LETTER_START.is_match(next) && block_type.is_flowing())
        || is_continuation
    {
        " "
    } else if block_type.is_flowing() && SENTENCE_END.is_match(end) {
        "\n\n"
    } else if block_type == BlockType::Table {
        "\n\n"
    } else {
        "\n"
    };

    if sep == " " {
        let trimmed = text.trim_end().len();
        text.truncate(trimmed);
        text.push(' ');
        text.push_str(next.trim_start());
    } else {
        text.push_str(sep);
        text.push_str(next);
    }
}

fn ends_sentence(text: &str) -> bool {
    SENTENCE_END.is_match(tail(text, TAIL_CHARS))
}

/// Box relative to its page, scaled into the 0-1000 space.
pub(crate) fn page_relative(bbox: &BBox, extent: &BBox) -> BBox {
    let shifted = BBox::new(
        bbox.x0 - extent.x0,
        bbox.top - extent.top,
        bbox.x1 - extent.x0,
        bbox.bottom - extent.top,
    );
    geometry::normalize(&shifted, extent.width(), extent.height())
}

struct BlockBuilder {
    text: String,
    block_type: BlockType,
    pnum: usize,
    last_pnum: usize,
    bbox: BBox,
    last_bbox: BBox,
    prev_line: Option<BBox>,
}

impl BlockBuilder {
    fn new(block: &MergedBlock, extents: &[BBox]) -> Self {
        let extent = extents.get(block.pnum).copied().unwrap_or_default();
        let mut builder = Self {
            text: String::new(),
            block_type: block.block_type,
            pnum: block.pnum,
            last_pnum: block.pnum,
            bbox: page_relative(&block.bbox, &extent),
            last_bbox: block.bbox,
            prev_line: None,
        };
        builder.push_lines(&block.lines);
        builder
    }

    fn extend(&mut self, block: &MergedBlock) {
        self.last_pnum = block.pnum;
        self.last_bbox = block.bbox;
        self.push_lines(&block.lines);
    }

    fn push_lines(&mut self, lines: &[MergedLine]) {
        for line in lines {
            let is_continuation = self.prev_line.is_some_and(|prev| {
                (prev.height() - line.bbox.height()).abs() < EPSILON
                    && (prev.x0 - line.bbox.x0).abs() < EPSILON
            });
            self.prev_line = Some(line.bbox);

            if self.text.is_empty() {
                self.text.push_str(&line.text);
            } else {
                join_line(&mut self.text, &line.text, self.block_type, is_continuation);
            }
        }
    }

    /// Whether `next` picks up where this block left off.
    fn continues_into(&self, next: &MergedBlock, extents: &[BBox], params: &GatherParams) -> bool {
        if self.block_type.is_recognized() || next.block_type.is_recognized() {
            return false;
        }

        let prev = &self.last_bbox;
        let cur = &next.bbox;

        if next.pnum == self.last_pnum {
            // A block the layout model split in two: same type, abutting, overlapping columns.
            let gap = cur.top - prev.bottom;
            return self.block_type == next.block_type
                && gap > -params.same_line_tolerance
                && gap <= params.same_line_tolerance
                && prev.x0 < cur.x1
                && cur.x0 < prev.x1;
        }

        if next.pnum != self.last_pnum + 1 {
            return false;
        }

        let types_compatible = self.block_type == next.block_type
            || (self.block_type.is_flowing() && next.block_type.is_flowing());
        if !types_compatible || ends_sentence(&self.text) {
            return false;
        }

        let (Some(prev_ext), Some(next_ext)) = (extents.get(self.last_pnum), extents.get(next.pnum))
        else {
            return false;
        };
        let at_bottom = prev.bottom >= prev_ext.bottom - params.continuation_margin * prev_ext.height();
        let at_top = cur.top <= next_ext.top + params.continuation_margin * next_ext.height();
        let aligned = (prev.x0 - cur.x0).abs() <= params.continuation_x_tolerance;

        at_bottom && at_top && aligned
    }

    fn finish(self) -> FullyMergedBlock {
        FullyMergedBlock {
            text: self.text,
            block_type: self.block_type,
            pnum: self.pnum,
            last_pnum: self.last_pnum,
            bbox: self.bbox,
        }
    }
}

/// Joins lines into block text and merges blocks that continue one another.
///
/// `merged_pages` is the output of [`super::merge_spans`]; `pages` supplies
/// the page extents used to recognize a block running off the bottom of one
/// page onto the top of the next. Merged blocks keep the type of their first
/// constituent.
///
/// Blocks whose text repeats at the same page position across most pages
/// are held aside and do not interrupt an open block, so a running header
/// sitting between a paragraph and its continuation on the next page does
/// not split it. Held blocks are
/// emitted right after the block they interrupted.
pub fn merge_lines(
    merged_pages: &[Vec<MergedBlock>],
    pages: &[Page],
    params: &GatherParams,
) -> Vec<FullyMergedBlock> {
    let extents: Vec<BBox> = pages.iter().map(Page::extent).collect();
    let repeated = repeated_text(merged_pages, &extents, params);
    let mut out = Vec::new();
    let mut held = Vec::new();
    let mut current: Option<BlockBuilder> = None;

    for (pnum, blocks) in merged_pages.iter().enumerate() {
        for (idx, block) in blocks.iter().enumerate() {
            if repeated.contains(&(pnum, idx)) {
                let running = BlockBuilder::new(block, &extents).finish();
                if current.is_some() {
                    held.push(running);
                } else {
                    out.push(running);
                }
                continue;
            }
            match current.as_mut() {
                Some(builder) if builder.continues_into(block, &extents, params) => {
                    builder.extend(block);
                }
                _ => {
                    if let Some(done) = current.replace(BlockBuilder::new(block, &extents)) {
                        out.push(done.finish());
                    }
                    out.append(&mut held);
                }
            }
        }
    }
    if let Some(done) = current {
        out.push(done.finish());
    }
    out.append(&mut held);

    out
}
