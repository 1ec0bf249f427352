//! Page layout types: Page, Block, Line, Span.
//!
//! These mirror the JSON that layout producers emit for a page skeleton. Every
//! cosmetic field is optional so partially populated skeletons still decode.

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::geometry::{self, BBox};

/// Structural role of a block, as tagged by the layout model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "SmolStr", into = "SmolStr")]
pub enum BlockType {
    #[default]
    Text,
    Title,
    SectionHeader,
    ListItem,
    Table,
    Equation,
    Picture,
    Caption,
    Footnote,
    Code,
    PageHeader,
    PageFooter,
    Other,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Text => "Text",
            BlockType::Title => "Title",
            BlockType::SectionHeader => "Section-header",
            BlockType::ListItem => "List-item",
            BlockType::Table => "Table",
            BlockType::Equation => "Formula",
            BlockType::Picture => "Picture",
            BlockType::Caption => "Caption",
            BlockType::Footnote => "Footnote",
            BlockType::Code => "Code",
            BlockType::PageHeader => "Page-header",
            BlockType::PageFooter => "Page-footer",
            BlockType::Other => "Other",
        }
    }

    pub fn is_heading(&self) -> bool {
        matches!(self, BlockType::Title | BlockType::SectionHeader)
    }

    /// Running prose whose lines reflow into paragraphs.
    pub fn is_flowing(&self) -> bool {
        matches!(
            self,
            BlockType::Text
                | BlockType::ListItem
                | BlockType::Caption
                | BlockType::Footnote
                | BlockType::Other
        )
    }

    /// Blocks whose text comes from a separate recognizer, not the layout pass.
    pub fn is_recognized(&self) -> bool {
        matches!(
            self,
            BlockType::Table | BlockType::Equation | BlockType::Picture
        )
    }

    pub fn is_page_furniture(&self) -> bool {
        matches!(self, BlockType::PageHeader | BlockType::PageFooter)
    }
}

impl From<&str> for BlockType {
    fn from(s: &str) -> Self {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "text" | "paragraph" | "plaintext" => BlockType::Text,
            "title" | "doctitle" => BlockType::Title,
            "sectionheader" | "heading" | "header" => BlockType::SectionHeader,
            "listitem" | "list" => BlockType::ListItem,
            "table" => BlockType::Table,
            "formula" | "equation" => BlockType::Equation,
            "picture" | "figure" | "image" => BlockType::Picture,
            "caption" | "tablecaption" | "figurecaption" => BlockType::Caption,
            "footnote" => BlockType::Footnote,
            "code" => BlockType::Code,
            "pageheader" => BlockType::PageHeader,
            "pagefooter" => BlockType::PageFooter,
            _ => BlockType::Other,
        }
    }
}

impl From<SmolStr> for BlockType {
    fn from(s: SmolStr) -> Self {
        BlockType::from(s.as_str())
    }
}

impl From<BlockType> for SmolStr {
    fn from(t: BlockType) -> Self {
        SmolStr::new_static(t.as_str())
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Smallest text-bearing unit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub bbox: BBox,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_type: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<SmolStr>,
}

impl Span {
    pub fn new(bbox: BBox, text: impl Into<String>) -> Self {
        Self {
            bbox,
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Spans sharing a visual row.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub bbox: BBox,
    #[serde(default)]
    pub spans: Vec<Span>,
}

impl Line {
    /// Builds a line whose box is the union of its spans' boxes.
    pub fn from_spans(spans: Vec<Span>) -> Self {
        let bbox = spans
            .iter()
            .map(|s| s.bbox)
            .reduce(|a, b| geometry::union(&a, &b))
            .unwrap_or_default();
        Self { bbox, spans }
    }

    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }
}

/// Structural unit of a page.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub bbox: BBox,
    #[serde(default)]
    pub block_type: BlockType,
    #[serde(default)]
    pub lines: Vec<Line>,
}

impl Block {
    pub fn new(bbox: BBox, block_type: BlockType) -> Self {
        Self {
            bbox,
            block_type,
            lines: Vec::new(),
        }
    }

    /// Replaces the block's lines with a single line carrying `text`.
    ///
    /// Used to fill recognized blocks (tables, equations, pictures) whose text
    /// arrives separately from the page skeleton.
    pub fn fill_text(&mut self, text: &str) {
        self.lines = vec![Line {
            bbox: self.bbox,
            spans: vec![Span::new(self.bbox, text)],
        }];
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.spans.is_empty())
    }

    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(Line::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One page of a document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub pnum: usize,
    /// Page extent, when the producer reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl Page {
    /// A page with no blocks, standing in for a skeleton that never arrived.
    pub fn empty(pnum: usize) -> Self {
        Self {
            pnum,
            ..Default::default()
        }
    }

    /// The reported page box, else `[0, 0, width, height]`, else the union
    /// of all block boxes anchored at the origin.
    pub fn extent(&self) -> BBox {
        if let Some(bbox) = self.bbox {
            return bbox;
        }
        if let (Some(width), Some(height)) = (self.width, self.height) {
            return BBox::new(0.0, 0.0, width, height);
        }
        self.blocks
            .iter()
            .map(|b| b.bbox)
            .reduce(|a, b| geometry::union(&a, &b))
            .map(|b| BBox::new(0.0, 0.0, b.x1, b.bottom))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_type_aliases() {
        assert_eq!(BlockType::from("Section-header"), BlockType::SectionHeader);
        assert_eq!(BlockType::from("section_header"), BlockType::SectionHeader);
        assert_eq!(BlockType::from("List-item"), BlockType::ListItem);
        assert_eq!(BlockType::from("Formula"), BlockType::Equation);
        assert_eq!(BlockType::from("figure"), BlockType::Picture);
        assert_eq!(BlockType::from("Page-footer"), BlockType::PageFooter);
        assert_eq!(BlockType::from("sidebar"), BlockType::Other);
    }

    #[test]
    fn test_page_decodes_with_optional_fields_missing() {
        let json = r#"{
            "pnum": 3,
            "blocks": [
                {"bbox": [0, 0, 100, 20], "block_type": "Title",
                 "lines": [{"bbox": [0, 0, 100, 20],
                            "spans": [{"bbox": [0, 0, 100, 20], "text": "Intro", "font": "Arial", "color": 0}]}]},
                {"bbox": [0, 30, 100, 80], "block_type": "Table"}
            ]
        }"#;
        let page: Page = serde_json::from_str(json).unwrap();
        assert_eq!(page.pnum, 3);
        assert_eq!(page.blocks.len(), 2);
        assert_eq!(page.blocks[0].block_type, BlockType::Title);
        assert_eq!(page.blocks[0].text(), "Intro");
        assert!(page.blocks[1].is_empty());
        assert_eq!(page.extent(), BBox::new(0.0, 0.0, 100.0, 80.0));
    }

    #[test]
    fn test_extent_prefers_reported_size() {
        let page: Page = serde_json::from_str(
            r#"{"width": 612, "height": 792, "blocks": [{"bbox": [10, 10, 50, 50]}]}"#,
        )
        .unwrap();
        assert_eq!(page.extent(), BBox::new(0.0, 0.0, 612.0, 792.0));
        assert_eq!(Page::empty(4).extent(), BBox::default());
    }

    #[test]
    fn test_fill_text_uses_block_bbox() {
        let mut block = Block::new(BBox::new(1.0, 2.0, 3.0, 4.0), BlockType::Table);
        block.fill_text("| a | b |");
        assert_eq!(block.lines.len(), 1);
        assert_eq!(block.lines[0].bbox, block.bbox);
        assert_eq!(block.lines[0].spans[0].bbox, block.bbox);
        assert_eq!(block.text(), "| a | b |");
    }

    #[test]
    fn test_line_from_spans_unions_boxes() {
        let line = Line::from_spans(vec![
            Span::new(BBox::new(0.0, 0.0, 10.0, 10.0), "a"),
            Span::new(BBox::new(12.0, 1.0, 20.0, 11.0), "b"),
        ]);
        assert_eq!(line.bbox, BBox::new(0.0, 0.0, 20.0, 11.0));
        assert_eq!(line.text(), "ab");
    }
}
