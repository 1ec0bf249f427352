//! Markdown serialization of merged blocks.

use crate::model::BlockType;

use super::blocks::FullyMergedBlock;
use super::normalize::BULLET_GLYPHS;

fn starts_with_marker(text: &str) -> bool {
    let t = text.trim_start();
    if t.starts_with("- ") || t.starts_with("* ") || t.starts_with(BULLET_GLYPHS) {
        return true;
    }
    // Ordered list: "1." or "1)"
    let digits = t.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && matches!(t[digits..].chars().next(), Some('.' | ')'))
}

/// Wraps a block's text in the markdown its type calls for.
///
/// Recognized content (tables, equations, pictures) is emitted verbatim,
/// set off by blank lines.
fn block_surround(text: &str, block_type: BlockType) -> String {
    match block_type {
        BlockType::Title if !text.starts_with('#') => format!("# {}\n", text.trim()),
        BlockType::SectionHeader if !text.starts_with('#') => format!("\n## {}\n", text.trim()),
        BlockType::ListItem if !starts_with_marker(text) => format!("- {}", text.trim_start()),
        BlockType::Table | BlockType::Equation | BlockType::Picture => format!("\n{text}\n"),
        BlockType::Code => format!("\n```\n{}\n```\n", text.trim_matches('\n')),
        _ => text.to_string(),
    }
}

/// Consecutive list items stay tight; every other boundary is a paragraph break.
fn block_separator(prev: BlockType, next: BlockType) -> &'static str {
    if prev == BlockType::ListItem && next == BlockType::ListItem {
        "\n"
    } else {
        "\n\n"
    }
}

/// Renders merged blocks to markdown in document order.
pub fn get_string(blocks: &[FullyMergedBlock]) -> String {
    let mut out = String::new();
    let mut prev: Option<BlockType> = None;
    for block in blocks {
        if let Some(prev_type) = prev {
            out.push_str(block_separator(prev_type, block.block_type));
        }
        out.push_str(&block_surround(&block.text, block.block_type));
        prev = Some(block.block_type);
    }
    out
}
