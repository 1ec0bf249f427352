//! Whitespace and bullet cleanup of rendered markdown.

use once_cell::sync::Lazy;
use regex::Regex;

/// Bullet glyphs producers emit in place of a markdown list marker.
pub const BULLET_GLYPHS: &[char] = &['•', '●', '○', '■', '▪', '▫', '◦', '‣', '∙'];

/// Three or more line breaks with only horizontal whitespace between them.
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n(?:[^\S\n]*\n){2,}").unwrap());

static BULLET_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^([^\S\n]*)[•●○■▪▫◦‣∙][^\S\n]*").unwrap());

/// Rewrites a bullet glyph at the start of any line to `- `, keeping indentation.
pub fn replace_bullets(text: &str) -> String {
    BULLET_LINE.replace_all(text, "${1}- ").into_owned()
}

/// Final cleanup pass over rendered markdown.
///
/// Runs of blank or whitespace-only lines collapse to a single blank line,
/// bullet glyphs become `-`, and the result is trimmed and ends in exactly
/// one newline (or is empty).
pub fn normalize(text: &str) -> String {
    let collapsed = BLANK_RUN.replace_all(text, "\n\n");
    let bulleted = replace_bullets(&collapsed);
    let trimmed = bulleted.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}
