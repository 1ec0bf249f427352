//! Fragment identity and payload decoding.
//!
//! Producers label every fragment with a composite key
//! `docid_pageIndex_pageCount_groupIndex_groupCount_blockIndex` and a kind
//! tag. [`parse_identity`] is the only validation gate: anything that gets
//! past it is accepted by the aggregation engine.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GatherError, Result};
use crate::model::Page;

/// Number of `_`-delimited parts in a fragment key.
const KEY_PARTS: usize = 6;

/// What a fragment carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    /// A full page skeleton.
    Layout,
    Equation,
    Table,
    Picture,
}

impl FragmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentKind::Layout => "layout",
            FragmentKind::Equation => "equation",
            FragmentKind::Table => "table",
            FragmentKind::Picture => "picture",
        }
    }

    pub fn is_layout(&self) -> bool {
        matches!(self, FragmentKind::Layout)
    }
}

impl FromStr for FragmentKind {
    type Err = GatherError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            // Producers call the layout fragment "text".
            "layout" | "text" => Ok(FragmentKind::Layout),
            "equation" => Ok(FragmentKind::Equation),
            "table" => Ok(FragmentKind::Table),
            "picture" => Ok(FragmentKind::Picture),
            other => Err(GatherError::UnknownFragmentKind(other.to_string())),
        }
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coordinates locating a fragment within its document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FragmentId {
    /// Document id with `/` rewritten to `_`, safe to use as a file stem.
    pub doc_id: String,
    pub page_index: usize,
    pub page_count: usize,
    /// Index of this fragment within its page's block-group.
    pub group_index: usize,
    /// Fragments (layout included) that must arrive before the page is complete.
    pub group_count: usize,
    /// Target block within the page skeleton. Meaningless for layout fragments.
    pub block_index: usize,
    pub kind: FragmentKind,
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{}_{} ({})",
            self.doc_id,
            self.page_index,
            self.page_count,
            self.group_index,
            self.group_count,
            self.block_index,
            self.kind
        )
    }
}

fn parse_index(key: &str, part: &str, name: &str) -> Result<usize> {
    part.trim()
        .parse::<usize>()
        .map_err(|_| GatherError::malformed(key, format!("{name} {part:?} is not a non-negative integer")))
}

/// Decodes a composite fragment key and kind tag.
///
/// Rejects keys that do not split into exactly six parts, non-integer
/// coordinates, zero counts, and indices at or beyond their declared count.
pub fn parse_identity(key: &str, kind: &str) -> Result<FragmentId> {
    let parts: Vec<&str> = key.split('_').collect();
    if parts.len() != KEY_PARTS {
        return Err(GatherError::malformed(
            key,
            format!("expected {KEY_PARTS} parts, found {}", parts.len()),
        ));
    }

    let doc_id = parts[0].trim().replace('/', "_");
    if doc_id.is_empty() {
        return Err(GatherError::malformed(key, "empty document id"));
    }

    let page_index = parse_index(key, parts[1], "page index")?;
    let page_count = parse_index(key, parts[2], "page count")?;
    let group_index = parse_index(key, parts[3], "block-group index")?;
    let group_count = parse_index(key, parts[4], "block-group count")?;
    let block_index = parse_index(key, parts[5], "block index")?;

    if page_index >= page_count {
        return Err(GatherError::malformed(
            key,
            format!("page index {page_index} out of range for {page_count} pages"),
        ));
    }
    if group_index >= group_count {
        return Err(GatherError::malformed(
            key,
            format!("block-group index {group_index} out of range for {group_count} fragments"),
        ));
    }

    let kind = kind.parse::<FragmentKind>()?;

    Ok(FragmentId {
        doc_id,
        page_index,
        page_count,
        group_index,
        group_count,
        block_index,
        kind,
    })
}

/// Kind-specific fragment content.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Layout(Page),
    Text(String),
}

/// One unit of arrival.
#[derive(Clone, Debug, PartialEq)]
pub struct Fragment {
    pub id: FragmentId,
    pub payload: Payload,
}

impl Fragment {
    /// Pairs an identity with a payload, checking that the payload matches the kind.
    pub fn new(id: FragmentId, payload: Payload) -> Result<Self> {
        match (&payload, id.kind.is_layout()) {
            (Payload::Layout(_), true) | (Payload::Text(_), false) => Ok(Self { id, payload }),
            (Payload::Layout(_), false) => Err(GatherError::InvalidPayload {
                kind: id.kind.as_str(),
                reason: "expected recognized text, got a page layout".to_string(),
            }),
            (Payload::Text(_), true) => Err(GatherError::InvalidPayload {
                kind: id.kind.as_str(),
                reason: "expected a page layout, got text".to_string(),
            }),
        }
    }

    /// Decodes a fragment from its key, kind tag and JSON payload.
    ///
    /// Layout payloads are page objects. Equation and table payloads are
    /// `{"text": ...}` objects; a picture's text is optional and defaults to
    /// empty.
    pub fn decode(key: &str, kind: &str, data: Value) -> Result<Self> {
        let id = parse_identity(key, kind)?;
        let payload = match id.kind {
            FragmentKind::Layout => {
                let page: Page =
                    serde_json::from_value(data).map_err(|e| GatherError::InvalidPayload {
                        kind: id.kind.as_str(),
                        reason: e.to_string(),
                    })?;
                Payload::Layout(page)
            }
            FragmentKind::Equation | FragmentKind::Table => {
                let text = data.get("text").and_then(Value::as_str).ok_or_else(|| {
                    GatherError::InvalidPayload {
                        kind: id.kind.as_str(),
                        reason: "missing string field \"text\"".to_string(),
                    }
                })?;
                Payload::Text(text.to_string())
            }
            FragmentKind::Picture => Payload::Text(
                data.get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            ),
        };
        Ok(Self { id, payload })
    }

    pub fn layout(&self) -> Option<&Page> {
        match &self.payload {
            Payload::Layout(page) => Some(page),
            Payload::Text(_) => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(text) => Some(text),
            Payload::Layout(_) => None,
        }
    }
}

/// Routing header of a posted fragment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteInfo {
    /// The composite fragment key.
    pub uuid: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// The body producers post for each fragment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "routeInfo")]
    pub route_info: RouteInfo,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Reads a captured request body from disk.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_slice(&bytes)
    }

    pub fn into_fragment(self) -> Result<Fragment> {
        Fragment::decode(&self.route_info.uuid, &self.route_info.kind, self.data)
    }
}
