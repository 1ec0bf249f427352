//! gather - reassembles out-of-order document fragments and renders them to markdown.
//!
//! Upstream producers emit one layout skeleton per page plus recognized text
//! for the page's equation, table and picture blocks. The [`aggregate`] engine
//! collects those fragments per document, and once a document is complete (or
//! has stalled) the [`reconstruct`] pipeline turns its pages into markdown.

pub mod aggregate;
pub mod error;
pub mod fragment;
pub mod geometry;
pub mod model;
pub mod params;
pub mod reconstruct;
pub mod sink;

pub use aggregate::{Aggregator, Completion, CompletionReason, SubmitOutcome};
pub use error::{GatherError, Result};
pub use fragment::{Envelope, Fragment, FragmentId, FragmentKind, Payload, RouteInfo, parse_identity};
pub use geometry::BBox;
pub use model::{Block, BlockType, Line, Page, Span};
pub use params::{AggregatorConfig, GatherParams};
pub use reconstruct::render_markdown;
pub use sink::{FsSink, MarkdownSink, MemorySink};
