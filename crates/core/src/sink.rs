//! Destinations for finished markdown.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use tempfile::NamedTempFile;

/// Receives the markdown of each finished document.
///
/// Implementations must tolerate repeated calls for the same document id and
/// overwrite: a force-flushed document can be completed again by a late
/// fragment.
pub trait MarkdownSink: Send + Sync {
    fn persist(&self, doc_id: &str, markdown: &str) -> io::Result<()>;
}

/// Writes `{doc_id}.md` into a directory.
#[derive(Debug, Clone)]
pub struct FsSink {
    dir: PathBuf,
}

impl FsSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, doc_id: &str) -> PathBuf {
        self.dir.join(format!("{doc_id}.md"))
    }
}

impl MarkdownSink for FsSink {
    fn persist(&self, doc_id: &str, markdown: &str) -> io::Result<()> {
        let path = self.path_for(doc_id);
        // Each write gets its own temp file beside the target, then renames over it,
        // so readers never see a partial file and concurrent writers never collide.
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(markdown.as_bytes())?;
        tmp.persist(&path).map_err(|e| e.error)?;
        tracing::info!(doc_id, path = %path.display(), bytes = markdown.len(), "markdown saved");
        Ok(())
    }
}

/// Keeps every write in memory, in order.
#[derive(Debug, Default)]
pub struct MemorySink {
    writes: Mutex<Vec<(String, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(doc_id, markdown)` writes so far.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recent markdown written for `doc_id`.
    pub fn latest(&self, doc_id: &str) -> Option<String> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|(id, _)| id == doc_id)
            .map(|(_, md)| md.clone())
    }
}

impl MarkdownSink for MemorySink {
    fn persist(&self, doc_id: &str, markdown: &str) -> io::Result<()> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((doc_id.to_string(), markdown.to_string()));
        Ok(())
    }
}
