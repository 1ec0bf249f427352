//! Per-document fragment collection.

use std::time::Instant;

use rustc_hash::FxHashMap;

use crate::error::{GatherError, Result};
use crate::fragment::Fragment;
use crate::model::Page;

use super::page::PageAggregate;

/// Everything received so far for one in-flight document.
#[derive(Debug, Clone)]
pub struct DocumentAggregate {
    doc_id: String,
    page_count: usize,
    pages: FxHashMap<usize, PageAggregate>,
    last_activity: Instant,
}

impl DocumentAggregate {
    pub fn new(doc_id: impl Into<String>, page_count: usize, now: Instant) -> Self {
        Self {
            doc_id: doc_id.into(),
            page_count,
            pages: FxHashMap::default(),
            last_activity: now,
        }
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Fragments held across all pages.
    pub fn received(&self) -> usize {
        self.pages.values().map(PageAggregate::received).sum()
    }

    /// Rejects a fragment whose coordinates fall outside what this document
    /// already declared. Never mutates.
    pub fn check(&self, fragment: &Fragment) -> Result<()> {
        let id = &fragment.id;
        if id.page_index >= self.page_count {
            return Err(GatherError::MalformedIdentity {
                key: id.to_string(),
                reason: format!(
                    "page index {} out of range for document {} with {} pages",
                    id.page_index, self.doc_id, self.page_count
                ),
            });
        }
        if let Some(page) = self.pages.get(&id.page_index) {
            if id.group_index >= page.group_count() {
                return Err(GatherError::MalformedIdentity {
                    key: id.to_string(),
                    reason: format!(
                        "block-group index {} out of range for page {} with {} fragments",
                        id.group_index,
                        id.page_index,
                        page.group_count()
                    ),
                });
            }
        }
        Ok(())
    }

    /// Stores a fragment and refreshes the activity timestamp.
    ///
    /// Callers run [`Self::check`] first. Declared counts are fixed by the
    /// first fragment to mention them; later disagreements are logged and
    /// ignored.
    pub fn insert(&mut self, fragment: Fragment, now: Instant) {
        self.last_activity = now;
        let id = &fragment.id;

        if id.page_count != self.page_count {
            tracing::warn!(
                doc_id = %self.doc_id,
                declared = self.page_count,
                got = id.page_count,
                "page count disagrees with earlier fragments"
            );
        }

        let page_index = id.page_index;
        let page = self
            .pages
            .entry(page_index)
            .or_insert_with(|| PageAggregate::new(fragment.id.group_count));
        if fragment.id.group_count != page.group_count() {
            tracing::warn!(
                doc_id = %self.doc_id,
                page = page_index,
                declared = page.group_count(),
                got = fragment.id.group_count,
                "block-group count disagrees with earlier fragments"
            );
        }

        tracing::debug!(doc_id = %self.doc_id, fragment = %fragment.id, "fragment stored");
        page.insert(fragment);

        if page.is_complete() {
            tracing::info!(doc_id = %self.doc_id, page = page_index, "page complete");
        }
    }

    /// Every declared page is present and complete.
    pub fn is_complete(&self) -> bool {
        (0..self.page_count).all(|i| self.pages.get(&i).is_some_and(PageAggregate::is_complete))
    }

    /// Pages `0..page_count` in order, with empty pages standing in for
    /// pages that never received a skeleton.
    pub fn assemble(mut self) -> Vec<Page> {
        (0..self.page_count)
            .map(|i| match self.pages.remove(&i) {
                Some(page) => page.assemble(i),
                None => Page::empty(i),
            })
            .collect()
    }
}
