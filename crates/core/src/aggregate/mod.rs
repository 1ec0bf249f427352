//! The aggregation engine.
//!
//! An [`Aggregator`] owns the table of in-flight documents. Each document
//! moves through Open (first fragment) to Complete or Flushed (stale), and is
//! removed from the table in the same critical section that decides it is
//! finished. Assembly, rendering and persistence run after the lock is
//! released. A doc id stays claimed while it is being finished; a second
//! completion of the same id (a late fragment that opened a new aggregate)
//! waits for the claim, so two threads never finish the same document at once.

pub mod document;
pub mod page;

use std::collections::hash_map::Entry;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{GatherError, Result};
use crate::fragment::Fragment;
use crate::params::{AggregatorConfig, GatherParams};
use crate::reconstruct::render_markdown;
use crate::sink::MarkdownSink;

pub use document::DocumentAggregate;
pub use page::PageAggregate;

/// Why a document left the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionReason {
    /// Every expected fragment arrived.
    Complete,
    /// No fragment arrived within the staleness window.
    Stale,
    /// Flushed on demand, e.g. at shutdown.
    Forced,
}

/// A finished, persisted document.
#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub doc_id: String,
    pub markdown: String,
    pub reason: CompletionReason,
    pub pages: usize,
    /// Fragments that contributed to the document.
    pub fragments: usize,
}

/// Result of a successful submission.
#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    /// Stored; the document is still waiting for fragments.
    Pending,
    /// This fragment completed its document.
    Completed(Completion),
}

#[derive(Default)]
struct Table {
    docs: FxHashMap<String, DocumentAggregate>,
    /// Doc ids removed from `docs` whose markdown is still being produced.
    finishing: FxHashSet<String>,
}

/// Releases a finishing claim when dropped, even if rendering panics.
struct Claim<'a, S: MarkdownSink> {
    aggregator: &'a Aggregator<S>,
    doc_id: String,
}

impl<S: MarkdownSink> Drop for Claim<'_, S> {
    fn drop(&mut self) {
        self.aggregator.lock().finishing.remove(&self.doc_id);
        self.aggregator.released.notify_all();
    }
}

/// Collects fragments per document and emits markdown when documents finish.
pub struct Aggregator<S: MarkdownSink> {
    table: Mutex<Table>,
    released: Condvar,
    sink: S,
    params: GatherParams,
    config: AggregatorConfig,
}

impl<S: MarkdownSink> Aggregator<S> {
    pub fn new(sink: S, params: GatherParams, config: AggregatorConfig) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            released: Condvar::new(),
            sink,
            params,
            config,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Every mutation of the table is a single map or set operation, so a panic
    /// elsewhere cannot leave it half-updated and a poisoned lock is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits until no other caller is finishing `doc_id`, then claims it.
    fn claim<'a>(
        &'a self,
        mut table: MutexGuard<'a, Table>,
        doc_id: &str,
    ) -> (MutexGuard<'a, Table>, Claim<'a, S>) {
        while table.finishing.contains(doc_id) {
            tracing::debug!(doc_id, "waiting for previous completion to finish");
            table = self
                .released
                .wait(table)
                .unwrap_or_else(PoisonError::into_inner);
        }
        table.finishing.insert(doc_id.to_string());
        let claim = Claim {
            aggregator: self,
            doc_id: doc_id.to_string(),
        };
        (table, claim)
    }

    /// Number of documents currently in flight.
    pub fn in_flight(&self) -> usize {
        self.lock().docs.len()
    }

    /// True if `doc_id` is currently in flight.
    pub fn contains(&self, doc_id: &str) -> bool {
        self.lock().docs.contains_key(doc_id)
    }

    /// Submits one fragment, stamped with the current time.
    pub fn submit(&self, fragment: Fragment) -> Result<SubmitOutcome> {
        self.submit_at(fragment, Instant::now())
    }

    /// Submits one fragment observed at `now`.
    ///
    /// The fragment is checked against the document's declared counts and
    /// rejected with [`GatherError::MalformedIdentity`] before anything is
    /// stored. If it completes its document, the document is rendered and
    /// persisted before this returns. A persistence failure is returned as
    /// [`GatherError::Persist`], which carries the rendered text.
    pub fn submit_at(&self, fragment: Fragment, now: Instant) -> Result<SubmitOutcome> {
        let doc_id = fragment.id.doc_id.clone();

        let (doc, claim) = {
            let mut table = self.lock();
            let complete = match table.docs.entry(doc_id.clone()) {
                Entry::Occupied(mut entry) => {
                    entry.get().check(&fragment)?;
                    entry.get_mut().insert(fragment, now);
                    entry.get().is_complete()
                }
                Entry::Vacant(entry) => {
                    tracing::info!(doc_id = %doc_id, pages = fragment.id.page_count, "document opened");
                    let doc = entry.insert(DocumentAggregate::new(
                        doc_id.clone(),
                        fragment.id.page_count,
                        now,
                    ));
                    doc.insert(fragment, now);
                    doc.is_complete()
                }
            };
            if !complete {
                return Ok(SubmitOutcome::Pending);
            }
            let Some(doc) = table.docs.remove(&doc_id) else {
                return Ok(SubmitOutcome::Pending);
            };
            let (table, claim) = self.claim(table, &doc_id);
            drop(table);
            (doc, claim)
        };

        tracing::info!(doc_id = %doc_id, "document complete");
        self.finish(doc, CompletionReason::Complete, claim)
            .map(SubmitOutcome::Completed)
    }

    /// Force-completes every document idle for longer than `stale_after` as
    /// of `now`, using whatever fragments it holds.
    ///
    /// Returns one result per flushed document.
    pub fn sweep(&self, now: Instant, stale_after: Duration) -> Vec<Result<Completion>> {
        let table = self.lock();
        let ids: Vec<String> = table
            .docs
            .iter()
            .filter(|(_, doc)| now.saturating_duration_since(doc.last_activity()) > stale_after)
            .map(|(id, _)| id.clone())
            .collect();

        self.take_claimed(table, ids)
            .into_iter()
            .map(|(doc, claim)| {
                tracing::info!(
                    doc_id = %doc.doc_id(),
                    received = doc.received(),
                    idle_secs = now.saturating_duration_since(doc.last_activity()).as_secs(),
                    "force-flushing stale document"
                );
                self.finish(doc, CompletionReason::Stale, claim)
            })
            .collect()
    }

    /// [`Self::sweep`] with the current time and the configured staleness window.
    pub fn sweep_stale(&self) -> Vec<Result<Completion>> {
        self.sweep(Instant::now(), self.config.stale_after)
    }

    /// Force-completes every in-flight document.
    pub fn flush_all(&self) -> Vec<Result<Completion>> {
        let table = self.lock();
        let ids: Vec<String> = table.docs.keys().cloned().collect();
        self.take_claimed(table, ids)
            .into_iter()
            .map(|(doc, claim)| self.finish(doc, CompletionReason::Forced, claim))
            .collect()
    }

    /// Removes `ids` from the table and claims each one before the lock is
    /// released. Claims are taken in sorted order so two flushes waiting on
    /// each other's ids cannot deadlock.
    fn take_claimed<'a>(
        &'a self,
        mut table: MutexGuard<'a, Table>,
        mut ids: Vec<String>,
    ) -> Vec<(DocumentAggregate, Claim<'a, S>)> {
        ids.sort_unstable();
        let mut taken = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(doc) = table.docs.remove(&id) else {
                continue;
            };
            let (guard, claim) = self.claim(table, &id);
            table = guard;
            taken.push((doc, claim));
        }
        taken
    }

    /// Assembles, renders and persists a document that has left the table.
    /// The claim on its id is released when this returns.
    fn finish(
        &self,
        doc: DocumentAggregate,
        reason: CompletionReason,
        _claim: Claim<'_, S>,
    ) -> Result<Completion> {
        let doc_id = doc.doc_id().to_string();
        let fragments = doc.received();
        let pages = doc.assemble();
        let markdown = render_markdown(&pages, &self.params);

        if let Err(source) = self.sink.persist(&doc_id, &markdown) {
            tracing::error!(doc_id = %doc_id, error = %source, "failed to persist markdown");
            return Err(GatherError::Persist {
                doc_id,
                markdown,
                source,
            });
        }

        Ok(Completion {
            doc_id,
            markdown,
            reason,
            pages: pages.len(),
            fragments,
        })
    }
}
