//! Tests for the aggregation engine: completion, re-delivery, ordering,
//! force-flush, persistence failure and concurrent submission.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Barrier, Mutex};
use std::time::{Duration, Instant};

use gather_core::aggregate::{Aggregator, CompletionReason, SubmitOutcome};
use gather_core::error::GatherError;
use gather_core::fragment::{Fragment, Payload, parse_identity};
use gather_core::geometry::BBox;
use gather_core::model::{Block, BlockType, Page};
use gather_core::params::{AggregatorConfig, GatherParams};
use gather_core::sink::{FsSink, MarkdownSink, MemorySink};

fn aggregator() -> Aggregator<MemorySink> {
    Aggregator::new(
        MemorySink::new(),
        GatherParams::default(),
        AggregatorConfig::default(),
    )
}

fn layout(key: &str, blocks: Vec<Block>) -> Fragment {
    let id = parse_identity(key, "text").unwrap();
    let page = Page {
        pnum: id.page_index,
        bbox: Some(BBox::new(0.0, 0.0, 1000.0, 1000.0)),
        blocks,
        ..Default::default()
    };
    Fragment::new(id, Payload::Layout(page)).unwrap()
}

fn content(key: &str, kind: &str, text: &str) -> Fragment {
    let id = parse_identity(key, kind).unwrap();
    Fragment::new(id, Payload::Text(text.to_string())).unwrap()
}

fn text_block(text: &str) -> Block {
    let mut block = Block::new(BBox::new(100.0, 100.0, 900.0, 140.0), BlockType::Text);
    block.fill_text(text);
    block
}

fn table_block() -> Block {
    Block::new(BBox::new(100.0, 200.0, 900.0, 400.0), BlockType::Table)
}

/// Two pages: page 0 is one text block, page 1 is a table skeleton plus its
/// table fragment.
fn scenario(doc: &str) -> Vec<Fragment> {
    vec![
        layout(&format!("{doc}_0_2_0_1_0"), vec![text_block("Hello world.")]),
        layout(&format!("{doc}_1_2_0_2_0"), vec![table_block()]),
        content(&format!("{doc}_1_2_1_2_0"), "table", "| a | b |\n|---|---|\n| 1 | 2 |"),
    ]
}

const SCENARIO_MARKDOWN: &str = "Hello world.\n\n| a | b |\n|---|---|\n| 1 | 2 |\n";

fn permutations(n: usize) -> Vec<Vec<usize>> {
    if n == 0 {
        return vec![vec![]];
    }
    let mut out = Vec::new();
    for rest in permutations(n - 1) {
        for pos in 0..=rest.len() {
            let mut p = rest.clone();
            p.insert(pos, n - 1);
            out.push(p);
        }
    }
    out
}

// ============================================================================
// Completion
// ============================================================================

#[test]
fn test_scenario_completes_once_and_removes_aggregate() {
    let agg = aggregator();
    let mut fragments = scenario("report").into_iter();

    assert_eq!(agg.submit(fragments.next().unwrap()).unwrap(), SubmitOutcome::Pending);
    assert_eq!(agg.submit(fragments.next().unwrap()).unwrap(), SubmitOutcome::Pending);
    assert!(agg.contains("report"));

    let outcome = agg.submit(fragments.next().unwrap()).unwrap();
    let SubmitOutcome::Completed(done) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(done.doc_id, "report");
    assert_eq!(done.reason, CompletionReason::Complete);
    assert_eq!(done.pages, 2);
    assert_eq!(done.fragments, 3);
    assert_eq!(done.markdown, SCENARIO_MARKDOWN);

    assert_eq!(agg.in_flight(), 0);
    assert_eq!(agg.sink().writes(), vec![("report".to_string(), SCENARIO_MARKDOWN.to_string())]);
}

#[test]
fn test_late_fragment_starts_new_aggregate() {
    let agg = aggregator();
    for f in scenario("report") {
        agg.submit(f).unwrap();
    }
    assert_eq!(agg.in_flight(), 0);

    let late = content("report_1_2_1_2_0", "table", "| late |");
    assert_eq!(agg.submit(late).unwrap(), SubmitOutcome::Pending);
    assert!(agg.contains("report"));
    assert_eq!(agg.sink().writes().len(), 1);
}

#[test]
fn test_any_order_gives_same_markdown() {
    for order in permutations(3) {
        let agg = aggregator();
        let fragments = scenario("doc");
        let mut completions = 0;
        for &i in &order {
            if let SubmitOutcome::Completed(done) = agg.submit(fragments[i].clone()).unwrap() {
                assert_eq!(done.markdown, SCENARIO_MARKDOWN, "order {order:?}");
                completions += 1;
            }
        }
        assert_eq!(completions, 1, "order {order:?}");
        assert_eq!(agg.in_flight(), 0);
    }
}

#[test]
fn test_redelivery_is_idempotent() {
    let agg = aggregator();
    let fragments = scenario("dup");

    agg.submit(fragments[0].clone()).unwrap();
    agg.submit(fragments[1].clone()).unwrap();
    // Re-delivered skeleton and first page: still pending, nothing duplicated.
    assert_eq!(agg.submit(fragments[1].clone()).unwrap(), SubmitOutcome::Pending);
    assert_eq!(agg.submit(fragments[0].clone()).unwrap(), SubmitOutcome::Pending);

    let SubmitOutcome::Completed(done) = agg.submit(fragments[2].clone()).unwrap() else {
        panic!("expected completion");
    };
    assert_eq!(done.fragments, 3);
    assert_eq!(done.markdown, SCENARIO_MARKDOWN);
}

#[test]
fn test_content_before_skeleton_is_held() {
    let agg = aggregator();
    let fragments = scenario("early");
    assert_eq!(agg.submit(fragments[2].clone()).unwrap(), SubmitOutcome::Pending);
    assert_eq!(agg.submit(fragments[0].clone()).unwrap(), SubmitOutcome::Pending);
    assert!(matches!(
        agg.submit(fragments[1].clone()).unwrap(),
        SubmitOutcome::Completed(_)
    ));
}

#[test]
fn test_missing_page_keeps_document_open() {
    let agg = aggregator();
    let fragments = scenario("partial");
    agg.submit(fragments[1].clone()).unwrap();
    agg.submit(fragments[2].clone()).unwrap();
    // Page 1 is complete but page 0 never arrived.
    assert!(agg.contains("partial"));
    assert!(agg.sink().writes().is_empty());
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_out_of_range_against_declared_counts_is_rejected() {
    let agg = aggregator();
    agg.submit(layout("doc_0_2_0_2_0", vec![table_block()])).unwrap();

    // The document declared 2 pages.
    let err = agg
        .submit(layout("doc_3_5_0_1_0", vec![text_block("x")]))
        .unwrap_err();
    assert!(matches!(err, GatherError::MalformedIdentity { .. }));

    // Page 0 declared 2 fragments.
    let err = agg
        .submit(content("doc_0_2_2_4_0", "table", "| x |"))
        .unwrap_err();
    assert!(matches!(err, GatherError::MalformedIdentity { .. }));

    // Rejections never complete or corrupt the document.
    agg.submit(content("doc_0_2_1_2_0", "table", "| ok |")).unwrap();
    let outcome = agg
        .submit(layout("doc_1_2_0_1_0", vec![text_block("Second page.")]))
        .unwrap();
    let SubmitOutcome::Completed(done) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(done.markdown, "| ok |\n\nSecond page.\n");
}

// ============================================================================
// Force-flush
// ============================================================================

#[test]
fn test_sweep_flushes_only_stale_documents() {
    let agg = aggregator();
    let t0 = Instant::now();
    let stale_after = Duration::from_secs(300);

    // Page 0 skeleton has a table whose content never arrives; page 1 never arrives.
    agg.submit_at(
        layout("stalled_0_2_0_2_0", vec![text_block("Only this survived"), table_block()]),
        t0,
    )
    .unwrap();
    agg.submit_at(layout("fresh_0_2_0_1_0", vec![text_block("fresh")]), t0 + Duration::from_secs(200))
        .unwrap();

    assert!(agg.sweep(t0 + Duration::from_secs(299), stale_after).is_empty());
    assert_eq!(agg.in_flight(), 2);

    let flushed = agg.sweep(t0 + Duration::from_secs(301), stale_after);
    assert_eq!(flushed.len(), 1);
    let done = flushed.into_iter().next().unwrap().unwrap();
    assert_eq!(done.doc_id, "stalled");
    assert_eq!(done.reason, CompletionReason::Stale);
    assert_eq!(done.pages, 2);
    assert_eq!(done.markdown, "Only this survived\n");

    assert!(!agg.contains("stalled"));
    assert!(agg.contains("fresh"));
    assert_eq!(agg.sink().latest("stalled").as_deref(), Some("Only this survived\n"));
}

#[test]
fn test_activity_resets_staleness() {
    let agg = aggregator();
    let t0 = Instant::now();
    let stale_after = Duration::from_secs(300);

    agg.submit_at(layout("doc_0_2_0_1_0", vec![text_block("a")]), t0).unwrap();
    agg.submit_at(content("doc_1_2_1_2_0", "table", "| t |"), t0 + Duration::from_secs(250))
        .unwrap();

    assert!(agg.sweep(t0 + Duration::from_secs(400), stale_after).is_empty());
    assert_eq!(agg.sweep(t0 + Duration::from_secs(551), stale_after).len(), 1);
}

#[test]
fn test_flush_after_content_only_document() {
    let agg = aggregator();
    let t0 = Instant::now();
    agg.submit_at(content("orphan_0_1_1_2_0", "equation", "x^2"), t0).unwrap();

    let flushed = agg.sweep(t0 + Duration::from_secs(600), Duration::from_secs(300));
    let done = flushed.into_iter().next().unwrap().unwrap();
    assert_eq!(done.markdown, "");
    assert_eq!(done.pages, 1);
}

#[test]
fn test_flush_all() {
    let agg = aggregator();
    agg.submit(layout("a_0_2_0_1_0", vec![text_block("A")])).unwrap();
    agg.submit(layout("b_0_3_0_1_0", vec![text_block("B")])).unwrap();

    let mut done: Vec<String> = agg
        .flush_all()
        .into_iter()
        .map(|r| r.unwrap())
        .inspect(|c| assert_eq!(c.reason, CompletionReason::Forced))
        .map(|c| c.doc_id)
        .collect();
    done.sort();
    assert_eq!(done, vec!["a", "b"]);
    assert_eq!(agg.in_flight(), 0);
}

// ============================================================================
// Persistence failure
// ============================================================================

struct FailingSink;

impl MarkdownSink for FailingSink {
    fn persist(&self, _doc_id: &str, _markdown: &str) -> io::Result<()> {
        Err(io::Error::other("disk full"))
    }
}

#[test]
fn test_persist_failure_returns_markdown() {
    let agg = Aggregator::new(FailingSink, GatherParams::default(), AggregatorConfig::default());
    let mut last = None;
    for f in scenario("lost") {
        last = Some(agg.submit(f));
    }

    match last.unwrap() {
        Err(GatherError::Persist {
            doc_id, markdown, ..
        }) => {
            assert_eq!(doc_id, "lost");
            assert_eq!(markdown, SCENARIO_MARKDOWN);
        }
        other => panic!("expected persist error, got {other:?}"),
    }
    assert_eq!(agg.in_flight(), 0);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_submission_completes_every_document_once() {
    let agg = aggregator();
    let docs: Vec<String> = (0..24).map(|i| format!("doc{i}")).collect();
    let mut fragments: Vec<Fragment> = docs.iter().flat_map(|d| scenario(d)).collect();
    // Interleave documents so threads contend on the same ids.
    fragments.sort_by_key(|f| (f.id.group_index, f.id.page_index));

    let chunks: Vec<Vec<Fragment>> = fragments.chunks(9).map(|c| c.to_vec()).collect();
    std::thread::scope(|s| {
        for chunk in chunks {
            let agg = &agg;
            s.spawn(move || {
                for f in chunk {
                    agg.submit(f).unwrap();
                }
            });
        }
    });

    let writes = agg.sink().writes();
    assert_eq!(writes.len(), docs.len());
    let mut ids: Vec<&str> = writes.iter().map(|(id, _)| id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), docs.len());
    assert!(writes.iter().all(|(_, md)| md == SCENARIO_MARKDOWN));
    assert_eq!(agg.in_flight(), 0);
}

/// Records the most writers ever inside `persist` at once.
#[derive(Default)]
struct OverlapSink {
    active: AtomicUsize,
    peak: AtomicUsize,
    writes: Mutex<usize>,
}

impl MarkdownSink for OverlapSink {
    fn persist(&self, _doc_id: &str, _markdown: &str) -> io::Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(5));
        *self.writes.lock().unwrap() += 1;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

fn single_page(key: &str, text: &str) -> Fragment {
    layout(key, vec![text_block(text)])
}

#[test]
fn test_same_id_completions_never_overlap() {
    let agg = Aggregator::new(
        OverlapSink::default(),
        GatherParams::default(),
        AggregatorConfig::default(),
    );
    let barrier = Barrier::new(8);

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                barrier.wait();
                for _ in 0..5 {
                    let outcome = agg.submit(single_page("same_0_1_0_1_0", "Again.")).unwrap();
                    assert!(matches!(outcome, SubmitOutcome::Completed(_)));
                }
            });
        }
    });

    assert_eq!(agg.sink().peak.load(Ordering::SeqCst), 1);
    assert_eq!(*agg.sink().writes.lock().unwrap(), 40);
    assert_eq!(agg.in_flight(), 0);
}

#[test]
fn test_same_id_redelivery_to_fs_sink_always_persists() {
    let dir = tempfile::tempdir().unwrap();
    let agg = Aggregator::new(
        FsSink::new(dir.path()),
        GatherParams::default(),
        AggregatorConfig::default(),
    );
    let text = vec!["word"; 50_000].join(" ");
    let barrier = Barrier::new(8);

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                barrier.wait();
                for _ in 0..10 {
                    agg.submit(single_page("same_0_1_0_1_0", &text)).unwrap();
                }
            });
        }
    });

    let SubmitOutcome::Completed(last) = agg.submit(single_page("same_0_1_0_1_0", &text)).unwrap()
    else {
        panic!("single-fragment document did not complete");
    };
    let written = std::fs::read_to_string(dir.path().join("same.md")).unwrap();
    assert_eq!(written, last.markdown);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}
