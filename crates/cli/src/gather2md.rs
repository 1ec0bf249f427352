//! gather2md - replay captured fragments and print the reconstructed markdown
//!
//! Inputs are request bodies as posted to the gather service, one JSON file
//! per fragment, or directories of them. With `--pages`, inputs are instead
//! page JSON (a single page or an array of pages) rendered directly.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgAction, Parser};
use gather_cli::args::ParamArgs;
use gather_cli::logging::init_tracing;
use gather_core::aggregate::{Aggregator, Completion, CompletionReason, SubmitOutcome};
use gather_core::fragment::Envelope;
use gather_core::model::Page;
use gather_core::params::{AggregatorConfig, GatherParams};
use gather_core::reconstruct::render_markdown;
use gather_core::sink::{FsSink, MarkdownSink, MemorySink};
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "gather2md")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Fragment JSON files, or directories containing them
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Treat inputs as page JSON instead of fragment request bodies
    #[arg(long, action = ArgAction::SetTrue)]
    pages: bool,

    /// Write `{doc_id}.md` files here instead of printing to stdout
    #[arg(short = 'O', long = "output-dir")]
    output_dir: Option<PathBuf>,

    #[command(flatten)]
    params: ParamArgs,

    /// Use debug logging level
    #[arg(short = 'd', long, action = ArgAction::SetTrue)]
    debug: bool,
}

/// Expands directories into their `.json` files, sorted by name.
fn collect_inputs(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = fs::read_dir(path)
                .with_context(|| format!("failed to read directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PageInput {
    Many(Vec<Page>),
    One(Page),
}

fn read_pages(path: &Path) -> anyhow::Result<Vec<Page>> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let input: PageInput = serde_json::from_slice(&data)
        .with_context(|| format!("{} is not a page or list of pages", path.display()))?;
    Ok(match input {
        PageInput::Many(pages) => pages,
        PageInput::One(page) => vec![page],
    })
}

/// Submits every fragment in order, then flushes whatever never completed.
///
/// Rejected fragments are logged and skipped.
fn replay<S: MarkdownSink>(
    aggregator: &Aggregator<S>,
    files: &[PathBuf],
) -> anyhow::Result<Vec<Completion>> {
    let mut done = Vec::new();

    for file in files {
        let envelope =
            Envelope::read(file).with_context(|| format!("failed to load {}", file.display()))?;
        match envelope.into_fragment().and_then(|f| aggregator.submit(f)) {
            Ok(SubmitOutcome::Pending) => {}
            Ok(SubmitOutcome::Completed(completion)) => done.push(completion),
            Err(e) if e.is_rejection() => {
                tracing::warn!(file = %file.display(), error = %e, "skipping fragment");
            }
            Err(e) => return Err(e.into()),
        }
    }

    for result in aggregator.flush_all() {
        let completion = result?;
        tracing::warn!(
            doc_id = %completion.doc_id,
            fragments = completion.fragments,
            "document incomplete, rendered from the fragments received"
        );
        done.push(completion);
    }

    Ok(done)
}

fn print_documents<W: Write>(out: &mut W, docs: &[(String, String)]) -> io::Result<()> {
    let labelled = docs.len() > 1;
    for (doc_id, markdown) in docs {
        if labelled {
            writeln!(out, "<!-- {doc_id} -->")?;
        }
        out.write_all(markdown.as_bytes())?;
    }
    Ok(())
}

fn run_fragments(
    files: &[PathBuf],
    params: GatherParams,
    output_dir: Option<&Path>,
) -> anyhow::Result<()> {
    // Replays are offline: nothing goes stale, incomplete documents are flushed at the end.
    let config = AggregatorConfig::default();

    if let Some(dir) = output_dir {
        let aggregator = Aggregator::new(FsSink::new(dir), params, config);
        let done = replay(&aggregator, files)?;
        let incomplete = done
            .iter()
            .filter(|c| c.reason != CompletionReason::Complete)
            .count();
        tracing::info!(documents = done.len(), incomplete, "replay finished");
        return Ok(());
    }

    let aggregator = Aggregator::new(MemorySink::new(), params, config);
    replay(&aggregator, files)?;
    let mut out = BufWriter::new(io::stdout());
    print_documents(&mut out, &aggregator.sink().writes())?;
    out.flush()?;
    Ok(())
}

fn run_pages(
    files: &[PathBuf],
    params: &GatherParams,
    output_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let mut docs = Vec::with_capacity(files.len());
    for file in files {
        let pages = read_pages(file)?;
        let markdown = render_markdown(&pages, params);
        let doc_id = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        docs.push((doc_id, markdown));
    }

    match output_dir {
        Some(dir) => {
            let sink = FsSink::new(dir);
            for (doc_id, markdown) in &docs {
                sink.persist(doc_id, markdown).with_context(|| {
                    format!("failed to write {}", sink.path_for(doc_id).display())
                })?;
            }
        }
        None => {
            let mut out = BufWriter::new(io::stdout());
            print_documents(&mut out, &docs)?;
            out.flush()?;
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let files = collect_inputs(&args.inputs)?;
    if let Some(dir) = &args.output_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output dir {}", dir.display()))?;
    }

    let params = args.params.to_params();
    if args.pages {
        run_pages(&files, &params, args.output_dir.as_deref())
    } else {
        run_fragments(&files, params, args.output_dir.as_deref())
    }
}
