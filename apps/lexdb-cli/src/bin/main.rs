use std::env;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lexdb_core::config::{resolve_with_base, Config};
use lexdb_core::data_processor::{ChunkingConfig, DataProcessor};
use lexdb_retrieval::{KeywordRetriever, QueryOptions};
use lexdb_store::DocumentStore;

const USAGE: &str = "Usage: lexdb <ingest|query|count|delete|verify|rebuild> [args...]

  ingest [DIR] [--chunk]
  query \"<text>\" [--top-k N] [--filters JSON] [--namespace NS] [--all] [--raw]
  count [--filters JSON] [--namespace NS] [--without-vector]
  delete [--ids a,b,c] [--filters JSON] [--namespace NS]
  verify
  rebuild";

struct Args {
    positional: Vec<String>,
    flags: Vec<(String, Option<String>)>,
}

impl Args {
    fn flag(&self, name: &str) -> bool { self.flags.iter().any(|(n, _)| n == name) }

    fn value(&self, name: &str) -> Option<&str> {
        self.flags.iter().find(|(n, _)| n == name).and_then(|(_, v)| v.as_deref())
    }

    fn filters(&self) -> anyhow::Result<Option<Value>> {
        self.value("--filters").map(|raw| serde_json::from_str(raw).context("--filters is not valid JSON")).transpose()
    }
}

const VALUE_FLAGS: &[&str] = &["--top-k", "--filters", "--namespace", "--ids"];

fn parse_args() -> (String, Args) {
    let mut raw: Vec<String> = env::args().skip(1).collect();
    if raw.is_empty() { eprintln!("{}", USAGE); std::process::exit(1); }
    let cmd = raw.remove(0);
    let mut args = Args { positional: Vec::new(), flags: Vec::new() };
    let mut i = 0;
    while i < raw.len() {
        let arg = &raw[i];
        if VALUE_FLAGS.contains(&arg.as_str()) {
            let Some(value) = raw.get(i + 1) else { eprintln!("Error: {} requires a value", arg); std::process::exit(1) };
            args.flags.push((arg.clone(), Some(value.clone())));
            i += 1;
        } else if arg.starts_with("--") {
            args.flags.push((arg.clone(), None));
        } else {
            args.positional.push(arg.clone());
        }
        i += 1;
    }
    (cmd, args)
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.store_settings()?;
    let (cmd, args) = parse_args();
    let namespace = args.value("--namespace").map(str::to_string);

    match cmd.as_str() {
        "ingest" => {
            let dir = match args.positional.first() {
                Some(dir) => dir.clone(),
                None => config.get::<String>("data.raw_txt_dir").unwrap_or_else(|_| "./data/txt".to_string()),
            };
            let data_dir = resolve_with_base(&env::current_dir()?, dir);
            let processor = if args.flag("--chunk") { DataProcessor::with_chunking(ChunkingConfig::default()) } else { DataProcessor::new() };
            let store = DocumentStore::open(settings)?;
            let ns = namespace.unwrap_or_else(|| store.default_namespace().to_string());
            let files = processor.list_txt_files(&data_dir);
            println!("Ingesting {} files from {}", files.len(), data_dir.display());

            let pb = ProgressBar::new(files.len() as u64);
            pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?.progress_chars("#>-"));
            let (mut inserted, mut updated, mut skipped) = (0usize, 0usize, 0usize);
            for file in &files {
                let docs = processor.documents_from_file(file, &data_dir, &ns)?;
                let summary = store.write_documents(&docs, Some(&ns), None)?;
                inserted += summary.inserted;
                updated += summary.updated;
                skipped += summary.skipped;
                pb.inc(1);
            }
            pb.finish_with_message("done");
            println!("Ingest complete: {} inserted, {} updated, {} skipped", inserted, updated, skipped);
        }
        "query" => {
            let Some(text) = args.positional.first() else { eprintln!("Usage: lexdb query \"<text>\""); std::process::exit(1) };
            let mut opts = QueryOptions::default()
                .with_all_terms_must_match(args.flag("--all"))
                .with_scale_score(!args.flag("--raw"));
            if let Some(k) = args.value("--top-k") { opts = opts.with_top_k(k.parse().context("--top-k requires a number")?); }
            opts.filters = args.filters()?;
            opts.namespace = namespace;

            let retriever = KeywordRetriever::new(DocumentStore::open(settings)?);
            let results = retriever.query(text, &opts)?;
            info!(hits = results.len(), "query finished");
            for (rank, hit) in results.iter().enumerate() {
                let preview: String = hit.document.content.chars().take(120).collect();
                println!("{:>3}. [{:.4}] {}  {}", rank + 1, hit.score, hit.document.id, preview.replace('\n', " "));
            }
            if results.is_empty() { println!("No matches."); }
        }
        "count" => {
            let store = DocumentStore::open(settings)?;
            let filters = args.filters()?;
            let count = store.get_document_count(namespace.as_deref(), filters.as_ref(), args.flag("--without-vector"))?;
            println!("{}", count);
        }
        "delete" => {
            let store = DocumentStore::open(settings)?;
            let ids: Option<Vec<String>> =
                args.value("--ids").map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect());
            let filters = args.filters()?;
            let deleted = store.delete_documents(namespace.as_deref(), ids.as_deref(), filters.as_ref())?;
            println!("Deleted {} documents", deleted);
        }
        "verify" => {
            let store = DocumentStore::open(settings)?;
            let report = store.verify_index()?;
            if report.is_consistent() {
                println!("Index consistent");
            } else {
                println!(
                    "Index inconsistent: {} missing, {} orphaned, {} stale (run `lexdb rebuild`)",
                    report.missing.len(),
                    report.orphaned.len(),
                    report.stale.len()
                );
                std::process::exit(2);
            }
        }
        "rebuild" => {
            let store = DocumentStore::open(settings)?;
            let entries = store.rebuild_index()?;
            println!("Rebuilt index with {} entries", entries);
        }
        _ => { eprintln!("Unknown command: {}\n{}", cmd, USAGE); std::process::exit(1); }
    }
    Ok(())
}
