use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use searchcore::persist::{load_snapshot, save_snapshot, IndexPaths};
use searchcore::query_parser;
use searchcore::{DocId, Document, EngineConfig, SearchService};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

#[derive(Debug, Deserialize)]
struct InputDoc {
    url: String,
    title: String,
    /// Raw text or HTML; anchors become PageRank links.
    body: String,
    #[serde(default)]
    tags: Vec<String>,
    timestamp: Option<String>,
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query a TF-IDF + PageRank search index", long_about = None)]
struct Cli {
    /// Engine configuration (JSON); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
    },
    /// Run a ranked query against a built index
    Query {
        #[arg(long)]
        index: String,
        #[arg(long)]
        q: String,
        #[arg(long, default_value_t = 10)]
        k: usize,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        size: usize,
        /// Only documents carrying all of these tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        /// Retry through close cached queries when nothing matches
        #[arg(long, default_value_t = false)]
        corrections: bool,
    },
    /// Prefix suggestions from the indexed vocabulary
    Suggest {
        #[arg(long)]
        index: String,
        #[arg(long)]
        prefix: String,
    },
    /// Split a query into phrases, operators, wildcards and tokens
    Parse {
        #[arg(long)]
        q: String,
    },
    /// Vocabulary words within an edit distance of a query
    Fuzzy {
        #[arg(long)]
        index: String,
        #[arg(long)]
        q: String,
        #[arg(long, default_value_t = 2)]
        distance: usize,
    },
    /// Term and posting statistics of a built index
    Stats {
        #[arg(long)]
        index: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path).with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Build { input, output } => build_index(config, &input, &output),
        Commands::Query { index, q, k, page, size, tags, corrections } => {
            let svc = open(config, &index)?;
            if !tags.is_empty() {
                print_json(&svc.process_query_with_tags_page(&q, &tags, k, page, size)?)
            } else if corrections {
                print_json(&svc.process_query_with_corrections(&q, k, page, size)?)
            } else {
                print_json(&svc.process_query_page(&q, k, page, size)?)
            }
        }
        Commands::Suggest { index, prefix } => print_json(&open(config, &index)?.get_suggestions(&prefix)),
        Commands::Parse { q } => print_json(&query_parser::parse(&q)),
        Commands::Fuzzy { index, q, distance } => print_json(&open(config, &index)?.fuzzy_search(&q, distance)),
        Commands::Stats { index } => print_json(&open(config, &index)?.index_statistics()),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open(config: EngineConfig, index: &str) -> Result<SearchService> {
    let (entries, docs, meta) = load_snapshot(&IndexPaths::new(index)).with_context(|| format!("opening index {index}"))?;
    tracing::debug!(num_docs = meta.num_docs, created_at = %meta.created_at, "index opened");
    Ok(SearchService::with_stores(config, Arc::new(entries), Arc::new(docs))?)
}

fn build_index(config: EngineConfig, input: &str, output: &str) -> Result<()> {
    let input_path = Path::new(input);
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    } else {
        bail!("input {input} does not exist");
    }

    let mut raw = Vec::new();
    for file in &files {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(file, &mut raw)?;
        } else {
            read_json(file, &mut raw)?;
        }
    }
    let docs = raw.into_iter().enumerate().map(|(i, d)| to_document(i as DocId + 1, d)).collect::<Vec<_>>();
    tracing::info!(files = files.len(), num_docs = docs.len(), "ingested documents");

    let svc = SearchService::new(config)?;
    let report = svc.build_index(docs);
    let meta = save_snapshot(&IndexPaths::new(output), svc.index_store().as_ref(), svc.documents().as_ref())?;
    svc.shutdown();

    tracing::info!(output, num_terms = meta.num_terms, "index build complete");
    print_json(&report)
}

fn to_document(id: DocId, doc: InputDoc) -> Document {
    let mut out = Document::new(id, doc.url, doc.title, doc.body).with_tags(doc.tags);
    if let Some(ts) = doc.timestamp {
        match OffsetDateTime::parse(&ts, &Rfc3339) {
            Ok(t) => out.created_at = t,
            Err(e) => tracing::warn!(doc_id = id, timestamp = %ts, error = %e, "ignoring unparseable timestamp"),
        }
    }
    out
}

fn read_jsonl(file: &Path, out: &mut Vec<InputDoc>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let doc: InputDoc = serde_json::from_str(&line).with_context(|| format!("{}:{}", file.display(), n + 1))?;
        out.push(doc);
    }
    Ok(())
}

fn read_json(file: &Path, out: &mut Vec<InputDoc>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                out.push(serde_json::from_value(v)?);
            }
        }
        serde_json::Value::Object(_) => out.push(serde_json::from_value(json)?),
        _ => tracing::warn!(file = %file.display(), "skipping JSON that is neither an object nor an array"),
    }
    Ok(())
}
