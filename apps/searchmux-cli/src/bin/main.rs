//! CLI binary for searchmux.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use searchmux_core::config::{expand_path, resolve_with_base, Config};
use searchmux_core::loader::DocumentLoader;
use searchmux_core::query::QuerySource;
use searchmux_core::types::{row_from_json, Index};
use searchmux_router::SearchModule;

const INGEST_BATCH: usize = 500;

/// Searchmux: query JSON documents through the routed search module.
#[derive(Parser)]
#[command(name = "searchmux", version, about)]
struct Cli {
    /// Directory holding config.toml and its per-environment overrides.
    #[arg(short, long, default_value = ".")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct QueryArgs {
    /// Index name, also the routing key.
    index: String,

    /// Document file or directory (.json / .jsonl). Defaults to `data.documents_dir`.
    #[arg(short, long)]
    data: Option<String>,

    #[arg(short, long, default_value = "")]
    keyword: String,

    /// JSON object override; repeat to apply several in order.
    #[arg(short, long)]
    query: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the search result as JSON.
    Search(QueryArgs),

    /// Print the number of matching documents.
    Count(QueryArgs),

    /// Print distinct field values containing TEXT.
    Suggest {
        index: String,
        text: String,
        #[arg(short, long)]
        data: Option<String>,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Print the cache signature of the normalized query.
    Signature {
        index: String,
        #[arg(short, long, default_value = "")]
        keyword: String,
        #[arg(short, long)]
        query: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load_in(&cli.config_dir)?;

    match cli.command {
        Command::Search(args) => {
            let module = open_module(&config, &cli.config_dir, &args.index, args.data.as_deref())?;
            let result = module.search(&args.index, &args.keyword, parse_sources(&args.query)?)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Count(args) => {
            let module = open_module(&config, &cli.config_dir, &args.index, args.data.as_deref())?;
            println!("{}", module.count(&args.index, &args.keyword, parse_sources(&args.query)?)?);
        }
        Command::Suggest { index, text, data, limit } => {
            let module = open_module(&config, &cli.config_dir, &index, data.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&module.suggest(&index, &text, limit)?)?);
        }
        Command::Signature { index, keyword, query } => {
            let module = SearchModule::new();
            println!("{}", module.signature(&index, &keyword, parse_sources(&query)?));
        }
    }
    Ok(())
}

fn parse_sources(raw: &[String]) -> anyhow::Result<Vec<QuerySource>> {
    raw.iter()
        .map(|text| -> anyhow::Result<QuerySource> {
            let value: serde_json::Value =
                serde_json::from_str(text).with_context(|| format!("parse --query {text}"))?;
            match row_from_json(value) {
                Some(row) => Ok(QuerySource::Dynamic(row)),
                None => bail!("--query must be a JSON object: {text}"),
            }
        })
        .collect()
}

fn open_module(config: &Config, config_dir: &Path, index: &str, data: Option<&str>) -> anyhow::Result<SearchModule> {
    let module = SearchModule::new();
    module.configure(&config.search_settings()?);
    if let Ok(indexes) = config.get::<BTreeMap<String, Index>>("indexes") {
        module.register_indexes(indexes);
    }
    module.open()?;

    let path = match data {
        Some(p) => expand_path(p),
        None => {
            let dir: String = config
                .get("data.documents_dir")
                .context("no --data given and data.documents_dir is not configured")?;
            resolve_with_base(config_dir, dir)
        }
    };
    ingest(&module, index, &path)?;
    Ok(module)
}

fn ingest(module: &SearchModule, index: &str, path: &Path) -> anyhow::Result<()> {
    let rows = DocumentLoader::new().load_path(path)?;
    let pb = ProgressBar::new(rows.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} rows ({percent}%)")?
            .progress_chars("#>-"),
    );
    for batch in rows.chunks(INGEST_BATCH) {
        module.upsert(index, batch)?;
        pb.inc(batch.len() as u64);
    }
    pb.finish_and_clear();
    info!(index, rows = rows.len(), path = %path.display(), "ingested documents");
    Ok(())
}
