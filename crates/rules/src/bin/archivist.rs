//! archivist: annotate archive file records from the command line.
//!
//! Annotations come from a YAML directory (default) or an OpenSearch index;
//! file records come from a JSON-lines scanner snapshot. Every command
//! prints JSON on stdout and logs to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use archivist_core::config::{load_dotenv, Config};
use archivist_rules::evaluator::parse_timestamp;
use archivist_rules::loader::{FileStore, LoadStatus};
use archivist_rules::store::{HttpSearchClient, OpenSearchStore};
use archivist_rules::validation::{parse_yaml, validate_yaml, ValidationResult};
use archivist_rules::{
    AnnotationEngine, AnnotationStore, JsonlRecordSource, MergeStrategy, SearchFilters,
};

// ── CLI ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// YAML files under the annotations directory.
    File,
    /// The configured OpenSearch index.
    Opensearch,
}

/// Rule-based annotation of archive file records.
#[derive(Parser, Debug)]
#[command(name = "archivist", version, about)]
struct Cli {
    /// Where annotations are stored.
    #[arg(long, env = "ARCHIVIST_BACKEND", value_enum, default_value_t = Backend::File)]
    backend: Backend,

    /// Annotations directory (file backend). Overrides ANNOTATIONS_DIR.
    #[arg(long, global = true)]
    annotations_dir: Option<PathBuf>,

    /// JSON-lines record snapshot. Overrides RECORDS_FILE.
    #[arg(long, global = true)]
    records: Option<PathBuf>,

    /// Evaluate as of this instant instead of now (RFC 3339 or YYYY-MM-DD).
    #[arg(long, global = true)]
    at: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print one record with its merged annotations.
    Annotate { path: String },

    /// List the annotations applying to a record, least specific first.
    Find { path: String },

    /// List the annotations applying to any direct entry of a directory.
    Directory { path: String },

    /// Annotate every record under a prefix.
    Apply {
        #[arg(default_value = "/")]
        prefix: String,
        /// Include per-file results, not just the summary.
        #[arg(long)]
        results: bool,
    },

    /// Re-run `apply` periodically, reloading edited annotation files.
    Watch {
        #[arg(default_value = "/")]
        prefix: String,
        /// Seconds between runs.
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },

    /// Preview the records an annotation file would select.
    MatchedBy {
        file: PathBuf,
        /// Search here instead of the annotation's own scope.
        #[arg(long)]
        scope: Option<String>,
    },

    /// Search stored annotations.
    Search {
        #[arg(long)]
        under: Option<String>,
        #[arg(long)]
        ext: Option<String>,
        /// Payload key that must be present (repeatable).
        #[arg(long = "key")]
        keys: Vec<String>,
        #[arg(long)]
        strategy: Option<MergeStrategy>,
        #[arg(long)]
        include_expired: bool,
    },

    /// Validate annotation files without storing them.
    Validate { files: Vec<PathBuf> },

    /// Validate and store an annotation file. Prints the assigned id.
    Save { file: PathBuf },

    /// Delete an annotation by id.
    Delete { id: String },

    /// Print the effective configuration and the profiles found in the environment.
    Config,
}

// ── Wiring ──────────────────────────────────────────────────────────

async fn open_store(cli: &Cli, config: &Config, watch: bool) -> Result<Arc<dyn AnnotationStore>> {
    match cli.backend {
        Backend::File => {
            let dir = cli
                .annotations_dir
                .clone()
                .unwrap_or_else(|| config.store.annotations_dir.clone());
            let (mut store, results) = FileStore::open(dir.clone())
                .with_context(|| format!("loading annotations from {}", dir.display()))?;
            for result in &results {
                if let LoadStatus::Failed { error } = &result.status {
                    warn!(path = %result.path.display(), error = %error, "annotation file not loaded");
                }
            }
            if watch {
                store.watch().context("starting annotation watcher")?;
            }
            Ok(Arc::new(store))
        }
        Backend::Opensearch => {
            if watch {
                info!("opensearch backend is always current, watcher not needed");
            }
            let client = HttpSearchClient::from_config(&config.opensearch)?;
            let store = OpenSearchStore::from_config(Arc::new(client), &config.opensearch, &config.store);
            store
                .ensure_index()
                .await
                .with_context(|| format!("preparing index {}", store.index_name()))?;
            Ok(Arc::new(store))
        }
    }
}

async fn build_engine(cli: &Cli, config: &Config, watch: bool) -> Result<AnnotationEngine> {
    let store = open_store(cli, config, watch).await?;
    let records = cli
        .records
        .clone()
        .unwrap_or_else(|| config.store.records_file.clone());
    let source = JsonlRecordSource::load(&records)
        .await
        .with_context(|| format!("loading records from {}", records.display()))?;
    Ok(AnnotationEngine::from_config(store, Arc::new(source), config)?)
}

fn evaluation_time(cli: &Cli) -> Result<DateTime<Utc>> {
    match &cli.at {
        Some(raw) => match parse_timestamp(raw) {
            Some(ts) => Ok(ts),
            None => bail!("cannot parse --at '{raw}'"),
        },
        None => Ok(Utc::now()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Cancel `token` on the first ctrl-c.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight files");
            token.cancel();
        }
    });
}

// ── Commands ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct FoundAnnotation<'a> {
    id: &'a str,
    merge_strategy: MergeStrategy,
    annotation: &'a archivist_core::Payload,
}

fn found(ranked: &[Arc<archivist_rules::Rule>]) -> Vec<FoundAnnotation<'_>> {
    ranked
        .iter()
        .map(|rule| FoundAnnotation {
            id: rule.id(),
            merge_strategy: rule.merge_strategy(),
            annotation: rule.payload(),
        })
        .collect()
}

#[derive(Serialize)]
struct ValidationReport {
    file: PathBuf,
    #[serde(flatten)]
    result: ValidationResult,
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let now = evaluation_time(&cli)?;

    match &cli.command {
        Command::Annotate { path } => {
            let engine = build_engine(&cli, &config, false).await?;
            print_json(&engine.annotated_path(path, now).await?)
        }
        Command::Find { path } => {
            let engine = build_engine(&cli, &config, false).await?;
            let record = engine.source().get(path).await?;
            let ranked = engine.find_annotations_for(&record, now).await?;
            print_json(&found(&ranked))
        }
        Command::Directory { path } => {
            let engine = build_engine(&cli, &config, false).await?;
            let ranked = engine.annotations_for_directory(path, now).await?;
            print_json(&found(&ranked))
        }
        Command::Apply { prefix, results } => {
            let engine = build_engine(&cli, &config, false).await?;
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            let mut report = engine.apply_under(prefix, now, cancel).await?;
            if !results {
                report.results.clear();
            }
            print_json(&report)
        }
        Command::Watch { prefix, interval } => {
            let engine = build_engine(&cli, &config, true).await?;
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            let mut ticker = tokio::time::interval(Duration::from_secs((*interval).max(1)));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = cancel.cancelled() => break,
                }
                let mut report = engine.apply_under(prefix, Utc::now(), cancel.child_token()).await?;
                report.results.clear();
                print_json(&report)?;
            }
            info!("watch stopped");
            Ok(())
        }
        Command::MatchedBy { file, scope } => {
            let engine = build_engine(&cli, &config, false).await?;
            let yaml = tokio::fs::read_to_string(file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let draft = parse_yaml(&yaml).map_err(|result| anyhow::anyhow!("{}: {}", file.display(), result))?;
            let matched = engine
                .find_records_matched_by(&draft, scope.as_deref(), now)
                .await?;
            print_json(&matched)
        }
        Command::Search {
            under,
            ext,
            keys,
            strategy,
            include_expired,
        } => {
            let store = open_store(&cli, &config, false).await?;
            let filters = SearchFilters {
                under: under.clone(),
                ext: ext.clone(),
                annotation_keys: keys.clone(),
                merge_strategy: *strategy,
                include_expired: *include_expired,
            };
            print_json(&store.search(&filters).await?)
        }
        Command::Validate { files } => {
            let mut reports = Vec::with_capacity(files.len());
            for file in files {
                let yaml = tokio::fs::read_to_string(file)
                    .await
                    .with_context(|| format!("reading {}", file.display()))?;
                reports.push(ValidationReport {
                    file: file.clone(),
                    result: validate_yaml(&yaml),
                });
            }
            print_json(&reports)?;
            let invalid = reports.iter().filter(|r| !r.result.valid).count();
            if invalid > 0 {
                bail!("{invalid} of {} annotation files are invalid", reports.len());
            }
            Ok(())
        }
        Command::Save { file } => {
            let store = open_store(&cli, &config, false).await?;
            let yaml = tokio::fs::read_to_string(file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let annotation =
                parse_yaml(&yaml).map_err(|result| anyhow::anyhow!("{}: {}", file.display(), result))?;
            let id = store.save(annotation).await?;
            info!(rule_id = %id, "annotation saved");
            println!("{id}");
            Ok(())
        }
        Command::Config => {
            let mut summary = config.redacted_summary();
            summary["available_profiles"] = serde_json::json!(Config::available_profiles());
            print_json(&summary)
        }
        Command::Delete { id } => {
            let store = open_store(&cli, &config, false).await?;
            store.delete(id).await?;
            info!(rule_id = %id, "annotation deleted");
            Ok(())
        }
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_summary();

    run(cli, config).await
}
