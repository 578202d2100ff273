//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use jobsignal_analyzer::{Catalog, load_catalog};
use jobsignal_core::{
    BridgeConfig, BridgeGenerator, PipelineRun, ProgressReporter, RunRequest, run_pipeline,
};
use jobsignal_fetch::{CancelFlag, HttpFetcher};
use jobsignal_shared::{
    AppConfig, CacheStatus, Posting, RunConfig, SummaryConfig, config_dir, expand_home,
    init_config, load_config,
};
use jobsignal_storage::{FsReportStore, SqlReportStore};

const DEFAULT_SCOPE: &str = "default";
const TOP_TERMS_SHOWN: usize = 5;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// jobsignal: what are employers actually asking for?
#[derive(Parser)]
#[command(
    name = "jobsignal",
    version,
    about = "Fetch job posting details, deduplicate them and score requirement terms.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the pipeline over a JSONL file of listing stubs.
    Analyze(AnalyzeArgs),

    /// Inspect the requirement catalog.
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// List recorded runs for a scope.
    Runs {
        /// Reporting scope.
        #[arg(long, default_value = DEFAULT_SCOPE)]
        scope: String,

        /// Run history database (defaults to ~/.jobsignal/jobsignal.db).
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
pub(crate) struct AnalyzeArgs {
    /// JSONL file with one posting per line.
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for the run layout and cache.
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Requirement catalog TOML (defaults to the built-in catalog).
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Concurrent detail fetches.
    #[arg(long)]
    workers: Option<usize>,

    /// Fetch detail for at most this many postings.
    #[arg(long)]
    max_details: Option<usize>,

    /// Deduplicate listing stubs before fetching detail.
    #[arg(long)]
    dedupe_before_details: bool,

    /// Reporting scope the cache is keyed under.
    #[arg(long, default_value = DEFAULT_SCOPE)]
    scope: String,

    /// Only keep postings from these listing sites (repeatable).
    #[arg(long = "source")]
    sources: Vec<String>,

    /// Generate a summary through the configured bridge.
    #[arg(long)]
    summary: bool,

    /// Run history database (defaults to ~/.jobsignal/jobsignal.db).
    #[arg(long)]
    db: Option<PathBuf>,
}

/// Catalog subcommands.
#[derive(Subcommand)]
pub(crate) enum CatalogAction {
    /// Print categories and terms.
    Show {
        /// Catalog TOML (defaults to the built-in catalog).
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "jobsignal=info",
        1 => "jobsignal=debug",
        _ => "jobsignal=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Analyze(args) => cmd_analyze(args).await,
        Command::Catalog { action } => match action {
            CatalogAction::Show { catalog } => cmd_catalog_show(catalog.as_deref()).await,
        },
        Command::Runs { scope, db } => cmd_runs(&scope, db).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// analyze
// ---------------------------------------------------------------------------

async fn cmd_analyze(args: AnalyzeArgs) -> Result<()> {
    let config = load_config()?;

    let mut run_config = RunConfig::from_app_config(&config)?;
    if let Some(workers) = args.workers {
        run_config.fetch.worker_count = workers;
    }
    if args.max_details.is_some() {
        run_config.fetch.max_details = args.max_details;
    }
    if args.dedupe_before_details {
        run_config.dedupe_before_details = true;
    }
    if let Some(out) = &args.out {
        run_config.output_dir = Some(out.clone());
    }

    let catalog = resolve_catalog(args.catalog.as_deref(), &config)?;
    let stubs = read_postings(&args.input)?;
    info!(
        input = %args.input.display(),
        postings = stubs.len(),
        catalog = %catalog.version,
        "analyzing postings"
    );

    let cache_root = match &run_config.output_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()
            .map_err(|e| eyre!("cannot determine working directory: {e}"))?
            .join("var")
            .join("jobsignal"),
    };
    let store = FsReportStore::new(&cache_root);
    let fetcher = Arc::new(HttpFetcher::new(&config.fetch.detail_selectors)?);

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing in-flight fetches");
                cancel.cancel();
            }
        });
    }

    let generator = args
        .summary
        .then(|| BridgeGenerator::new(BridgeConfig::from(&config.summary)));

    let request = RunRequest {
        stubs,
        config: run_config,
        catalog,
        cache_scope: args.scope.clone(),
        sources: args.sources.clone(),
        summary: args.summary.then(|| SummaryConfig::from(&config.summary)),
    };

    let reporter = CliProgress::new();
    let result = run_pipeline(
        request,
        fetcher,
        &store,
        generator.as_ref(),
        &cancel,
        &reporter,
    )
    .await;
    if let Some(generator) = &generator {
        generator.shutdown();
    }
    let run = result?;

    record_run(args.db, &run).await;
    print_run(&run);
    Ok(())
}

fn resolve_catalog(path: Option<&Path>, config: &AppConfig) -> Result<Catalog> {
    let configured = config.analysis.catalog_path.as_deref().map(expand_home);
    let catalog = match path.map(Path::to_path_buf).or(configured) {
        Some(path) => load_catalog(&path)?,
        None => Catalog::builtin()?,
    };
    Ok(catalog)
}

/// Read one posting per line. Blank lines and `_meta` header lines are skipped.
fn read_postings(path: &Path) -> Result<Vec<Posting>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre!("cannot read '{}': {e}", path.display()))?;

    let mut postings = Vec::new();
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| eyre!("{}:{}: invalid JSON: {e}", path.display(), n + 1))?;
        if value.get("_meta").is_some() {
            continue;
        }
        let posting: Posting = serde_json::from_value(value)
            .map_err(|e| eyre!("{}:{}: invalid posting: {e}", path.display(), n + 1))?;
        postings.push(posting);
    }
    Ok(postings)
}

fn default_db_path(db: Option<PathBuf>) -> Result<PathBuf> {
    match db {
        Some(path) => Ok(path),
        None => Ok(config_dir()?.join("jobsignal.db")),
    }
}

async fn record_run(db: Option<PathBuf>, run: &PipelineRun) {
    let outcome = async {
        let path = default_db_path(db)?;
        let store = SqlReportStore::open(&path).await?;
        let stats = serde_json::to_string(&run.stats)?;
        store.record_run(&run.run_id, &run.scope, &stats).await?;
        Ok::<_, color_eyre::eyre::Report>(())
    }
    .await;

    if let Err(e) = outcome {
        warn!(error = %e, "failed to record run history");
    }
}

fn print_run(run: &PipelineRun) {
    let stats = &run.stats;

    println!();
    println!("  Run {}", run.run_id);
    println!(
        "  Postings: {} in, {} after dedupe ({} url / {} content duplicates)",
        stats.stubs, stats.surviving, stats.url_duplicates, stats.content_duplicates
    );
    println!(
        "  Details:  {} fetched, {} failed, {} not fetched, {} retries",
        stats.fetched, stats.failed, stats.not_fetched, stats.retries
    );
    if stats.partial {
        println!("  Warning:  run was interrupted, results are partial");
    }
    println!(
        "  Report:   {}{}",
        run.report_status,
        if run.report_reused { " (reused)" } else { "" }
    );
    println!();

    for category in run.report.categories.iter().filter(|c| c.presence > 0) {
        println!(
            "  {} ({:.0}% of postings, avg {:.2})",
            category.label, category.percentage, category.average_score
        );
        for term in category.terms.iter().take(TOP_TERMS_SHOWN) {
            println!(
                "    {:<40} {:>4} postings  avg {:.2}",
                term.term, term.presence, term.average_score
            );
        }
    }

    if let Some(summary) = &run.summary {
        println!();
        match (&summary.text, &summary.error) {
            (Some(text), None) => println!("  Summary:\n\n{text}"),
            (Some(text), Some(error)) => {
                println!("  Summary (stale, regeneration failed: {error}):\n\n{text}")
            }
            (None, Some(error)) => println!("  Summary unavailable: {error}"),
            (None, None) => {}
        }
        if summary.status == CacheStatus::Current {
            println!("  (cached)");
        }
    }

    if let Some(path) = &run.output_path {
        println!();
        println!("  Output: {}", path.display());
    }
    if let Some(error) = &run.layout_error {
        println!();
        println!("  Run layout not written: {error}");
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn detail_fetched(&self, reference: &str, fetched: bool, done: usize, total: usize) {
        let mark = if fetched { "ok" } else { "failed" };
        self.spinner
            .set_message(format!("Fetching [{done}/{total}] {mark} {reference}"));
    }

    fn done(&self, _run: &PipelineRun) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// catalog / runs / config
// ---------------------------------------------------------------------------

async fn cmd_catalog_show(path: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let catalog = resolve_catalog(path, &config)?;

    println!("Catalog {} ({} terms)", catalog.version, catalog.term_count());
    println!("Digest  {}", catalog.digest());
    for category in &catalog.categories {
        println!();
        let perk = if category.perk { " [perk]" } else { "" };
        println!("{} ({}){perk}", category.label, category.key);
        for term in &category.terms {
            let gated = if term.gate.is_empty() { "" } else { " [gated]" };
            println!("  - {}{gated}", term.name);
        }
    }
    Ok(())
}

async fn cmd_runs(scope: &str, db: Option<PathBuf>) -> Result<()> {
    let path = default_db_path(db)?;
    if !path.exists() {
        println!("No runs recorded yet ({} does not exist).", path.display());
        return Ok(());
    }

    let store = SqlReportStore::open_readonly(&path).await?;
    let runs = store.list_runs(scope).await?;
    if runs.is_empty() {
        println!("No runs recorded for scope '{scope}'.");
        return Ok(());
    }

    for run in runs {
        println!(
            "{}  {}  {}",
            run.finished_at.format("%Y-%m-%d %H:%M:%S"),
            run.id,
            run.stats_json
        );
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn write_temp(content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("js_cli_{}.jsonl", Uuid::now_v7()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn reads_postings_skipping_meta_and_blank_lines() {
        let path = write_temp(concat!(
            r#"{"_meta": {"total_postings": 2}}"#,
            "\n\n",
            r#"{"url": "https://jobs.example/1", "title": "Help Desk", "company": "Acme", "location": "Sydney"}"#,
            "\n",
            r#"{"url": "https://jobs.example/2", "title": "NOC Engineer", "company": "Globex", "location": "Perth", "source": "seek"}"#,
            "\n",
        ));

        let postings = read_postings(&path).unwrap();
        assert_eq!(postings.len(), 2);
        assert_eq!(postings[1].source, "seek");
        assert!(postings[0].full_description.is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn reports_line_of_bad_posting() {
        let path = write_temp("{\"url\": \"u\", \"title\": \"t\", \"company\": \"c\", \"location\": \"l\"}\nnot json\n");
        let err = read_postings(&path).unwrap_err();
        assert!(err.to_string().contains(":2:"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn cli_parses_analyze_flags() {
        let cli = Cli::try_parse_from([
            "jobsignal",
            "analyze",
            "--input",
            "postings.jsonl",
            "--workers",
            "4",
            "--source",
            "seek",
            "--source",
            "indeed",
            "--summary",
        ])
        .unwrap();
        match cli.command {
            Command::Analyze(args) => {
                assert_eq!(args.workers, Some(4));
                assert_eq!(args.sources, vec!["seek", "indeed"]);
                assert!(args.summary);
                assert_eq!(args.scope, DEFAULT_SCOPE);
            }
            _ => panic!("expected analyze"),
        }
    }
}
