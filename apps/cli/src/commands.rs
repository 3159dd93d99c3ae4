//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use keywatch_core::{EvidenceCache, KeywordPipeline, PipelineInput, PipelineOutput, ProgressReporter};
use keywatch_guardrails::{GuardSets, normalize, plural_fold};
use keywatch_shared::{
    AppConfig, Category, KeywatchError, PipelineConfig, init_config, load_config,
    load_config_from,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Keywatch: guardrails and evidence flags for AI-built keyword sets.
#[derive(Parser)]
#[command(
    name = "keywatch",
    version,
    about = "Enforce keyword-set guardrails and flag keywords against external evidence.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.keywatch/keywatch.toml).
    #[arg(long, global = true, env = "KEYWATCH_CONFIG")]
    pub config: Option<PathBuf>,

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
    /// Run the pipeline on a JSON batch and print the annotated result.
    Run {
        /// Batch file: {sector, keywords, categories, source_locations?, current_date?}.
        #[arg(short, long)]
        input: PathBuf,

        /// Search mode: off, test, shallow or deep.
        #[arg(long, env = "KEYWATCH_SEARCH_MODE")]
        search_mode: Option<String>,

        /// Search provider: perplexity or gemini.
        #[arg(long, env = "KEYWATCH_SEARCH_PROVIDER")]
        provider: Option<String>,

        /// Reference date for recency checks (YYYY-MM-DD).
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Skip evidence cache reads and writes.
        #[arg(long, env = "KEYWATCH_BYPASS_CACHE")]
        no_cache: bool,

        /// Pretty-print the output JSON.
        #[arg(long)]
        pretty: bool,
    },

    /// Guard set inspection.
    Guards {
        #[command(subcommand)]
        action: GuardsAction,
    },

    /// Evidence cache maintenance.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Guard set subcommands.
#[derive(Subcommand)]
pub(crate) enum GuardsAction {
    /// Show a keyword's canonical form and the guard sets it matches.
    Check {
        keyword: String,
    },
}

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Delete expired cache rows.
    Purge,
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

const CRATE_TARGETS: &[&str] = &[
    "keywatch",
    "keywatch_core",
    "keywatch_evidence",
    "keywatch_guardrails",
    "keywatch_storage",
    "keywatch_shared",
];

/// Initialize tracing based on CLI flags. Logs go to stderr so stdout stays JSON.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = CRATE_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
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
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            input,
            search_mode,
            provider,
            date,
            no_cache,
            pretty,
        } => {
            let overrides = RunOverrides {
                search_mode,
                provider,
                bypass_cache: no_cache,
            };
            cmd_run(config_path, &input, overrides, date, pretty).await
        }
        Command::Guards { action } => match action {
            GuardsAction::Check { keyword } => cmd_guards_check(config_path, &keyword),
        },
        Command::Cache { action } => match action {
            CacheAction::Purge => cmd_cache_purge(config_path).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

fn resolve(config: &AppConfig) -> Result<PipelineConfig> {
    PipelineConfig::try_from(config).wrap_err("invalid configuration")
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Command-line values that win over the config file.
#[derive(Debug, Default)]
struct RunOverrides {
    search_mode: Option<String>,
    provider: Option<String>,
    bypass_cache: bool,
}

impl RunOverrides {
    fn apply(self, config: &mut AppConfig) {
        if let Some(mode) = self.search_mode {
            config.evidence.search_mode = mode;
        }
        if let Some(provider) = self.provider {
            config.evidence.search_provider = provider;
        }
        if self.bypass_cache {
            config.evidence.bypass_cache = true;
        }
    }
}

async fn cmd_run(
    config_path: Option<&Path>,
    input_path: &Path,
    overrides: RunOverrides,
    date: Option<NaiveDate>,
    pretty: bool,
) -> Result<()> {
    let mut app_config = load(config_path)?;
    overrides.apply(&mut app_config);
    let config = resolve(&app_config)?;

    let raw = std::fs::read_to_string(input_path)
        .wrap_err_with(|| format!("cannot read batch file '{}'", input_path.display()))?;
    let mut input: PipelineInput = serde_json::from_str(&raw)
        .wrap_err_with(|| format!("invalid batch file '{}'", input_path.display()))?;
    if date.is_some() {
        input.current_date = date;
    }

    let guards = GuardSets::load(&config.guards_dir);
    let cache = EvidenceCache::open(
        config.cache_path.as_deref(),
        config.cache_ttl_days,
        config.bypass_cache,
    )
    .await;

    info!(
        input = %input_path.display(),
        search_mode = config.search_mode.as_str(),
        scope = %config.default_scope.describe(),
        cache = cache.is_active(),
        "running keyword batch"
    );

    // Guard files were just read, so a one-shot run has nothing to refresh.
    let pipeline = KeywordPipeline::new(config, guards)?.with_cache(cache);

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            on_ctrl_c.cancel();
        }
    });

    let reporter = CliProgress::new();
    let output = match pipeline.run_with_progress(input, &cancel, &reporter).await {
        Ok(output) => output,
        Err(KeywatchError::Cancelled) => {
            reporter.spinner.finish_and_clear();
            return Err(eyre!("run cancelled"));
        }
        Err(e) => {
            reporter.spinner.finish_and_clear();
            return Err(e.into());
        }
    };

    let json = if pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{json}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, output: &PipelineOutput) {
        let flagged = output.flags.values().filter(|f| !f.is_empty()).count();
        self.spinner.finish_and_clear();
        eprintln!(
            "  {} keywords, {flagged} flagged, complete: {}",
            output.updated.len(),
            output.guardrails.completeness_check.is_complete
        );
    }
}

// ---------------------------------------------------------------------------
// guards / cache / config
// ---------------------------------------------------------------------------

fn cmd_guards_check(config_path: Option<&Path>, keyword: &str) -> Result<()> {
    let config = resolve(&load(config_path)?)?;
    let guards = GuardSets::load(&config.guards_dir);
    let canonical = normalize(keyword);

    println!("  Keyword:   {keyword}");
    println!("  Canonical: {canonical}");
    println!("  Folded:    {}", plural_fold(&canonical));
    println!("  Guards:    {}", config.guards_dir.display());
    for category in Category::ALL {
        println!("    {:<11} {} terms", category.as_str(), guards.len(category));
    }

    let matches = guards.matching_categories(&canonical);
    if matches.is_empty() {
        println!("  Matches:   none");
    } else {
        let names: Vec<&str> = matches.iter().map(Category::as_str).collect();
        println!("  Matches:   {}", names.join(", "));
    }
    Ok(())
}

async fn cmd_cache_purge(config_path: Option<&Path>) -> Result<()> {
    let config = resolve(&load(config_path)?)?;
    let Some(path) = config.cache_path.as_deref() else {
        println!("Evidence cache is disabled (no [cache] path configured).");
        return Ok(());
    };

    let cache = EvidenceCache::open(Some(path), config.cache_ttl_days, false).await;
    let removed = cache.purge_expired().await?;
    info!(removed, path = %path.display(), "cache purged");
    println!("Removed {removed} expired entries from {}", path.display());
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
