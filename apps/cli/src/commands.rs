//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use marketpulse_collaborators::builtin_catalog;
use marketpulse_core::{
    CollaboratorRegistry, Orchestrator, PipelineOptions, PipelineState, ProgressReporter,
};
use marketpulse_shared::{
    AppConfig, StageDuration, StageName, init_config, load_config, load_config_from,
    validate_config,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// marketpulse: market news ingestion, enrichment, and retrieval.
#[derive(Parser)]
#[command(
    name = "marketpulse",
    version,
    about = "Run the market news pipeline and print the resulting state.",
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
    /// Run every pipeline stage once.
    Run(RunArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments for `marketpulse run`.
#[derive(clap::Args, Debug, Default)]
pub(crate) struct RunArgs {
    /// Query for the retrieval stage (defaults to the configured sample query).
    #[arg(short, long, conflicts_with = "no_query")]
    pub query: Option<String>,

    /// Skip the query stage.
    #[arg(long)]
    pub no_query: bool,

    /// Config file to use instead of ~/.marketpulse/marketpulse.toml.
    #[arg(short, long, env = "MARKETPULSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// JSON feed read by the `feed_file` ingestion collaborator.
    #[arg(long)]
    pub feed: Option<PathBuf>,

    /// Abort any collaborator call that runs longer than this many seconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub stage_timeout: Option<u64>,
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
        0 => "marketpulse=info",
        1 => "marketpulse=debug",
        _ => "marketpulse=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // stdout carries the JSON state; logs go to stderr.
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
        Command::Run(args) => cmd_run(args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let query = resolve_query(&args, &config);

    let registry = CollaboratorRegistry::resolve(&config, &builtin_catalog());
    let missing = registry.missing();
    if !missing.is_empty() {
        let stages: Vec<&str> = missing.iter().map(StageName::as_str).collect();
        warn!(?stages, "some stages have no collaborator and will fall back");
    }

    let orchestrator = Orchestrator::builder(registry)
        .options(PipelineOptions::from(&config))
        .build();

    info!(query = query.as_deref().unwrap_or(""), "running pipeline");

    let reporter = CliProgress::new();
    let state = orchestrator.run(query.as_deref(), &reporter).await;

    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

/// Load the config file and apply command-line overrides.
fn resolve_config(args: &RunArgs) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => load_config_from(path)
            .wrap_err_with(|| format!("failed to load config from {}", path.display()))?,
        None => load_config()?,
    };

    if let Some(feed) = &args.feed {
        config.sources.feed_path = Some(feed.clone());
    }
    if let Some(secs) = args.stage_timeout {
        config.pipeline.stage_timeout_secs = Some(secs);
    }

    validate_config(&config)?;
    Ok(config)
}

fn resolve_query(args: &RunArgs, config: &AppConfig) -> Option<String> {
    if args.no_query {
        return None;
    }
    Some(
        args.query
            .clone()
            .unwrap_or_else(|| config.pipeline.sample_query.clone()),
    )
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
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage_started(&self, stage: StageName) {
        self.spinner.set_message(format!("Running {}", stage.as_str()));
    }

    fn stage_finished(&self, entry: &StageDuration) {
        let status = if entry.error { "failed" } else { "done" };
        self.spinner.println(format!(
            "  {:<15} {status:<6} {:.2}s",
            entry.stage.as_str(),
            entry.duration
        ));
    }

    fn done(&self, state: &PipelineState) {
        self.spinner.finish_and_clear();
        if let Some(stats) = &state.stats {
            eprintln!(
                "  {} stages, {} errors, {:.2}s total",
                stats.stages_completed, stats.errors_count, stats.total_duration_seconds
            );
        }
    }
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

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("marketpulse").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    fn run_args(cli: Cli) -> RunArgs {
        match cli.command {
            Command::Run(args) => args,
            Command::Config { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn query_defaults_to_sample() {
        let args = run_args(parse(&["run"]));
        let config = AppConfig::default();
        assert_eq!(
            resolve_query(&args, &config).as_deref(),
            Some("What happened to Tesla today?")
        );
    }

    #[test]
    fn no_query_skips() {
        let args = run_args(parse(&["run", "--no-query"]));
        assert_eq!(resolve_query(&args, &AppConfig::default()), None);
    }

    #[test]
    fn query_and_no_query_conflict() {
        let err = Cli::try_parse_from(["marketpulse", "run", "--query", "x", "--no-query"]);
        assert!(err.is_err());
    }

    #[test]
    fn zero_stage_timeout_is_rejected() {
        let err = Cli::try_parse_from(["marketpulse", "run", "--stage-timeout", "0"]);
        assert!(err.is_err());
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = parse(&["run", "-vv", "--log-format", "json"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.log_format, LogFormat::Json));
    }

    #[test]
    fn overrides_apply_to_config() {
        let dir = std::env::temp_dir().join(format!("marketpulse-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("marketpulse.toml");
        std::fs::write(&path, "[pipeline]\nsample_query = \"RBI policy\"\n").unwrap();

        let args = run_args(parse(&[
            "run",
            "--config",
            path.to_str().unwrap(),
            "--feed",
            "news.json",
            "--stage-timeout",
            "30",
        ]));
        let config = resolve_config(&args).unwrap();

        assert_eq!(config.pipeline.sample_query, "RBI policy");
        assert_eq!(config.sources.feed_path, Some(PathBuf::from("news.json")));
        assert_eq!(config.pipeline.stage_timeout(), Some(Duration::from_secs(30)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn fixture_feed_runs_end_to_end() {
        let mut config = AppConfig::default();
        config.sources.feed_path = Some(
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/json/feed.sample.json"),
        );

        let registry = CollaboratorRegistry::resolve(&config, &builtin_catalog());
        let state = Orchestrator::builder(registry)
            .options(PipelineOptions::from(&config))
            .build()
            .run(Some("Tesla deliveries"), &marketpulse_core::SilentProgress)
            .await;

        assert!(state.errors.is_empty(), "{:?}", state.errors);
        assert_eq!(state.raw_items.len(), 6);
        assert_eq!(state.preprocessed_items.len(), 5);
        assert_eq!(state.deduplicated_items.len(), 4);
        assert!(state.embeddings_indexed);
        assert_eq!(state.impact_scores.len(), 4);
        assert_eq!(state.stage_durations.len(), 7);
        assert!(state.is_finalized());
        assert!(
            state.query_results[0]
                .get_str("document")
                .is_some_and(|d| d.contains("Tesla"))
        );
    }
}
