//! testgen - automated unit-test generation pipeline CLI
//!
//! ## Commands
//!
//! - `run`: detect changed modules and generate/validate tests for them
//! - `install-hooks`: place pre-commit / post-commit trigger scripts
//! - `state`: print the persisted module-hash store
//!
//! Exit codes: 0 = all modules accepted or skipped; 1 = at least one module
//! failed or needs review; 2 = infrastructure error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn, Level};

use testgen_core::{
    init_tracing, is_git_repo, CommandCoverageBackend, DiffMode, GenerationRequest,
    GenerationService, GitDiffSource, HashStore, HttpGenerationConfig, HttpGenerationService,
    Orchestrator, ProcessHarness, RunnerConfig, TestgenError,
};

mod hooks;

#[derive(Parser)]
#[command(name = "testgen")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "AI-assisted unit test generation pipeline", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// What invoked the run; selects the diff scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Trigger {
    /// On-demand invocation; processes the full backlog.
    Manual,
    /// Before a commit completes; fast, staged changes only.
    PreCommit,
    /// After a commit; full backlog since the last processed marker.
    PostCommit,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the test generation pipeline
    Run {
        /// Repository root
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// What triggered this run
        #[arg(long, value_enum, default_value = "manual")]
        trigger: Trigger,

        /// Worker limit for concurrent module pipelines
        #[arg(long)]
        workers: Option<usize>,

        /// Maximum generation attempts per module
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Detect and report only; write nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Install git hook scripts that trigger the pipeline
    InstallHooks {
        /// Repository root
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Make the pre-commit hook block the commit when modules fail
        #[arg(long)]
        block_on_failure: bool,
    },

    /// Print the persisted module-hash store
    State {
        /// Repository root
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
}

/// Placeholder used in dry runs when no endpoint is configured; the
/// pipeline never invokes generation on a dry run.
struct UnconfiguredGeneration;

#[async_trait]
impl GenerationService for UnconfiguredGeneration {
    async fn generate(&self, _request: &GenerationRequest) -> testgen_core::Result<String> {
        Err(TestgenError::InvalidConfig(
            "generation endpoint not configured; set [generation].endpoint in testgen.toml"
                .to_string(),
        ))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    let code = match execute(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            2
        }
    };
    std::process::exit(code);
}

async fn execute(command: Commands) -> Result<i32> {
    match command {
        Commands::Run {
            root,
            trigger,
            workers,
            max_attempts,
            dry_run,
        } => run_pipeline(&root, trigger, workers, max_attempts, dry_run).await,

        Commands::InstallHooks {
            root,
            block_on_failure,
        } => {
            let config = RunnerConfig::load(&root).context("load configuration")?;
            let block = block_on_failure || config.block_commit_on_failure;
            let written = hooks::install_git_hooks(&root, block)?;
            for path in written {
                println!("installed {}", path.display());
            }
            Ok(0)
        }

        Commands::State { root } => {
            let config = RunnerConfig::load(&root).context("load configuration")?;
            let store = HashStore::load_or_default(&root.join(&config.state_path));
            println!("{}", serde_json::to_string_pretty(&store)?);
            Ok(0)
        }
    }
}

async fn run_pipeline(
    root: &Path,
    trigger: Trigger,
    workers: Option<usize>,
    max_attempts: Option<u32>,
    dry_run: bool,
) -> Result<i32> {
    let root = root
        .canonicalize()
        .with_context(|| format!("resolve root {}", root.display()))?;
    if !is_git_repo(&root) {
        warn!(root = %root.display(), "not inside a git work tree; detection will fall back to a full scan");
    }

    let mut config = RunnerConfig::load(&root).context("load configuration")?;
    if let Some(workers) = workers {
        config = config.with_workers(workers);
    }
    if let Some(max_attempts) = max_attempts {
        config = config.with_max_attempts(max_attempts);
    }
    if dry_run {
        config = config.with_dry_run(true);
    }

    let diff_mode = match trigger {
        Trigger::PreCommit => DiffMode::Staged,
        Trigger::Manual | Trigger::PostCommit => DiffMode::SinceMarker,
    };
    let diff = Arc::new(GitDiffSource::new(root.clone(), diff_mode));
    let coverage = Arc::new(CommandCoverageBackend::new(config.coverage.clone()));
    let harness = Arc::new(ProcessHarness::new(config.harness.clone()));

    let generation: Arc<dyn GenerationService> = match &config.generation.endpoint {
        Some(endpoint) => {
            let mut gen_config = HttpGenerationConfig::new(endpoint);
            if let Some(model) = &config.generation.model {
                gen_config = gen_config.with_model(model);
            }
            if let Some(timeout) = config.generation.timeout_secs {
                gen_config.timeout_secs = timeout;
            }
            Arc::new(HttpGenerationService::new(gen_config)?)
        }
        None if config.dry_run => Arc::new(UnconfiguredGeneration),
        None => {
            anyhow::bail!(
                "generation endpoint not configured; set [generation].endpoint in testgen.toml"
            );
        }
    };

    info!(root = %root.display(), ?trigger, "starting run");
    let orchestrator = Orchestrator::new(
        root.clone(),
        config.clone(),
        diff,
        coverage,
        generation,
        harness,
    );
    let report = orchestrator.run().await?;

    print!("{}", report.render_summary());

    if !config.dry_run {
        if let Some(runs_dir) = &config.runs_dir {
            let path = report.write_artifact(&root.join(runs_dir))?;
            info!(artifact = %path.display(), "run report written");
        }
    }

    Ok(report.exit_code())
}
