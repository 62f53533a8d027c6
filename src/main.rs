//! Cortex CLI entry point.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use cortex::adapters::{
    HttpReasoningService, HttpTaskHistoryProvider, NullActionSink, RetryPolicy,
    ScriptedObservationProvider, ScriptedReasoningService,
};
use cortex::domain::ports::ReasoningService;
use cortex::infrastructure::config::ConfigLoader;
use cortex::infrastructure::logging;
use cortex::services::goap::GoapAction;
use cortex::services::task_history::{NullTaskHistoryProvider, TaskHistoryProvider, TaskHistoryService};
use cortex::{Controller, ControllerDeps, CoreConfig};

/// Embodied agent control core.
#[derive(Parser)]
#[command(name = "cortex", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the control loop headless against configured adapters.
    Run {
        /// Path to a configuration file (defaults to .cortex/config.yaml).
        #[arg(long)]
        config: Option<String>,
        /// Number of ticks to run.
        #[arg(long, default_value_t = 100)]
        ticks: u64,
        /// Reasoner service base URL; omitted runs the scripted reasoner.
        #[arg(long, env = "CORTEX_REASONER_URL")]
        reasoner_url: Option<String>,
    },
    /// Configuration utilities.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Validate the effective configuration.
    Validate {
        #[arg(long)]
        config: Option<String>,
    },
    /// Print the effective configuration as YAML-compatible JSON.
    Show {
        #[arg(long)]
        config: Option<String>,
    },
}

fn load_config(path: Option<&str>) -> Result<CoreConfig> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Default reactive action space for headless runs.
fn default_goap_actions() -> Vec<GoapAction> {
    vec![
        GoapAction::new("move_to", 2).with_effect("distance_to_target", -4),
        GoapAction::new("consume", 1)
            .with_precondition("item:food", 1)
            .with_effect("food", 6)
            .with_effect("item:food", -1),
        GoapAction::new("shield", 1).with_effect("threat", -1),
    ]
}

async fn run(config: CoreConfig, ticks: u64, reasoner_url: Option<String>) -> Result<()> {
    let reasoner: Arc<dyn ReasoningService> = match reasoner_url {
        Some(url) => Arc::new(
            HttpReasoningService::new(
                url,
                Duration::from_millis(config.acquisition.reasoner_timeout_ms),
                RetryPolicy::default(),
            )
            .context("Failed to build reasoner client")?,
        ),
        None => Arc::new(ScriptedReasoningService::new()),
    };

    let history_provider: Arc<dyn TaskHistoryProvider> = match &config.task_history.endpoint_base {
        Some(base) => Arc::new(
            HttpTaskHistoryProvider::new(
                base.clone(),
                Duration::from_millis(config.task_history.request_timeout_ms),
            )
            .context("Failed to build history client")?,
        ),
        None => Arc::new(NullTaskHistoryProvider),
    };
    let history = TaskHistoryService::new(config.task_history.clone(), history_provider);

    let tick_interval = Duration::from_secs_f64(1.0 / config.tick_rate_hz);
    let mut controller = Controller::new(
        config,
        ControllerDeps {
            bot_id: "cortex-bot".to_string(),
            stream_id: "belief-stream".to_string(),
            observations: Arc::new(ScriptedObservationProvider::new()),
            action_sink: Arc::new(NullActionSink),
            reasoner,
            history,
            goap_actions: default_goap_actions(),
        },
    );

    let mut interval = tokio::time::interval(tick_interval);
    for tick in 1..=ticks {
        interval.tick().await;
        let report = controller.tick(tick).await;
        if report.planner_blocked {
            tracing::debug!(tick, "planner blocked by reflex override");
        }
    }
    tracing::info!(ticks, "control loop finished");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            ticks,
            reasoner_url,
        } => {
            let config = load_config(config.as_deref()).context("Failed to load configuration")?;
            let _logging = logging::init(&config.logging).context("Failed to initialize logging")?;
            run(config, ticks, reasoner_url).await
        }
        Commands::Config { command } => match command {
            ConfigCommands::Validate { config } => {
                load_config(config.as_deref()).context("Configuration invalid")?;
                println!("configuration ok");
                Ok(())
            }
            ConfigCommands::Show { config } => {
                let config = load_config(config.as_deref()).context("Failed to load configuration")?;
                println!("{}", serde_json::to_string_pretty(&config)?);
                Ok(())
            }
        },
    }
}
