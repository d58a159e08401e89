//! Run command implementation

use crate::config::{Config, ExecutionMode};
use crate::execution::{Executor, LiveExecutor, RestVenue, RetryPolicy, SimulatedExecutor};
use crate::feed::{ordered_channel, JsonlReplay};
use crate::pipeline::{Pipeline, RunSummary};
use crate::state::StateStore;
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Newline-delimited JSON events, `-` for stdin
    #[arg(long, default_value = "-")]
    pub events: PathBuf,

    /// Trade against the configured venue instead of simulating
    #[arg(long)]
    pub live: bool,

    /// Initial capital for paper trading
    #[arg(long)]
    pub capital: Option<Decimal>,

    /// Summary output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let mut config = config.clone();
        if self.live {
            config.execution.mode = ExecutionMode::Live;
        }
        if let Some(capital) = self.capital {
            config.execution.initial_balance = capital;
        }

        let state = Arc::new(StateStore::new(config.execution.initial_balance));
        let executor = build_executor(&config, state.clone()).await?;
        let pipeline = Pipeline::new(&config, state, executor);

        let (events, receivers) = ordered_channel(config.state.channel_buffer);
        let feeder = if self.events.as_os_str() == "-" {
            info!("Reading events from stdin");
            tokio::spawn(JsonlReplay::stdin().run(events))
        } else {
            info!(path = %self.events.display(), "Reading events from file");
            let replay = JsonlReplay::open(&self.events).await?;
            tokio::spawn(replay.run(events))
        };

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Could not listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        };
        let summary = pipeline.run(receivers, shutdown).await?;

        // The pipeline is done; anything still queued is dropped
        feeder.abort();
        match feeder.await {
            Ok(Ok(delivered)) => info!(delivered, "Event replay complete"),
            Ok(Err(e)) => warn!(error = %e, "Event replay stopped early"),
            Err(e) if e.is_cancelled() => info!("Event replay cancelled"),
            Err(e) => warn!(error = %e, "Event replay task failed"),
        }

        self.print_summary(&summary)
    }

    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(summary)?),
            OutputFormat::Table => println!("{}", summary),
        }
        Ok(())
    }
}

async fn build_executor(config: &Config, state: Arc<StateStore>) -> anyhow::Result<Arc<dyn Executor>> {
    match config.execution.mode {
        ExecutionMode::Paper => {
            info!(balance = %config.execution.initial_balance, "Paper trading");
            Ok(Arc::new(SimulatedExecutor::from_config(state, &config.execution)))
        }
        ExecutionMode::Live => {
            let url = config
                .execution
                .venue_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("execution.venue_url is required in live mode"))?;
            let venue = RestVenue::new(url, Duration::from_millis(config.execution.timeout_ms))?;
            let executor = LiveExecutor::new(venue, state, RetryPolicy::from_config(&config.execution));
            let report = executor.reconcile().await?;
            info!(
                balance = %report.balance,
                positions = report.positions,
                open_orders = report.open_orders,
                "Reconciled with venue"
            );
            Ok(Arc::new(executor))
        }
    }
}
