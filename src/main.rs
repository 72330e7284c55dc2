use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{debug, info};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use metric_scaler::config::{LogLevel, load_config};
use metric_scaler::prelude::*;
use metric_scaler::util::logging;

/// One-shot diagnostics for metric-source scalers
#[derive(Parser, Debug)]
#[command(name = "metric-scaler", version, about)]
struct Cli {
    /// Trigger declaration file (TOML, JSON or YAML)
    #[arg(short, long)]
    config: PathBuf,

    /// Index of the trigger to use
    #[arg(short, long, default_value_t = 0)]
    trigger: usize,

    /// Abort the query after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Override the configured log level
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print whether the workload is active
    Active,
    /// Print the current metric sample as JSON
    Metrics {
        /// Metric name to report under (defaults to the scaler's own)
        #[arg(long)]
        name: Option<String>,
    },
    /// Print the metric specs as JSON
    Spec,
    /// Check the metric source is reachable
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let file = load_config(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    logging::init(cli.log_level.as_ref().unwrap_or(&file.log_level));

    let env: HashMap<String, String> = std::env::vars().collect();
    let (kind, scaler_config) = file.scaler_config(cli.trigger, &env)?;
    debug!("Using {} trigger {}", kind, cli.trigger);

    let logger = ScalerLogger::new(format!("{}_scaler", kind));
    let mut scaler = build_scaler(&kind, &scaler_config, &logger)
        .with_context(|| format!("Failed to build {} scaler", kind))?;

    let mut ctx = PollContext::new();
    if let Some(secs) = cli.timeout_secs {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }
    let (ctx, cancel) = ctx.cancellable();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling query");
            cancel.cancel();
        }
    });

    let outcome = run(&cli.command, &scaler, &ctx).await;
    scaler.close().await.context("Failed to close scaler")?;
    outcome
}

async fn run(command: &Command, scaler: &AnyScaler, ctx: &PollContext) -> Result<()> {
    match command {
        Command::Active => {
            let active = scaler.is_active(ctx).await.context("Activity check failed")?;
            println!("{}", active);
        }
        Command::Metrics { name } => {
            let name = match name {
                Some(name) => name.clone(),
                None => default_metric_name(scaler)?,
            };
            let sample = scaler
                .get_metrics(ctx, &name, &MetricSelector::everything())
                .await
                .context("Metric read failed")?;
            println!("{}", serde_json::to_string_pretty(&sample)?);
        }
        Command::Spec => {
            let specs = scaler.get_metric_spec_for_scaling();
            println!("{}", serde_json::to_string_pretty(&specs)?);
        }
        Command::Health => {
            let Some(check) = scaler.health_check() else {
                bail!("Scaler has no open connection");
            };
            let healthy = check.check_health().await?;
            println!("{}: {}", check.name(), if healthy { "pass" } else { "fail" });
            if !healthy {
                bail!("Health check failed for {}", check.name());
            }
        }
    }
    Ok(())
}

fn default_metric_name(scaler: &AnyScaler) -> Result<String> {
    scaler
        .get_metric_spec_for_scaling()
        .into_iter()
        .next()
        .map(|spec| spec.name)
        .context("Scaler reported no metric specs")
}
