use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sitekeep_core::{Config, CoordinatorBuilder, RunLedger, RunMode};

/// Trigger, collect and prune hosted website backups.
#[derive(Parser, Debug)]
#[command(name = "sitekeep", version, about, long_about = None)]
struct Args {
    /// What this run should do
    #[arg(short, long, value_enum)]
    action: Action,

    /// TOML config file. SITEKEEP_* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Action {
    /// Ask the provider to start a backup of every site
    Backup,
    /// Pull finished backups and move them to cold storage
    Download,
    /// Delete cold-storage backups past the retention threshold
    Cleanup,
}

impl From<Action> for RunMode {
    fn from(action: Action) -> Self {
        match action {
            Action::Backup => RunMode::Backup,
            Action::Download => RunMode::Download,
            Action::Cleanup => RunMode::Cleanup,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    // RUST_LOG が無ければ info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// 1 回目の Ctrl-C で新しいサイトの開始を止め、2 回目で即終了する
fn spawn_interrupt_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("interrupt received, finishing in-flight work (press Ctrl-C again to abort)");
        // ignore send error: the coordinator may already be gone
        let _ = shutdown_tx.send(true);

        if tokio::signal::ctrl_c().await.is_ok() {
            error!("second interrupt, aborting");
            std::process::exit(130);
        }
    });
}

async fn run(args: Args) -> Result<RunLedger> {
    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    info!(config = ?config, "configuration loaded");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_interrupt_handler(shutdown_tx);

    let coordinator = CoordinatorBuilder::from_config(&config)
        .context("failed to set up API clients")?
        .shutdown(shutdown_rx)
        .build()
        .context("failed to build coordinator")?;

    let ledger = coordinator.run(args.action.into()).await?;
    Ok(ledger)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_format);

    match run(args).await {
        Ok(ledger) if ledger.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
