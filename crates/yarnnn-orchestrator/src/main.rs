use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use yarnnn_core::config::{YarnnnConfig, TICK_INTERVAL_SECS};
use yarnnn_orchestrator::App;

#[derive(Parser)]
#[command(name = "yarnnn-orchestrator")]
#[command(about = "Runs the platform-sync / signal / deliverable tick (§6)")]
struct Args {
    /// Config file path (defaults to YARNNN_CONFIG env var, then ~/.yarnnn/yarnnn.toml)
    #[arg(long)]
    config: Option<String>,

    /// Run a single tick and exit, instead of looping on a 5-minute interval.
    /// The external-cron deployment mode (§6) wants this; running the binary
    /// itself as a long-lived process is the convenient default for local use.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "yarnnn_orchestrator=info".into()),
        )
        .init();

    let args = Args::parse();

    let config = match YarnnnConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration, cannot start without a platform encryption key");
            std::process::exit(1);
        }
    };

    let app = match App::new(config) {
        Ok(app) => Arc::new(app),
        Err(e) => {
            error!(error = %e, "failed to initialize orchestrator");
            std::process::exit(1);
        }
    };

    if args.once {
        run_tick(&app).await;
        return;
    }

    info!(interval_secs = TICK_INTERVAL_SECS, "starting tick loop");
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(TICK_INTERVAL_SECS));
    loop {
        interval.tick().await;
        run_tick(&app).await;
    }
}

async fn run_tick(app: &App) {
    match app.tick(chrono::Utc::now()).await {
        Ok(summary) => info!(?summary, "tick finished"),
        Err(e) => error!(error = %e, "tick failed"),
    }
}
