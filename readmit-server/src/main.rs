use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use readmit_core::ServiceConfig;
use readmit_model::RiskEstimator;
use readmit_server::{router, AppState};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "readmit-server",
    about = "Phục vụ mô hình dự đoán tái nhập viện qua HTTP."
)]
struct Args {
    /// Địa chỉ bind, ví dụ 0.0.0.0:5000.
    #[arg(short, long)]
    bind: Option<String>,

    /// Đường dẫn tới artifact mô hình (JSON).
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Seed cố định cho heuristic dự phòng.
    #[arg(long)]
    seed: Option<u64>,

    /// Ghi log dạng JSON.
    #[arg(long)]
    log_json: bool,
}

impl From<&Args> for ServiceConfig {
    fn from(args: &Args) -> Self {
        let mut base = ServiceConfig::default();
        if let Some(bind) = &args.bind {
            base.bind_addr = bind.clone();
        }
        if let Some(model) = &args.model {
            base.model_path = model.clone();
        }
        if args.seed.is_some() {
            base.heuristic_seed = args.seed;
        }
        base
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = ServiceConfig::from(&args);
    let estimator = RiskEstimator::from_config(&config);
    let state = AppState::new(estimator);
    let model_available = state.model_available();

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Không bind được địa chỉ {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, model_available, "readmit-server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server dừng bất thường")?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
