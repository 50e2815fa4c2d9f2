use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pagegate::admission::{AdmissionGate, GlobalThrottle};
use pagegate::backend::FileBackend;
use pagegate::config::{PagegateConfig, ThrottleConfig};
use pagegate::http::{AppState, HttpServer};
use pagegate::metrics::PageCalls;
use pagegate::ratelimit::{Sweeper, VisitorRegistry};

#[derive(Parser, Debug)]
#[command(name = "pagegate", version, about = "Rate-limited recognition and lyrics pages")]
struct Args {
    /// YAML configuration file; flags below override its values
    #[arg(long, env = "PAGEGATE_CONFIG")]
    config: Option<String>,

    /// Address to start the application at
    #[arg(long, env = "PAGEGATE_APP_ADDR")]
    addr: Option<std::net::SocketAddr>,

    /// Maximum sustained requests per second per client
    #[arg(long, env = "PAGEGATE_IP_RPS_LIMIT")]
    rate: Option<f64>,

    /// Maximum request burst from one client
    #[arg(long, env = "PAGEGATE_IP_BURST_LIMIT")]
    burst: Option<u32>,

    /// Seconds between idle-visitor sweeps
    #[arg(long)]
    sweep_interval: Option<u64>,

    /// Seconds of inactivity before a client's limiter state is dropped
    #[arg(long)]
    idle_threshold: Option<u64>,

    /// Maximum concurrently processed requests
    #[arg(long)]
    throttle_rate: Option<usize>,

    /// Maximum requests waiting for a processing slot
    #[arg(long)]
    backlog_limit: Option<usize>,

    /// Seconds a request may wait for a processing slot
    #[arg(long)]
    backlog_timeout: Option<u64>,

    /// Disable the global throttle entirely
    #[arg(long, conflicts_with_all = ["throttle_rate", "backlog_limit", "backlog_timeout"])]
    no_throttle: bool,

    /// Directory which contains the page templates to serve
    #[arg(long)]
    template_dir: Option<PathBuf>,

    /// Make the log more verbose
    #[arg(long)]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Args {
    /// Layer command-line values over the loaded configuration.
    fn apply(&self, config: &mut PagegateConfig) {
        if let Some(addr) = self.addr {
            config.server.addr = addr;
        }
        if let Some(dir) = &self.template_dir {
            config.server.template_dir = Some(dir.clone());
        }
        if let Some(rate) = self.rate {
            config.limiter.refill_rate = rate;
        }
        if let Some(burst) = self.burst {
            config.limiter.burst = burst;
        }
        if let Some(secs) = self.sweep_interval {
            config.limiter.sweep_interval_secs = secs;
        }
        if let Some(secs) = self.idle_threshold {
            config.limiter.idle_threshold_secs = secs;
        }

        if self.no_throttle {
            config.throttle = None;
            return;
        }
        let overridden = self.throttle_rate.is_some()
            || self.backlog_limit.is_some()
            || self.backlog_timeout.is_some();
        if !overridden {
            return;
        }
        let throttle = config.throttle.get_or_insert_with(ThrottleConfig::default);
        if let Some(rate) = self.throttle_rate {
            throttle.rate = rate;
        }
        if let Some(limit) = self.backlog_limit {
            throttle.backlog_limit = limit;
        }
        if let Some(secs) = self.backlog_timeout {
            throttle.backlog_timeout_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let default_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting Pagegate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => PagegateConfig::from_file(path)?,
        None => PagegateConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;
    info!(config = ?config, "Configuration loaded");

    let registry = Arc::new(VisitorRegistry::new(
        config.limiter.refill_rate,
        config.limiter.burst,
    ));
    let sweeper = Sweeper::new(
        Arc::clone(&registry),
        config.limiter.sweep_interval(),
        config.limiter.idle_threshold(),
    )
    .spawn();

    let mut gate = AdmissionGate::new(registry);
    if let Some(throttle) = &config.throttle {
        gate = gate.with_throttle(GlobalThrottle::new(
            throttle.rate,
            throttle.backlog_limit,
            throttle.backlog_timeout(),
        ));
    }

    let state = AppState {
        gate,
        backend: Arc::new(FileBackend::new(config.server.template_dir.clone())),
        page_calls: Arc::new(PageCalls::new()),
        trust_forwarded_headers: config.server.trust_forwarded_headers,
    };
    let page_calls = Arc::clone(&state.page_calls);

    let server = HttpServer::new(config.server.addr, state);
    let served = server.serve_with_shutdown(shutdown_signal()).await;

    sweeper.shutdown().await;
    info!(page_calls = page_calls.total(), "Pagegate stopped");
    served?;
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
