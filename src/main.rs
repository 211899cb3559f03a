use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use booking_relay::config::{AppConfig, RuntimeConfig};
use booking_relay::email::RawEmail;
use booking_relay::pipeline::{Coordinator, HttpTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let runtime = RuntimeConfig::from_env();

    // Initialize tracing; the guard flushes the file writer on exit
    let _log_guard = init_tracing(&runtime);

    let paths: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if paths.is_empty() {
        eprintln!("Usage: booking-relay <message.eml>...");
        eprintln!("  RELAY_CONFIG   config file (default: config.yaml)");
        eprintln!("  RELAY_LOG_DIR  also write daily log files to this directory");
        std::process::exit(2);
    }

    let config = AppConfig::load(&runtime.config_path)
        .with_context(|| format!("loading {}", runtime.config_path.display()))?;

    eprintln!("📬 Booking Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Config: {}", runtime.config_path.display());
    eprintln!(
        "   Targets: {} global, {} kind scopes",
        config.services.global.len(),
        config.services.by_kind.len()
    );
    eprintln!("   Messages: {}\n", paths.len());

    let mut emails = Vec::with_capacity(paths.len());
    for path in &paths {
        match RawEmail::from_eml_file(path) {
            Ok(email) => emails.push(email),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Skipping unreadable message");
            }
        }
    }

    let coordinator = Coordinator::from_config(&config, Arc::new(HttpTransport::new()));
    let reports = coordinator.run_batch(emails).await;

    for report in &reports {
        println!("{}", serde_json::to_string(report)?);
    }

    let failed: usize = reports.iter().map(|r| r.failed_count()).sum();
    if failed > 0 {
        eprintln!("\n   {failed} deliveries failed");
    }

    Ok(())
}

fn init_tracing(runtime: &RuntimeConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match &runtime.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "booking-relay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(file)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}
