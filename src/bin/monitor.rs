use std::sync::Arc;

use clap::Parser;
use platform_monitor::{config::read_config_file, monitor::Monitor};
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(about = "Collects platform metrics and serves them to dashboards")]
struct Args {
    /// Config file
    #[arg(short, long)]
    file: String,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let filter = filter::Targets::new().with_targets(vec![
        ("platform_monitor", level),
        ("monitor", level),
        ("tower_http", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;
    let api_settings = config.api.clone();

    let monitor = Arc::new(Monitor::new(config)?);
    monitor.start();

    #[cfg(feature = "api")]
    if let Some(mut settings) = api_settings {
        use platform_monitor::api::{ApiState, spawn_api_server};

        settings.bind_addr = platform_monitor::util::api_bind_addr(settings.bind_addr);
        let addr = spawn_api_server(settings, ApiState::new(monitor.clone())).await?;
        info!("dashboard API available at http://{addr}/api/v1");
    }

    #[cfg(not(feature = "api"))]
    if api_settings.is_some() {
        tracing::warn!("api configured but this build has no api feature");
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
    }

    info!("shutting down");
    monitor.shutdown().await;

    Ok(())
}
