use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use config::{Cli, load_config};
use handler::QueryHandler;
use sinkhole_blocklist::BlockedSet;
use sinkhole_resolver::UdpForwarder;
use sinkhole_server::DnsServer;
use stats::StatsAggregator;
use tokio::{net::TcpListener, signal, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking;
use tracing_subscriber::{Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod handler;
mod stats;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let (nb, _guard) = non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(nb)
                .with_target(false)
                .with_filter(LevelFilter::from(config.server.log_level)),
        )
        .init();

    let blocklist = Arc::new(BlockedSet::from_path(&config.blocklist.path));
    let stats = Arc::new(StatsAggregator::new());
    let forwarder = Arc::new(UdpForwarder::new(
        config.resolver.upstream,
        config.upstream_timeout(),
    ));
    let handler = Arc::new(QueryHandler::new(
        blocklist,
        forwarder,
        stats.clone(),
        config.upstream_timeout(),
    ));

    let dns_addr = config.dns_addr();
    let server = DnsServer::bind(dns_addr, config.request_timeout())
        .await
        .with_context(|| format!("failed to bind DNS listener on {}", dns_addr))?;

    let web_addr = config.web_addr();
    let listener = TcpListener::bind(web_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", web_addr))?;

    let cancel = CancellationToken::new();

    let dns_task = spawn_until_cancelled(
        "DNS server",
        cancel.clone(),
        server.run(handler, cancel.clone(), config.shutdown_grace()),
    );
    let web_task = spawn_until_cancelled(
        "HTTP server",
        cancel.clone(),
        api::serve_web(
            listener,
            api::router(stats, &config.web.dashboard_dir),
            cancel.clone(),
        ),
    );

    tracing::info!(upstream = %config.resolver.upstream, "sinkhole is running");

    tokio::select! {
        r = shutdown_signal() => {
            if let Err(e) = r {
                tracing::error!("failed to listen for shutdown signals: {}", e);
            }
            tracing::info!("Shutting down...");
        },
        _ = cancel.cancelled() => {},
    }
    cancel.cancel();

    let _ = tokio::join!(dns_task, web_task);
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Spawn a long-running service; its exit, for whatever reason, stops the others.
fn spawn_until_cancelled<F>(name: &'static str, cancel: CancellationToken, fut: F) -> JoinHandle<()>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = fut.await {
            tracing::error!("{} exited with error: {:#}", name, e);
        }
        cancel.cancel();
    })
}

/// Wait for SIGINT, or SIGTERM on unix.
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            r = signal::ctrl_c() => r?,
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    signal::ctrl_c().await?;

    Ok(())
}
