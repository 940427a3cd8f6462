mod cli;

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, bail};
use axum::{http::StatusCode, routing::get};
use clap::Parser;
use futures::future::join_all;
use geto_api::{ApiHandler, DispatcherAdapter, HttpApi};
use geto_core::{DispatchConfig, Dispatcher, Transport};
use geto_exec::{LocalTransport, SshTransport};
use geto_observe::{LoggerConfig, logger_init};
use geto_prometheus::PrometheusMetrics;
use tracing::{info, warn};

use crate::cli::{Cli, Commands, RunArgs, TransportKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logger_init(&LoggerConfig::new(cli.log_format, cli.log_level.clone()))?;

    let config = DispatchConfig::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    let transport: Arc<dyn Transport> = match cli.transport {
        TransportKind::Ssh => Arc::new(SshTransport::from_config(&config)),
        TransportKind::Local => Arc::new(LocalTransport::new()),
    };
    info!(transport = transport.name(), hosts = config.hosts.len(), "config loaded");

    match cli.command {
        Commands::Run(args) => run(args, config, transport).await,
        Commands::Hosts { check } => hosts(config, transport, check).await,
        Commands::Serve { bind } => serve(bind, config, transport).await,
    }
}

async fn run(args: RunArgs, config: DispatchConfig, transport: Arc<dyn Transport>) -> anyhow::Result<()> {
    let json = args.json;
    let request = args.into_request()?;
    let dispatcher = Arc::new(Dispatcher::new(config, transport)?);

    let report = DispatcherAdapter::new(dispatcher).dispatch(request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.stdout);
        eprint!("{}", report.stderr);
    }
    match report.error {
        Some(e) => bail!(e),
        None => Ok(()),
    }
}

async fn hosts(config: DispatchConfig, transport: Arc<dyn Transport>, check: bool) -> anyhow::Result<()> {
    if !check {
        for h in &config.hosts {
            println!("{}\t{}:{}\t{}", h.name, h.addr, h.port, h.username);
        }
        return Ok(());
    }

    let results = join_all(config.hosts.iter().map(|h| transport.test_connection(h))).await;
    let mut failed = 0usize;
    for (h, result) in config.hosts.iter().zip(results) {
        match result {
            Ok(()) => println!("{}\t{}:{}\tok", h.name, h.addr, h.port),
            Err(e) => {
                failed += 1;
                println!("{}\t{}:{}\t{e}", h.name, h.addr, h.port);
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} hosts unreachable", config.hosts.len());
    }
    Ok(())
}

async fn serve(bind: SocketAddr, config: DispatchConfig, transport: Arc<dyn Transport>) -> anyhow::Result<()> {
    let metrics = PrometheusMetrics::new()?;
    let dispatcher = Dispatcher::new(config, transport)?.with_metrics(Arc::new(metrics.clone()));
    let handler = Arc::new(DispatcherAdapter::new(Arc::new(dispatcher)));

    let app = HttpApi::new(handler).router().route(
        "/metrics",
        get(move || {
            let metrics = metrics.clone();
            async move {
                metrics
                    .encode_text()
                    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(%bind, "http api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("http api stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c; shutting down");
    }
}
