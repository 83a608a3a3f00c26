//! # scanhub-agent
//!
//! Scanner-side agent. Reads scans from standard input (one per line, as a
//! keyboard-wedge scanner types them), forwards them to the hub when
//! connectivity allows and queues them locally otherwise.
//!
//! See [`scanhub_agent::console`] for the input line protocol.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use scanhub_agent::{AgentConfig, AgentContext, Console, Orchestrator, Reply, RetryWorker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,scanhub_agent=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting scanhub agent v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration and build the context
    // -----------------------------------------------------------------------
    let config = AgentConfig::from_env();
    info!(?config, "Loaded configuration");

    let ctx = Arc::new(AgentContext::from_config(config)?);
    info!(
        agent_id = %ctx.agent_id,
        registration_degraded = ctx.registration.is_degraded(),
        hub = %ctx.registration.host_name(),
        notifications = ctx.notifier.is_some(),
        "Agent context ready"
    );

    // -----------------------------------------------------------------------
    // 3. Spawn background tasks
    // -----------------------------------------------------------------------
    let orchestrator = Orchestrator::new(ctx.clone());
    let monitor = ctx.monitor.clone().start();
    let worker = RetryWorker::new(orchestrator.clone()).start();

    // -----------------------------------------------------------------------
    // 4. Scan loop (blocks until EOF, `quit`, or Ctrl+C)
    // -----------------------------------------------------------------------
    let result = tokio::select! {
        result = scan_loop(&orchestrator) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    };

    worker.stop().await;
    monitor.stop().await;

    if let Err(e) = &result {
        error!(error = %e, "Scan loop failed");
    }
    result
}

async fn scan_loop(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let mut console = Console::new(orchestrator.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match console.handle_line(&line).await {
            Reply::Print(text) => println!("{text}"),
            Reply::Silent => {}
            Reply::Quit => break,
        }
    }

    if let Some(held) = console.held() {
        warn!(barcode = %held.barcode, quantity = held.quantity, "Exiting with a scan that was never recorded");
    }
    Ok(())
}
