mod agent;
mod cli;
mod error;
mod kubernetes;
mod reconcile;
mod report;
mod trace;
mod trigger;
mod types;

use clap::Parser;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use agent::HttpStatusProbe;
use cli::Cli;
use kubernetes::{initialize_client, watch_endpoints};
use trace::Tracer;
use types::Trigger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout only carries reports
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let client = initialize_client(&cli.apiserver, cli.context.as_deref()).await?;
    let probe = HttpStatusProbe::new(Duration::from_secs(cli.status_timeout))?;
    let tracer = Tracer::new(
        client.clone(),
        Arc::new(probe),
        cli.namespace.clone(),
        cli.endpoints.clone(),
        usize::from(cli.concurrency),
    );

    let mut stdout = std::io::stdout();
    let color = stdout.is_terminal();

    if cli.once {
        let result = tracer.run_pass().await?;
        report::write_report(&mut stdout, &result, cli.output, color)?;
        return Ok(());
    }

    let (tx, rx) = mpsc::channel::<Trigger>(16);
    let ticker = trigger::spawn_ticker(Duration::from_secs(cli.interval), tx.clone());

    if cli.watch {
        let tx = tx.clone();
        let namespace = cli.namespace.clone();
        let name = cli.endpoints.clone();
        tokio::spawn(async move {
            if let Err(err) = watch_endpoints(client, namespace.clone(), name.clone(), tx).await {
                warn!("[{}/{}] Endpoints watcher stopped: {}", namespace, name, err);
            }
        });
    }
    drop(tx);

    info!(
        "Tracing endpoints {}/{} every {}s",
        cli.namespace, cli.endpoints, cli.interval
    );
    let result = tracer
        .run(rx, trace::ctrl_c(), &mut stdout, cli.output, color)
        .await;
    ticker.abort();
    result
}
