mod stdio;

use anyhow::anyhow;
use serde_json::Value;
use tracing::{error, info};

use canvas_db::Database;
use canvas_types::envelope::{Envelope, Operation};
use canvas_worker::WorkerConfig;
use canvas_worker::worker::{self, WorkerChannels};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging; stdout carries replies, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "canvas=debug".into()),
        )
        .init();

    // Config and schema. Any failure here is final: log it once and exit.
    let opened = WorkerConfig::from_env().and_then(|config| {
        let db = Database::open(&config.db_path)?;
        Ok((config, db))
    });
    let (config, db) = match opened {
        Ok(opened) => opened,
        Err(e) => {
            error!("Database worker failed to start: {:#}", e);
            std::process::exit(1);
        }
    };

    let (channels, worker_thread) = worker::spawn(db, config.flush_interval)?;
    let WorkerChannels { calls, replies } = channels;

    let writer = tokio::spawn(stdio::write_replies(tokio::io::stdout(), replies));

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut shutdown_sent = false;
    let signalled = tokio::select! {
        forwarded = stdio::forward_calls(stdin, &calls, &mut shutdown_sent) => {
            forwarded?;
            false
        }
        _ = shutdown_signal() => true,
    };

    if !shutdown_sent {
        info!("Input closed, committing shutdown");
        let _ = calls.send(Envelope::new(Operation::CommitShutdown, Value::Null, Value::Null));
    }

    // Dropping the last sender lets the worker finish and close its reply channel
    drop(calls);
    tokio::task::spawn_blocking(move || worker_thread.join())
        .await?
        .map_err(|_| anyhow!("database worker thread panicked"))?;
    writer.await??;

    info!("Database worker exited cleanly");

    if signalled {
        // the blocking stdin read cannot be cancelled and would hold the runtime open
        std::process::exit(0);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
