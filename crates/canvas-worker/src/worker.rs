use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use canvas_db::Database;
use canvas_types::envelope::{Envelope, Reply};

use crate::dispatcher::Dispatcher;

/// The caller's side of a running worker.
pub struct WorkerChannels {
    pub calls: mpsc::UnboundedSender<Envelope>,
    pub replies: mpsc::UnboundedReceiver<Reply>,
}

/// Start the worker on its own thread with a single-threaded runtime.
///
/// The thread owns `db`. It exits once every `calls` sender is dropped.
pub fn spawn(db: Database, flush_interval: Duration) -> std::io::Result<(WorkerChannels, JoinHandle<()>)> {
    let (call_tx, call_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();

    let handle = thread::Builder::new()
        .name("canvas-db-worker".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Failed to start worker runtime: {}", e);
                    return;
                }
            };
            runtime.block_on(run(Dispatcher::new(db), call_rx, reply_tx, flush_interval));
        })?;

    Ok((
        WorkerChannels {
            calls: call_tx,
            replies: reply_rx,
        },
        handle,
    ))
}

/// The worker loop. Calls are handled one at a time in arrival order; the
/// flush timer runs on the same task, so a flush never overlaps a call.
pub async fn run(
    mut dispatcher: Dispatcher,
    mut calls: mpsc::UnboundedReceiver<Envelope>,
    replies: mpsc::UnboundedSender<Reply>,
    flush_interval: Duration,
) {
    let mut flush_timer = tokio::time::interval(flush_interval);
    flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    flush_timer.tick().await;

    info!("Database worker started (flush every {:?})", flush_interval);

    loop {
        tokio::select! {
            envelope = calls.recv() => {
                let Some(envelope) = envelope else { break };
                let reply = dispatcher.handle(envelope);
                if replies.send(reply).is_err() {
                    warn!("Reply receiver dropped, reply discarded");
                }
            }
            _ = flush_timer.tick(), if !dispatcher.is_shut_down() => {
                dispatcher.flush();
            }
        }
    }

    if dispatcher.is_shut_down() {
        info!("Database worker stopped");
    } else {
        let pending = dispatcher.pending();
        warn!(
            "Database worker stopped without commitShutdown; dropping {} pixel deltas, {} live chats, {} place chats",
            pending.pixel_users, pending.live_chat, pending.place_chat
        );
    }
}
