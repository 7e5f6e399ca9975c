use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::warn;

use canvas_types::api::Row;
use canvas_types::envelope::{Envelope, Operation, Reply};
use canvas_types::models::{LiveChatInsert, PlaceChatInsert};

use crate::error::WorkerError;
use crate::worker::WorkerChannels;

/// Typed, cloneable front end for the worker.
///
/// Every call gets a fresh numeric handle; replies are matched back to the
/// waiting caller through the pending map, whatever order callers await in.
#[derive(Clone)]
pub struct WorkerClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    calls: mpsc::UnboundedSender<Envelope>,
    pending: PendingReplies,
    next_handle: AtomicU64,
}

/// handle -> waiting caller
type PendingReplies = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

impl WorkerClient {
    /// Wrap a worker's channels. Spawns the reply router on the current runtime.
    pub fn new(channels: WorkerChannels) -> Self {
        let WorkerChannels { calls, replies } = channels;
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));

        // The router holds only the pending map, so dropping the last client
        // closes the call channel and lets the worker stop.
        tokio::spawn(route_replies(pending.clone(), replies));

        Self {
            inner: Arc::new(ClientInner {
                calls,
                pending,
                next_handle: AtomicU64::new(1),
            }),
        }
    }

    /// Send a raw call and wait for its reply payload.
    pub async fn call(&self, op: Operation, data: Value) -> Result<Value, WorkerError> {
        let handle = self.inner.next_handle.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(handle, tx);

        if self.inner.calls.send(Envelope::new(op, json!(handle), data)).is_err() {
            self.inner.pending.lock().await.remove(&handle);
            return Err(WorkerError::Closed);
        }

        rx.await.map_err(|_| WorkerError::ReplyDropped(handle))
    }

    async fn call_as<T: DeserializeOwned>(&self, op: Operation, data: Value) -> Result<T, WorkerError> {
        let value = self.call(op, data).await?;
        Ok(serde_json::from_value(value)?)
    }

    // -- Users --

    pub async fn authenticate_user(&self, token: &str, ip: &str) -> Result<i64, WorkerError> {
        self.call_as(Operation::AuthenticateUser, json!({ "token": token, "ip": ip }))
            .await
    }

    pub async fn set_user_chat_name(&self, int_id: i64, name: Option<&str>) -> Result<(), WorkerError> {
        self.call(Operation::SetUserChatName, json!({ "newName": name, "intId": int_id }))
            .await?;
        Ok(())
    }

    pub async fn get_user_chat_name(&self, int_id: i64) -> Result<Option<String>, WorkerError> {
        self.call_as(Operation::GetUserChatName, json!(int_id)).await
    }

    pub async fn update_pixel_place(&self, int_id: i64) -> Result<(), WorkerError> {
        self.call(Operation::UpdatePixelPlace, json!(int_id)).await?;
        Ok(())
    }

    // -- Chat --

    pub async fn insert_live_chat(&self, insert: &LiveChatInsert) -> Result<(), WorkerError> {
        self.call(Operation::InsertLiveChat, insert.to_payload()).await?;
        Ok(())
    }

    pub async fn insert_place_chat(&self, insert: &PlaceChatInsert) -> Result<(), WorkerError> {
        self.call(Operation::InsertPlaceChat, insert.to_payload()).await?;
        Ok(())
    }

    pub async fn max_live_chat_id(&self) -> Result<i64, WorkerError> {
        self.call_as(Operation::GetMaxLiveChatId, Value::Null).await
    }

    pub async fn max_place_chat_id(&self) -> Result<i64, WorkerError> {
        self.call_as(Operation::GetMaxPlaceChatId, Value::Null).await
    }

    // -- Raw queries / lifecycle --

    /// `None` means the statement failed (or the worker is shut down).
    pub async fn exec(&self, stmt: &str, params: Value) -> Result<Option<Vec<Row>>, WorkerError> {
        self.call_as(Operation::Exec, json!({ "stmt": stmt, "params": params }))
            .await
    }

    pub async fn commit_shutdown(&self) -> Result<(), WorkerError> {
        self.call(Operation::CommitShutdown, Value::Null).await?;
        Ok(())
    }
}

async fn route_replies(pending: PendingReplies, mut replies: mpsc::UnboundedReceiver<Reply>) {
    while let Some(reply) = replies.recv().await {
        let Some(handle) = reply.handle.as_u64() else {
            warn!("Reply with non-numeric handle {}", reply.handle);
            continue;
        };

        match pending.lock().await.remove(&handle) {
            Some(tx) => {
                // the caller may have given up; nothing to do then
                let _ = tx.send(reply.data);
            }
            None => warn!("Reply for unknown handle {}", handle),
        }
    }

    // Worker gone: fail everyone still waiting
    pending.lock().await.clear();
}
