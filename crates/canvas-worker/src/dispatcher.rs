use anyhow::{Result, bail};
use serde_json::{Value, json};
use tracing::{info, warn};

use canvas_db::{Database, FlushReport, PendingCounts, WriteCoalescer};
use canvas_types::api::{AuthenticateRequest, ExecRequest, SetChatNameRequest};
use canvas_types::envelope::{Envelope, Operation, Reply};

/// Owns the storage handle and the write buffers, and turns each incoming
/// call into exactly one reply.
///
/// Lifecycle: `new` (schema already created by `Database::open`), any number
/// of `handle`/`flush` calls, then `commit_shutdown`. After shutdown every
/// call is answered with `null`.
pub struct Dispatcher {
    db: Option<Database>,
    pending: WriteCoalescer,
}

impl Dispatcher {
    pub fn new(db: Database) -> Self {
        Self {
            db: Some(db),
            pending: WriteCoalescer::new(),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.db.is_none()
    }

    pub fn pending(&self) -> PendingCounts {
        self.pending.pending()
    }

    /// Run one call and build its reply. Never fails: unknown calls, bad
    /// payloads and storage errors all become `data: null`.
    pub fn handle(&mut self, envelope: Envelope) -> Reply {
        let Envelope { call, handle, data } = envelope;

        let data = match Operation::from_name(&call) {
            Some(op) => match self.dispatch(op, data) {
                Ok(result) => result,
                Err(e) => {
                    warn!("{} failed: {:#}", op.name(), e);
                    Value::Null
                }
            },
            None => {
                warn!("Unknown call {:?}", call);
                Value::Null
            }
        };

        Reply { handle, data }
    }

    fn dispatch(&mut self, op: Operation, data: Value) -> Result<Value> {
        if op == Operation::CommitShutdown {
            self.commit_shutdown()?;
            return Ok(Value::Null);
        }

        let Some(db) = self.db.as_mut() else {
            bail!("storage handle already released");
        };

        let result = match op {
            Operation::SetUserChatName => {
                let req: SetChatNameRequest = serde_json::from_value(data)?;
                db.set_user_chat_name(req.int_id, req.new_name.as_deref())?;
                Value::Null
            }
            Operation::GetUserChatName => {
                let int_id: i64 = serde_json::from_value(data)?;
                json!(db.get_user_chat_name(int_id)?)
            }
            Operation::AuthenticateUser => {
                let req: AuthenticateRequest = serde_json::from_value(data)?;
                json!(db.authenticate_user(&req.token, &req.ip)?)
            }
            Operation::UpdatePixelPlace => {
                let int_id: i64 = serde_json::from_value(data)?;
                self.pending.record_pixel_placement(int_id);
                Value::Null
            }
            Operation::GetMaxLiveChatId => json!(db.max_live_chat_id()?),
            Operation::GetMaxPlaceChatId => json!(db.max_place_chat_id()?),
            Operation::InsertLiveChat => {
                self.pending.enqueue_live_chat(&data);
                Value::Null
            }
            Operation::InsertPlaceChat => {
                self.pending.enqueue_place_chat(&data);
                Value::Null
            }
            Operation::Exec => {
                let req: ExecRequest = serde_json::from_value(data)?;
                match db.exec(&req.stmt, &req.params) {
                    Some(rows) => Value::Array(rows.into_iter().map(Value::Object).collect()),
                    None => Value::Null,
                }
            }
            Operation::CommitShutdown => unreachable!("handled above"),
        };

        Ok(result)
    }

    /// Drain the buffers into storage. A no-op once shut down.
    pub fn flush(&mut self) -> Option<FlushReport> {
        let db = self.db.as_mut()?;
        Some(db.flush(&mut self.pending))
    }

    /// Final flush, then release the storage handle.
    pub fn commit_shutdown(&mut self) -> Result<FlushReport> {
        let Some(mut db) = self.db.take() else {
            bail!("storage handle already released");
        };

        let report = db.flush(&mut self.pending);
        db.close()?;
        info!("Shutdown committed");
        Ok(report)
    }
}
