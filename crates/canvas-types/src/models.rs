use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A queued live chat row, in column order:
/// `[messageId, message, sendDate, channel, senderIntId, repliesTo]`.
///
/// Only the field count is checked. Values are kept exactly as received and
/// left to the column affinity when they are bound.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveChatRecord(pub [Value; 6]);

impl LiveChatRecord {
    pub const REQUIRED_FIELDS: usize = 5;

    /// `None` unless `data` is an array of at least five fields. A missing
    /// `repliesTo` becomes null; anything past the sixth field is ignored.
    pub fn from_payload(data: &Value) -> Option<Self> {
        let fields = data.as_array()?;
        if fields.len() < Self::REQUIRED_FIELDS {
            return None;
        }
        Some(Self(std::array::from_fn(|idx| {
            fields.get(idx).cloned().unwrap_or(Value::Null)
        })))
    }

    pub fn message_id(&self) -> &Value {
        &self.0[0]
    }

    pub fn replies_to(&self) -> &Value {
        &self.0[5]
    }
}

/// A queued place chat row, in column order:
/// `[messageId, message, sendDate, senderIntId, x, y]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceChatRecord(pub [Value; 6]);

impl PlaceChatRecord {
    pub const REQUIRED_FIELDS: usize = 6;

    pub fn from_payload(data: &Value) -> Option<Self> {
        let fields = data.as_array()?;
        if fields.len() < Self::REQUIRED_FIELDS {
            return None;
        }
        Some(Self(std::array::from_fn(|idx| fields[idx].clone())))
    }

    pub fn message_id(&self) -> &Value {
        &self.0[0]
    }
}

/// Typed builder for an `insertLiveChat` payload.
/// `sendDate` is seconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveChatInsert {
    pub message_id: i64,
    pub message: String,
    pub send_date: f64,
    pub channel: String,
    pub sender_int_id: i64,
    pub replies_to: Option<i64>,
}

impl LiveChatInsert {
    pub fn to_payload(&self) -> Value {
        serde_json::json!([
            self.message_id,
            self.message,
            self.send_date,
            self.channel,
            self.sender_int_id,
            self.replies_to,
        ])
    }
}

/// Typed builder for an `insertPlaceChat` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceChatInsert {
    pub message_id: i64,
    pub message: String,
    pub send_date: f64,
    pub sender_int_id: i64,
    pub x: i64,
    pub y: i64,
}

impl PlaceChatInsert {
    pub fn to_payload(&self) -> Value {
        serde_json::json!([
            self.message_id,
            self.message,
            self.send_date,
            self.sender_int_id,
            self.x,
            self.y,
        ])
    }
}
