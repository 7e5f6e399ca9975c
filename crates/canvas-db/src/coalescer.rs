use std::collections::{HashMap, VecDeque};

use canvas_types::models::{LiveChatRecord, PlaceChatRecord};
use serde_json::Value;
use tracing::debug;

/// Writes that are held in memory until the next flush.
///
/// Pixel placements collapse into one additive delta per user. Chat inserts
/// keep their arrival order.
#[derive(Debug, Default)]
pub struct WriteCoalescer {
    pixel_deltas: HashMap<i64, i64>,
    live_chat: VecDeque<LiveChatRecord>,
    place_chat: VecDeque<PlaceChatRecord>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PendingCounts {
    pub pixel_users: usize,
    pub live_chat: usize,
    pub place_chat: usize,
}

impl WriteCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pixel_placement(&mut self, int_id: i64) {
        *self.pixel_deltas.entry(int_id).or_insert(0) += 1;
    }

    /// Queue a positional live chat payload. Payloads with fewer than five
    /// fields are dropped without error; the return value only says whether
    /// it was queued.
    pub fn enqueue_live_chat(&mut self, data: &Value) -> bool {
        match LiveChatRecord::from_payload(data) {
            Some(record) => {
                self.live_chat.push_back(record);
                true
            }
            None => {
                debug!("Dropping live chat insert with short payload: {}", data);
                false
            }
        }
    }

    pub fn enqueue_place_chat(&mut self, data: &Value) -> bool {
        match PlaceChatRecord::from_payload(data) {
            Some(record) => {
                self.place_chat.push_back(record);
                true
            }
            None => {
                debug!("Dropping place chat insert with short payload: {}", data);
                false
            }
        }
    }

    pub fn pending(&self) -> PendingCounts {
        PendingCounts {
            pixel_users: self.pixel_deltas.len(),
            live_chat: self.live_chat.len(),
            place_chat: self.place_chat.len(),
        }
    }

    pub fn pixel_delta(&self, int_id: i64) -> i64 {
        self.pixel_deltas.get(&int_id).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.pixel_deltas.is_empty() && self.live_chat.is_empty() && self.place_chat.is_empty()
    }

    /// Snapshot and clear the pending deltas, ordered by user id.
    pub fn take_pixel_deltas(&mut self) -> Vec<(i64, i64)> {
        let mut deltas: Vec<(i64, i64)> = std::mem::take(&mut self.pixel_deltas).into_iter().collect();
        deltas.sort_unstable_by_key(|(int_id, _)| *int_id);
        deltas
    }

    /// Drain both chat queues, each in arrival order.
    pub fn take_chats(&mut self) -> (Vec<LiveChatRecord>, Vec<PlaceChatRecord>) {
        (
            self.live_chat.drain(..).collect(),
            self.place_chat.drain(..).collect(),
        )
    }
}
