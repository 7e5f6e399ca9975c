use anyhow::Result;
use canvas_types::models::{LiveChatRecord, PlaceChatRecord};
use tracing::{error, info};

use crate::Database;
use crate::coalescer::WriteCoalescer;
use crate::queries::json_to_sql;

/// What one flush wrote. Each half is its own transaction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub users_updated: usize,
    pub live_chats: usize,
    pub place_chats: usize,
    pub pixel_flush_failed: bool,
    pub chat_flush_failed: bool,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.users_updated == 0
            && self.live_chats == 0
            && self.place_chats == 0
            && !self.pixel_flush_failed
            && !self.chat_flush_failed
    }
}

impl Database {
    /// Move everything buffered in `pending` into storage.
    ///
    /// Pixel deltas and chat messages are committed in two independent
    /// transactions. A failed transaction is rolled back and its snapshot is
    /// discarded; nothing is retried.
    pub fn flush(&mut self, pending: &mut WriteCoalescer) -> FlushReport {
        let mut report = FlushReport::default();

        let deltas = pending.take_pixel_deltas();
        if !deltas.is_empty() {
            match self.apply_pixel_deltas(&deltas) {
                Ok(updated) => report.users_updated = updated,
                Err(e) => {
                    error!(
                        "Pixel count flush rolled back, {} user deltas dropped: {:#}",
                        deltas.len(),
                        e
                    );
                    report.pixel_flush_failed = true;
                }
            }
        }

        let (live, place) = pending.take_chats();
        if !live.is_empty() || !place.is_empty() {
            match self.insert_chats(&live, &place) {
                Ok(()) => {
                    report.live_chats = live.len();
                    report.place_chats = place.len();
                }
                Err(e) => {
                    error!(
                        "Chat flush rolled back, {} live and {} place messages dropped: {:#}",
                        live.len(),
                        place.len(),
                        e
                    );
                    report.chat_flush_failed = true;
                }
            }
        }

        if report.users_updated > 0 || report.live_chats > 0 || report.place_chats > 0 {
            info!(
                "Flushed pixel counts for {} users, {} live chats, {} place chats",
                report.users_updated, report.live_chats, report.place_chats
            );
        }

        report
    }

    fn apply_pixel_deltas(&mut self, deltas: &[(i64, i64)]) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut updated = 0;
            {
                let mut stmt = tx.prepare_cached(
                    "UPDATE Users SET pixelsPlaced = COALESCE(pixelsPlaced, 0) + ?1 WHERE intId = ?2",
                )?;
                for (int_id, delta) in deltas {
                    updated += stmt.execute(rusqlite::params![delta, int_id])?;
                }
            }
            tx.commit()?;
            Ok(updated)
        })
    }

    fn insert_chats(&mut self, live: &[LiveChatRecord], place: &[PlaceChatRecord]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut insert_live = tx.prepare_cached(
                    "INSERT INTO LiveChatMessages (messageId, message, sendDate, channel, senderIntId, repliesTo)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for m in live {
                    insert_live.execute(rusqlite::params_from_iter(m.0.iter().map(json_to_sql)))?;
                }

                let mut insert_place = tx.prepare_cached(
                    "INSERT INTO PlaceChatMessages (messageId, message, sendDate, senderIntId, x, y)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for m in place {
                    insert_place.execute(rusqlite::params_from_iter(m.0.iter().map(json_to_sql)))?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }
}
