use std::sync::Arc;

use chrono::Utc;
use tracing::error;

use crate::db::{PinRecord, PinStore};

use super::error::PinError;
use super::model::{MessageSnapshot, PinLocation};

/// Durable source-to-copy mapping. A message with a record is never replicated again.
#[derive(Clone)]
pub struct PinLedger {
    store: Arc<dyn PinStore>,
}

impl PinLedger {
    pub fn new(store: Arc<dyn PinStore>) -> Self {
        Self { store }
    }

    pub async fn lookup(
        &self,
        guild_id: u64,
        source_message_id: u64,
    ) -> Result<Option<PinLocation>, PinError> {
        let record = self.store.get_pin(guild_id, source_message_id).await?;
        Ok(record.map(|record| PinLocation {
            channel_id: record.dest_channel_id,
            message_id: record.dest_message_id,
        }))
    }

    pub async fn record(
        &self,
        guild_id: u64,
        source: &MessageSnapshot,
        copy: PinLocation,
    ) -> Result<(), PinError> {
        let record = PinRecord {
            id: 0,
            guild_id,
            source_channel_id: source.channel_id,
            source_message_id: source.id,
            dest_channel_id: copy.channel_id,
            dest_message_id: copy.message_id,
            author_id: source.author.id,
            created_at: Utc::now(),
        };

        self.store.add_pin(&record).await.map_err(|err| {
            error!(
                "pin ledger write failed guild_id={} message_id={} copy_id={} error={}",
                guild_id, source.id, copy.message_id, err
            );
            PinError::LedgerWriteFailed(err)
        })
    }
}
