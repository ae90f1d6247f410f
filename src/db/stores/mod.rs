use std::sync::Arc;

use async_trait::async_trait;

use super::DatabaseError;
use super::models::{GuildConfig, IdentityRecord, PinRecord, PinStat};

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_config(&self, guild_id: u64) -> Result<Option<GuildConfig>, DatabaseError>;
    async fn save_config(&self, config: &GuildConfig) -> Result<(), DatabaseError>;
}

/// Ledger of replicated messages. `add_pin` fails with `DatabaseError::Conflict`
/// when the source message already has a record.
#[async_trait]
pub trait PinStore: Send + Sync {
    async fn get_pin(
        &self,
        guild_id: u64,
        source_message_id: u64,
    ) -> Result<Option<PinRecord>, DatabaseError>;
    async fn add_pin(&self, record: &PinRecord) -> Result<(), DatabaseError>;
    async fn count_pins(&self, guild_id: u64) -> Result<i64, DatabaseError>;
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get_identity(&self, guild_id: u64) -> Result<Option<IdentityRecord>, DatabaseError>;
    async fn set_identity(&self, record: &IdentityRecord) -> Result<(), DatabaseError>;
    async fn delete_identity(&self, guild_id: u64) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn add_stat(&self, stat: &PinStat) -> Result<(), DatabaseError>;
    async fn count_stats_for_user(&self, guild_id: u64, user_id: u64)
    -> Result<i64, DatabaseError>;
}

/// Store handles shared by every component that touches persistence.
#[derive(Clone)]
pub struct Stores {
    pub configs: Arc<dyn ConfigStore>,
    pub pins: Arc<dyn PinStore>,
    pub identities: Arc<dyn IdentityStore>,
    pub stats: Arc<dyn StatsStore>,
}
