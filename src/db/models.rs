use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::config::GuildDefaults;

/// Per-guild pin settings. Created lazily from `GuildDefaults`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildConfig {
    pub guild_id: u64,
    pub channel_id: Option<u64>,
    pub threshold: u32,
    pub nsfw: bool,
    pub selfpin: bool,
    pub dm: bool,
    pub reply_depth: u32,
    pub allowlist: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GuildConfig {
    pub fn from_defaults(guild_id: u64, defaults: &GuildDefaults) -> Self {
        let now = Utc::now();
        Self {
            guild_id,
            channel_id: None,
            threshold: defaults.threshold.max(1),
            nsfw: defaults.nsfw,
            selfpin: defaults.selfpin,
            dm: defaults.dm,
            reply_depth: defaults.reply_depth,
            allowlist: defaults.allowlist.iter().cloned().collect(),
            created_at: now,
            updated_at: now,
        }
    }

    /// An empty allowlist accepts every emoji.
    pub fn allows(&self, emoji: &str) -> bool {
        self.allowlist.is_empty() || self.allowlist.contains(emoji)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRecord {
    pub id: i64,
    pub guild_id: u64,
    pub source_channel_id: u64,
    pub source_message_id: u64,
    pub dest_channel_id: u64,
    pub dest_message_id: u64,
    pub author_id: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IdentitySlot {
    pub id: u64,
    pub token: SecretString,
}

/// Persisted posting identities of a guild. `secondary` is only used by the alternating strategy.
#[derive(Debug, Clone)]
pub struct IdentityRecord {
    pub guild_id: u64,
    pub primary: IdentitySlot,
    pub secondary: Option<IdentitySlot>,
    pub next_slot: u8,
    pub last_used_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinStat {
    pub guild_id: u64,
    pub user_id: u64,
    pub emoji: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub(crate) fn encode_allowlist(allowlist: &BTreeSet<String>) -> Result<String, crate::db::DatabaseError> {
    serde_json::to_string(allowlist)
        .map_err(|e| crate::db::DatabaseError::Serialization(e.to_string()))
}

pub(crate) fn decode_allowlist(raw: &str) -> Result<BTreeSet<String>, crate::db::DatabaseError> {
    if raw.trim().is_empty() {
        return Ok(BTreeSet::new());
    }
    serde_json::from_str(raw).map_err(|e| crate::db::DatabaseError::Serialization(e.to_string()))
}
