use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

use crate::db::schema_sqlite::{guild_configs, identities, pin_stats, pins};

use super::{
    DatabaseError,
    error::parse_snowflake,
    models::{
        GuildConfig, IdentityRecord, IdentitySlot, PinRecord, PinStat, decode_allowlist,
        encode_allowlist,
    },
};

// Helper function to convert DateTime to ISO string for SQLite
fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// Helper function to parse ISO string to DateTime
fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Query(format!("invalid datetime format: {}", e)))
}

/// Writers wait this long for a competing connection instead of failing with SQLITE_BUSY.
pub(crate) const BUSY_TIMEOUT_MS: u32 = 5_000;

pub(crate) fn establish_connection(path: &str) -> Result<SqliteConnection, DatabaseError> {
    let mut conn =
        SqliteConnection::establish(path).map_err(|e| DatabaseError::Connection(e.to_string()))?;
    conn.batch_execute(&format!(
        "PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}; PRAGMA synchronous = NORMAL;"
    ))
    .map_err(|e| DatabaseError::Connection(format!("failed to configure sqlite connection: {e}")))?;
    Ok(conn)
}

async fn with_connection<T, F>(db_path: Arc<String>, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = establish_connection(&db_path)?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = guild_configs)]
#[diesel(treat_none_as_null = true)]
struct DbGuildConfig {
    guild_id: String,
    channel_id: Option<String>,
    threshold: i32,
    nsfw: bool,
    selfpin: bool,
    dm: bool,
    reply_depth: i32,
    allowlist: String,
    created_at: String,
    updated_at: String,
}

impl DbGuildConfig {
    fn from_config(config: &GuildConfig) -> Result<Self, DatabaseError> {
        Ok(Self {
            guild_id: config.guild_id.to_string(),
            channel_id: config.channel_id.map(|id| id.to_string()),
            threshold: config.threshold as i32,
            nsfw: config.nsfw,
            selfpin: config.selfpin,
            dm: config.dm,
            reply_depth: config.reply_depth as i32,
            allowlist: encode_allowlist(&config.allowlist)?,
            created_at: datetime_to_string(&config.created_at),
            updated_at: datetime_to_string(&config.updated_at),
        })
    }

    fn to_config(&self) -> Result<GuildConfig, DatabaseError> {
        Ok(GuildConfig {
            guild_id: parse_snowflake("guild_id", &self.guild_id)?,
            channel_id: self
                .channel_id
                .as_deref()
                .map(|id| parse_snowflake("channel_id", id))
                .transpose()?,
            threshold: self.threshold.max(1) as u32,
            nsfw: self.nsfw,
            selfpin: self.selfpin,
            dm: self.dm,
            reply_depth: self.reply_depth.max(0) as u32,
            allowlist: decode_allowlist(&self.allowlist)?,
            created_at: string_to_datetime(&self.created_at)?,
            updated_at: string_to_datetime(&self.updated_at)?,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = pins)]
struct DbPinRecord {
    id: i32,
    guild_id: String,
    source_channel_id: String,
    source_message_id: String,
    dest_channel_id: String,
    dest_message_id: String,
    author_id: String,
    created_at: String,
}

impl DbPinRecord {
    fn to_pin_record(&self) -> Result<PinRecord, DatabaseError> {
        Ok(PinRecord {
            id: self.id as i64,
            guild_id: parse_snowflake("guild_id", &self.guild_id)?,
            source_channel_id: parse_snowflake("source_channel_id", &self.source_channel_id)?,
            source_message_id: parse_snowflake("source_message_id", &self.source_message_id)?,
            dest_channel_id: parse_snowflake("dest_channel_id", &self.dest_channel_id)?,
            dest_message_id: parse_snowflake("dest_message_id", &self.dest_message_id)?,
            author_id: parse_snowflake("author_id", &self.author_id)?,
            created_at: string_to_datetime(&self.created_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = pins)]
struct NewPinRecord {
    guild_id: String,
    source_channel_id: String,
    source_message_id: String,
    dest_channel_id: String,
    dest_message_id: String,
    author_id: String,
    created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = identities)]
#[diesel(treat_none_as_null = true)]
struct DbIdentityRecord {
    guild_id: String,
    primary_id: String,
    primary_token: String,
    secondary_id: Option<String>,
    secondary_token: Option<String>,
    next_slot: i32,
    last_used_at: Option<String>,
    updated_at: String,
}

impl DbIdentityRecord {
    fn from_record(record: &IdentityRecord) -> Self {
        Self {
            guild_id: record.guild_id.to_string(),
            primary_id: record.primary.id.to_string(),
            primary_token: record.primary.token.expose_secret().clone(),
            secondary_id: record.secondary.as_ref().map(|slot| slot.id.to_string()),
            secondary_token: record
                .secondary
                .as_ref()
                .map(|slot| slot.token.expose_secret().clone()),
            next_slot: record.next_slot as i32,
            last_used_at: record.last_used_at.as_ref().map(datetime_to_string),
            updated_at: datetime_to_string(&record.updated_at),
        }
    }

    fn to_record(&self) -> Result<IdentityRecord, DatabaseError> {
        let secondary = match (&self.secondary_id, &self.secondary_token) {
            (Some(id), Some(token)) => Some(IdentitySlot {
                id: parse_snowflake("secondary_id", id)?,
                token: SecretString::new(token.clone()),
            }),
            _ => None,
        };

        Ok(IdentityRecord {
            guild_id: parse_snowflake("guild_id", &self.guild_id)?,
            primary: IdentitySlot {
                id: parse_snowflake("primary_id", &self.primary_id)?,
                token: SecretString::new(self.primary_token.clone()),
            },
            secondary,
            next_slot: self.next_slot.clamp(0, 1) as u8,
            last_used_at: self
                .last_used_at
                .as_deref()
                .map(string_to_datetime)
                .transpose()?,
            updated_at: string_to_datetime(&self.updated_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = pin_stats)]
struct NewPinStat {
    guild_id: String,
    user_id: String,
    emoji: Option<String>,
    created_at: String,
}

pub struct SqliteConfigStore {
    db_path: Arc<String>,
}

impl SqliteConfigStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::ConfigStore for SqliteConfigStore {
    async fn get_config(&self, guild: u64) -> Result<Option<GuildConfig>, DatabaseError> {
        let guild = guild.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::guild_configs::dsl::*;
            guild_configs
                .filter(guild_id.eq(guild))
                .select(DbGuildConfig::as_select())
                .first::<DbGuildConfig>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|c| c.to_config())
                .transpose()
        })
        .await
    }

    async fn save_config(&self, config: &GuildConfig) -> Result<(), DatabaseError> {
        let row = DbGuildConfig::from_config(config)?;
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::guild_configs::dsl::*;
            diesel::insert_into(guild_configs)
                .values(&row)
                .on_conflict(guild_id)
                .do_update()
                .set(&row)
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}

pub struct SqlitePinStore {
    db_path: Arc<String>,
}

impl SqlitePinStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::PinStore for SqlitePinStore {
    async fn get_pin(
        &self,
        guild: u64,
        source_message: u64,
    ) -> Result<Option<PinRecord>, DatabaseError> {
        let guild = guild.to_string();
        let source_message = source_message.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::pins::dsl::*;
            pins.filter(guild_id.eq(guild))
                .filter(source_message_id.eq(source_message))
                .select(DbPinRecord::as_select())
                .first::<DbPinRecord>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|p| p.to_pin_record())
                .transpose()
        })
        .await
    }

    async fn add_pin(&self, record: &PinRecord) -> Result<(), DatabaseError> {
        let new_pin = NewPinRecord {
            guild_id: record.guild_id.to_string(),
            source_channel_id: record.source_channel_id.to_string(),
            source_message_id: record.source_message_id.to_string(),
            dest_channel_id: record.dest_channel_id.to_string(),
            dest_message_id: record.dest_message_id.to_string(),
            author_id: record.author_id.to_string(),
            created_at: datetime_to_string(&record.created_at),
        };
        with_connection(self.db_path.clone(), move |conn| {
            diesel::insert_into(pins::table)
                .values(&new_pin)
                .execute(conn)
                .map(|_| ())
                .map_err(DatabaseError::from_insert)
        })
        .await
    }

    async fn count_pins(&self, guild: u64) -> Result<i64, DatabaseError> {
        let guild = guild.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::pins::dsl::*;
            pins.filter(guild_id.eq(guild))
                .count()
                .get_result(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}

pub struct SqliteIdentityStore {
    db_path: Arc<String>,
}

impl SqliteIdentityStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::IdentityStore for SqliteIdentityStore {
    async fn get_identity(&self, guild: u64) -> Result<Option<IdentityRecord>, DatabaseError> {
        let guild = guild.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::identities::dsl::*;
            identities
                .filter(guild_id.eq(guild))
                .select(DbIdentityRecord::as_select())
                .first::<DbIdentityRecord>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|r| r.to_record())
                .transpose()
        })
        .await
    }

    async fn set_identity(&self, record: &IdentityRecord) -> Result<(), DatabaseError> {
        let row = DbIdentityRecord::from_record(record);
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::identities::dsl::*;

            conn.immediate_transaction(|conn| {
                let updated = diesel::update(identities.filter(guild_id.eq(&row.guild_id)))
                    .set(&row)
                    .execute(conn)?;
                if updated == 0 {
                    diesel::insert_into(identities).values(&row).execute(conn)?;
                }
                Ok::<_, diesel::result::Error>(())
            })
            .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete_identity(&self, guild: u64) -> Result<(), DatabaseError> {
        let guild = guild.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::identities::dsl::*;
            diesel::delete(identities.filter(guild_id.eq(guild)))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}

pub struct SqliteStatsStore {
    db_path: Arc<String>,
}

impl SqliteStatsStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::StatsStore for SqliteStatsStore {
    async fn add_stat(&self, stat: &PinStat) -> Result<(), DatabaseError> {
        let new_stat = NewPinStat {
            guild_id: stat.guild_id.to_string(),
            user_id: stat.user_id.to_string(),
            emoji: stat.emoji.clone(),
            created_at: datetime_to_string(&stat.created_at),
        };
        with_connection(self.db_path.clone(), move |conn| {
            diesel::insert_into(pin_stats::table)
                .values(&new_stat)
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn count_stats_for_user(&self, guild: u64, user: u64) -> Result<i64, DatabaseError> {
        let guild = guild.to_string();
        let user = user.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::pin_stats::dsl::*;
            pin_stats
                .filter(guild_id.eq(guild))
                .filter(user_id.eq(user))
                .count()
                .get_result(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}
