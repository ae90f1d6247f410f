use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use secrecy::{ExposeSecret, SecretString};

use crate::db::manager::Pool;
use crate::db::schema::{guild_configs, identities, pin_stats, pins};

use super::{
    DatabaseError,
    error::parse_snowflake,
    models::{
        GuildConfig, IdentityRecord, IdentitySlot, PinRecord, PinStat, decode_allowlist,
        encode_allowlist,
    },
};

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
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
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
            created_at: config.created_at,
            updated_at: config.updated_at,
        })
    }
}

impl TryFrom<DbGuildConfig> for GuildConfig {
    type Error = DatabaseError;

    fn try_from(value: DbGuildConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            guild_id: parse_snowflake("guild_id", &value.guild_id)?,
            channel_id: value
                .channel_id
                .as_deref()
                .map(|id| parse_snowflake("channel_id", id))
                .transpose()?,
            threshold: value.threshold.max(1) as u32,
            nsfw: value.nsfw,
            selfpin: value.selfpin,
            dm: value.dm,
            reply_depth: value.reply_depth.max(0) as u32,
            allowlist: decode_allowlist(&value.allowlist)?,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = pins)]
struct DbPinRecord {
    id: i64,
    guild_id: String,
    source_channel_id: String,
    source_message_id: String,
    dest_channel_id: String,
    dest_message_id: String,
    author_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DbPinRecord> for PinRecord {
    type Error = DatabaseError;

    fn try_from(value: DbPinRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id,
            guild_id: parse_snowflake("guild_id", &value.guild_id)?,
            source_channel_id: parse_snowflake("source_channel_id", &value.source_channel_id)?,
            source_message_id: parse_snowflake("source_message_id", &value.source_message_id)?,
            dest_channel_id: parse_snowflake("dest_channel_id", &value.dest_channel_id)?,
            dest_message_id: parse_snowflake("dest_message_id", &value.dest_message_id)?,
            author_id: parse_snowflake("author_id", &value.author_id)?,
            created_at: value.created_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = pins)]
struct NewPinRecord<'a> {
    guild_id: String,
    source_channel_id: String,
    source_message_id: String,
    dest_channel_id: String,
    dest_message_id: String,
    author_id: String,
    created_at: &'a DateTime<Utc>,
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
    next_slot: i16,
    last_used_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl From<&IdentityRecord> for DbIdentityRecord {
    fn from(record: &IdentityRecord) -> Self {
        Self {
            guild_id: record.guild_id.to_string(),
            primary_id: record.primary.id.to_string(),
            primary_token: record.primary.token.expose_secret().clone(),
            secondary_id: record.secondary.as_ref().map(|slot| slot.id.to_string()),
            secondary_token: record
                .secondary
                .as_ref()
                .map(|slot| slot.token.expose_secret().clone()),
            next_slot: record.next_slot as i16,
            last_used_at: record.last_used_at,
            updated_at: record.updated_at,
        }
    }
}

impl TryFrom<DbIdentityRecord> for IdentityRecord {
    type Error = DatabaseError;

    fn try_from(value: DbIdentityRecord) -> Result<Self, Self::Error> {
        let secondary = match (value.secondary_id, value.secondary_token) {
            (Some(id), Some(token)) => Some(IdentitySlot {
                id: parse_snowflake("secondary_id", &id)?,
                token: SecretString::new(token),
            }),
            _ => None,
        };

        Ok(Self {
            guild_id: parse_snowflake("guild_id", &value.guild_id)?,
            primary: IdentitySlot {
                id: parse_snowflake("primary_id", &value.primary_id)?,
                token: SecretString::new(value.primary_token),
            },
            secondary,
            next_slot: value.next_slot.clamp(0, 1) as u8,
            last_used_at: value.last_used_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = pin_stats)]
struct NewPinStat<'a> {
    guild_id: String,
    user_id: String,
    emoji: Option<&'a str>,
    created_at: &'a DateTime<Utc>,
}

async fn with_connection<T, F>(pool: Pool, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

pub struct PostgresConfigStore {
    pool: Pool,
}

impl PostgresConfigStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::ConfigStore for PostgresConfigStore {
    async fn get_config(&self, guild: u64) -> Result<Option<GuildConfig>, DatabaseError> {
        let pool = self.pool.clone();
        let guild = guild.to_string();
        with_connection(pool, move |conn| {
            use crate::db::schema::guild_configs::dsl::*;
            guild_configs
                .filter(guild_id.eq(guild))
                .select(DbGuildConfig::as_select())
                .first::<DbGuildConfig>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(GuildConfig::try_from)
                .transpose()
        })
        .await
    }

    async fn save_config(&self, config: &GuildConfig) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        let row = DbGuildConfig::from_config(config)?;
        with_connection(pool, move |conn| {
            use crate::db::schema::guild_configs::dsl::*;
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

pub struct PostgresPinStore {
    pool: Pool,
}

impl PostgresPinStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::PinStore for PostgresPinStore {
    async fn get_pin(
        &self,
        guild: u64,
        source_message: u64,
    ) -> Result<Option<PinRecord>, DatabaseError> {
        let pool = self.pool.clone();
        let guild = guild.to_string();
        let source_message = source_message.to_string();
        with_connection(pool, move |conn| {
            use crate::db::schema::pins::dsl::*;
            pins.filter(guild_id.eq(guild))
                .filter(source_message_id.eq(source_message))
                .select(DbPinRecord::as_select())
                .first::<DbPinRecord>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(PinRecord::try_from)
                .transpose()
        })
        .await
    }

    async fn add_pin(&self, record: &PinRecord) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        let record = record.clone();
        with_connection(pool, move |conn| {
            let new_pin = NewPinRecord {
                guild_id: record.guild_id.to_string(),
                source_channel_id: record.source_channel_id.to_string(),
                source_message_id: record.source_message_id.to_string(),
                dest_channel_id: record.dest_channel_id.to_string(),
                dest_message_id: record.dest_message_id.to_string(),
                author_id: record.author_id.to_string(),
                created_at: &record.created_at,
            };

            diesel::insert_into(pins::table)
                .values(&new_pin)
                .execute(conn)
                .map(|_| ())
                .map_err(DatabaseError::from_insert)
        })
        .await
    }

    async fn count_pins(&self, guild: u64) -> Result<i64, DatabaseError> {
        let pool = self.pool.clone();
        let guild = guild.to_string();
        with_connection(pool, move |conn| {
            use crate::db::schema::pins::dsl::*;
            pins.filter(guild_id.eq(guild))
                .count()
                .get_result(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}

pub struct PostgresIdentityStore {
    pool: Pool,
}

impl PostgresIdentityStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::IdentityStore for PostgresIdentityStore {
    async fn get_identity(&self, guild: u64) -> Result<Option<IdentityRecord>, DatabaseError> {
        let pool = self.pool.clone();
        let guild = guild.to_string();
        with_connection(pool, move |conn| {
            use crate::db::schema::identities::dsl::*;
            identities
                .filter(guild_id.eq(guild))
                .select(DbIdentityRecord::as_select())
                .first::<DbIdentityRecord>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(IdentityRecord::try_from)
                .transpose()
        })
        .await
    }

    async fn set_identity(&self, record: &IdentityRecord) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        let row = DbIdentityRecord::from(record);
        with_connection(pool, move |conn| {
            use crate::db::schema::identities::dsl::*;
            diesel::insert_into(identities)
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

    async fn delete_identity(&self, guild: u64) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        let guild = guild.to_string();
        with_connection(pool, move |conn| {
            use crate::db::schema::identities::dsl::*;
            diesel::delete(identities.filter(guild_id.eq(guild)))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}

pub struct PostgresStatsStore {
    pool: Pool,
}

impl PostgresStatsStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::StatsStore for PostgresStatsStore {
    async fn add_stat(&self, stat: &PinStat) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        let stat = stat.clone();
        with_connection(pool, move |conn| {
            let new_stat = NewPinStat {
                guild_id: stat.guild_id.to_string(),
                user_id: stat.user_id.to_string(),
                emoji: stat.emoji.as_deref(),
                created_at: &stat.created_at,
            };

            diesel::insert_into(pin_stats::table)
                .values(&new_stat)
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn count_stats_for_user(&self, guild: u64, user: u64) -> Result<i64, DatabaseError> {
        let pool = self.pool.clone();
        let guild = guild.to_string();
        let user = user.to_string();
        with_connection(pool, move |conn| {
            use crate::db::schema::pin_stats::dsl::*;
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
