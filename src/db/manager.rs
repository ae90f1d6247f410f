use crate::config::{DatabaseConfig as ConfigDatabaseConfig, DbType as ConfigDbType};
use crate::db::{ConfigStore, DatabaseError, IdentityStore, PinStore, StatsStore, Stores};
use std::sync::Arc;

#[cfg(feature = "postgres")]
use crate::db::postgres::{
    PostgresConfigStore, PostgresIdentityStore, PostgresPinStore, PostgresStatsStore,
};
#[cfg(feature = "postgres")]
use diesel::RunQueryDsl;
#[cfg(feature = "postgres")]
use diesel::pg::PgConnection;
#[cfg(feature = "postgres")]
use diesel::r2d2::{self, ConnectionManager};

#[cfg(feature = "postgres")]
pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[cfg(feature = "sqlite")]
use crate::db::sqlite::{SqliteConfigStore, SqliteIdentityStore, SqlitePinStore, SqliteStatsStore};

#[derive(Clone)]
pub struct DatabaseManager {
    #[cfg(feature = "postgres")]
    postgres_pool: Option<Pool>,
    #[cfg(feature = "sqlite")]
    sqlite_path: Option<String>,
    config_store: Arc<dyn ConfigStore>,
    pin_store: Arc<dyn PinStore>,
    identity_store: Arc<dyn IdentityStore>,
    stats_store: Arc<dyn StatsStore>,
    db_type: DbType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

impl From<ConfigDbType> for DbType {
    fn from(value: ConfigDbType) -> Self {
        match value {
            ConfigDbType::Postgres => DbType::Postgres,
            ConfigDbType::Sqlite => DbType::Sqlite,
        }
    }
}

impl DatabaseManager {
    pub async fn new(config: &ConfigDatabaseConfig) -> Result<Self, DatabaseError> {
        let db_type = DbType::from(config.db_type());

        match db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let connection_string = config.connection_string();
                let max_connections = config.max_connections();
                let min_connections = config.min_connections();

                let manager = ConnectionManager::<PgConnection>::new(connection_string);

                let builder = r2d2::Pool::builder()
                    .max_size(max_connections.unwrap_or(10))
                    .min_idle(Some(min_connections.unwrap_or(1)));

                let pool = builder
                    .build(manager)
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?;

                Ok(Self {
                    config_store: Arc::new(PostgresConfigStore::new(pool.clone())),
                    pin_store: Arc::new(PostgresPinStore::new(pool.clone())),
                    identity_store: Arc::new(PostgresIdentityStore::new(pool.clone())),
                    stats_store: Arc::new(PostgresStatsStore::new(pool.clone())),
                    postgres_pool: Some(pool),
                    #[cfg(feature = "sqlite")]
                    sqlite_path: None,
                    db_type,
                })
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = config.sqlite_path().ok_or_else(|| {
                    DatabaseError::Connection("sqlite path missing from database config".to_string())
                })?;
                let path_arc = Arc::new(path.clone());

                Ok(Self {
                    #[cfg(feature = "postgres")]
                    postgres_pool: None,
                    config_store: Arc::new(SqliteConfigStore::new(path_arc.clone())),
                    pin_store: Arc::new(SqlitePinStore::new(path_arc.clone())),
                    identity_store: Arc::new(SqliteIdentityStore::new(path_arc.clone())),
                    stats_store: Arc::new(SqliteStatsStore::new(path_arc)),
                    sqlite_path: Some(path),
                    db_type,
                })
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Connection(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Connection(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        match self.db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let pool = self.postgres_pool.as_ref().ok_or_else(|| {
                    DatabaseError::Migration("postgres pool not initialized".to_string())
                })?;
                Self::migrate_postgres(pool).await
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = self.sqlite_path.as_ref().ok_or_else(|| {
                    DatabaseError::Migration("sqlite path not initialized".to_string())
                })?;
                Self::migrate_sqlite(path).await
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Migration(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Migration(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    #[cfg(feature = "postgres")]
    async fn migrate_postgres(pool: &Pool) -> Result<(), DatabaseError> {
        let pool = pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;

            let statements = [
                r#"
                CREATE TABLE IF NOT EXISTS guild_configs (
                    guild_id TEXT PRIMARY KEY,
                    channel_id TEXT,
                    threshold INTEGER NOT NULL DEFAULT 3,
                    nsfw BOOLEAN NOT NULL DEFAULT FALSE,
                    selfpin BOOLEAN NOT NULL DEFAULT FALSE,
                    dm BOOLEAN NOT NULL DEFAULT TRUE,
                    reply_depth INTEGER NOT NULL DEFAULT 1,
                    allowlist TEXT NOT NULL DEFAULT '[]',
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS pins (
                    id BIGSERIAL PRIMARY KEY,
                    guild_id TEXT NOT NULL,
                    source_channel_id TEXT NOT NULL,
                    source_message_id TEXT NOT NULL,
                    dest_channel_id TEXT NOT NULL,
                    dest_message_id TEXT NOT NULL,
                    author_id TEXT NOT NULL,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                    UNIQUE (guild_id, source_message_id)
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS identities (
                    guild_id TEXT PRIMARY KEY,
                    primary_id TEXT NOT NULL,
                    primary_token TEXT NOT NULL,
                    secondary_id TEXT,
                    secondary_token TEXT,
                    next_slot SMALLINT NOT NULL DEFAULT 0,
                    last_used_at TIMESTAMP WITH TIME ZONE,
                    updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS pin_stats (
                    id BIGSERIAL PRIMARY KEY,
                    guild_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    emoji TEXT,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_pins_dest_message ON pins(dest_message_id)",
                "CREATE INDEX IF NOT EXISTS idx_pin_stats_guild_user ON pin_stats(guild_id, user_id)",
            ];

            for statement in statements {
                diesel::sql_query(statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    #[cfg(feature = "sqlite")]
    async fn migrate_sqlite(path: &str) -> Result<(), DatabaseError> {
        use diesel::RunQueryDsl;
        use diesel::connection::SimpleConnection;

        let path = path.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = crate::db::sqlite::establish_connection(&path)?;
            // Persistent on the file: readers no longer block the ledger writer.
            conn.batch_execute("PRAGMA journal_mode = WAL;")
                .map_err(|e| DatabaseError::Migration(format!("failed to enable wal: {e}")))?;

            let statements = [
                r#"
                CREATE TABLE IF NOT EXISTS guild_configs (
                    guild_id TEXT PRIMARY KEY NOT NULL,
                    channel_id TEXT,
                    threshold INTEGER NOT NULL DEFAULT 3,
                    nsfw BOOLEAN NOT NULL DEFAULT 0,
                    selfpin BOOLEAN NOT NULL DEFAULT 0,
                    dm BOOLEAN NOT NULL DEFAULT 1,
                    reply_depth INTEGER NOT NULL DEFAULT 1,
                    allowlist TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS pins (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    guild_id TEXT NOT NULL,
                    source_channel_id TEXT NOT NULL,
                    source_message_id TEXT NOT NULL,
                    dest_channel_id TEXT NOT NULL,
                    dest_message_id TEXT NOT NULL,
                    author_id TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE (guild_id, source_message_id)
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS identities (
                    guild_id TEXT PRIMARY KEY NOT NULL,
                    primary_id TEXT NOT NULL,
                    primary_token TEXT NOT NULL,
                    secondary_id TEXT,
                    secondary_token TEXT,
                    next_slot INTEGER NOT NULL DEFAULT 0,
                    last_used_at TEXT,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS pin_stats (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    guild_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    emoji TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_pins_dest_message ON pins(dest_message_id)",
                "CREATE INDEX IF NOT EXISTS idx_pin_stats_guild_user ON pin_stats(guild_id, user_id)",
            ];

            for statement in statements {
                diesel::sql_query(statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    pub fn config_store(&self) -> Arc<dyn ConfigStore> {
        self.config_store.clone()
    }

    pub fn pin_store(&self) -> Arc<dyn PinStore> {
        self.pin_store.clone()
    }

    pub fn identity_store(&self) -> Arc<dyn IdentityStore> {
        self.identity_store.clone()
    }

    pub fn stats_store(&self) -> Arc<dyn StatsStore> {
        self.stats_store.clone()
    }

    pub fn stores(&self) -> Stores {
        Stores {
            configs: self.config_store(),
            pins: self.pin_store(),
            identities: self.identity_store(),
            stats: self.stats_store(),
        }
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }
}
