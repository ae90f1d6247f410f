use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database connection error: {0}")]
    Connection(String),
    #[error("database query error: {0}")]
    Query(String),
    #[error("database migration error: {0}")]
    Migration(String),
    #[error("stored value could not be decoded: {0}")]
    Serialization(String),
    #[error("record already exists: {0}")]
    Conflict(String),
}

impl DatabaseError {
    /// Unique-constraint violations become `Conflict`, everything else is a query error.
    pub fn from_insert(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match err {
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                DatabaseError::Conflict(info.message().to_string())
            }
            other => DatabaseError::Query(other.to_string()),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DatabaseError::Conflict(_))
    }
}

pub(crate) fn parse_snowflake(column: &str, value: &str) -> Result<u64, DatabaseError> {
    value
        .parse::<u64>()
        .map_err(|e| DatabaseError::Serialization(format!("{column}={value}: {e}")))
}
