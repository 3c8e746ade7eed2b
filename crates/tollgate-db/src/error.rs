//! Database-specific error types and conversions.

use tollgate_core::error::TollgateError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    /// A stored row could not be mapped back onto a domain type.
    #[error("Corrupt row in {table}: {message}")]
    Corrupt { table: &'static str, message: String },

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Record already exists: {entity}")]
    AlreadyExists { entity: String },
}

impl DbError {
    pub(crate) fn corrupt(table: &'static str, message: impl ToString) -> Self {
        DbError::Corrupt {
            table,
            message: message.to_string(),
        }
    }

    /// Map a failed statement result. Unique-index violations surface as
    /// [`DbError::AlreadyExists`].
    pub(crate) fn from_statement(entity: &str, err: surrealdb::Error) -> Self {
        let message = err.to_string();
        if message.contains("already contains") || message.contains("already exists") {
            DbError::AlreadyExists {
                entity: entity.into(),
            }
        } else {
            DbError::Surreal(err)
        }
    }
}

impl From<DbError> for TollgateError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => TollgateError::NotFound { entity, id },
            DbError::AlreadyExists { entity } => TollgateError::AlreadyExists { entity },
            other => TollgateError::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_keeps_identity() {
        let err: TollgateError = DbError::NotFound {
            entity: "session".into(),
            id: "abc".into(),
        }
        .into();
        assert!(err.is_not_found());
    }

    #[test]
    fn corrupt_rows_become_database_errors() {
        let err: TollgateError = DbError::corrupt("tenant", "bad uuid").into();
        assert!(matches!(err, TollgateError::Database(msg) if msg.contains("tenant")));
    }
}
