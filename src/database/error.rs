use thiserror::Error;

/// Database error kinds the service distinguishes between.
#[derive(Debug, Clone)]
pub enum DatabaseErrorKind {
    /// Connection or pool acquisition failure; usually transient.
    Connection { message: String },
    /// A unique constraint was violated (duplicate transaction_id and the like).
    UniqueViolation { constraint: Option<String> },
    /// A lookup against a known id returned no rows.
    NotFound { entity: String, id: String },
    /// Anything else sqlx reported.
    Unknown { message: String },
}

#[derive(Debug, Clone, Error)]
#[error("{}", self.message())]
pub struct DatabaseError {
    kind: DatabaseErrorKind,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> &DatabaseErrorKind {
        &self.kind
    }

    pub fn from_sqlx(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseErrorKind::Connection {
                    message: err.to_string(),
                }
            }
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DatabaseErrorKind::UniqueViolation {
                    constraint: db_err.constraint().map(|c| c.to_string()),
                }
            }
            _ => DatabaseErrorKind::Unknown {
                message: err.to_string(),
            },
        };
        Self { kind }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::Connection { .. })
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::UniqueViolation { .. })
    }

    fn message(&self) -> String {
        match &self.kind {
            DatabaseErrorKind::Connection { message } => {
                format!("database connection error: {}", message)
            }
            DatabaseErrorKind::UniqueViolation { constraint } => match constraint {
                Some(c) => format!("unique constraint violated: {}", c),
                None => "unique constraint violated".to_string(),
            },
            DatabaseErrorKind::NotFound { entity, id } => {
                format!("{} '{}' not found", entity, id)
            }
            DatabaseErrorKind::Unknown { message } => message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_retryable() {
        let err = DatabaseError::new(DatabaseErrorKind::Connection {
            message: "pool timed out".to_string(),
        });
        assert!(err.is_retryable());
        assert!(err.to_string().contains("pool timed out"));
    }

    #[test]
    fn unique_violation_is_flagged() {
        let err = DatabaseError::new(DatabaseErrorKind::UniqueViolation {
            constraint: Some("payments_transaction_id_key".to_string()),
        });
        assert!(err.is_unique_violation());
        assert!(!err.is_retryable());
    }
}
