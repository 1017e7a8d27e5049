//! Ledger storage errors
//!
//! Every backend maps its native failures into [`LedgerError`] so callers can
//! branch on the kind (missing row, integrity failure, unreachable storage)
//! without knowing which backend produced it.

use thiserror::Error;

/// Integrity constraint categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    ForeignKey,
    Unique,
    Check,
    NotNull,
    Other,
}

impl ConstraintKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::ForeignKey => "foreign_key_violation",
            Self::Unique => "unique_violation",
            Self::Check => "check_violation",
            Self::NotNull => "not_null_violation",
            Self::Other => "integrity_constraint_violation",
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },

    #[error("{}: {message} (constraint {constraint})", .kind.name())]
    ConstraintViolation {
        kind: ConstraintKind,
        constraint: String,
        message: String,
    },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("rollback failed ({rollback}) after error: {original}")]
    RollbackFailed {
        original: Box<LedgerError>,
        rollback: Box<LedgerError>,
    },

    #[error("transfer amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("cannot transfer from account {0} to itself")]
    SameAccount(i64),

    #[error("storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn constraint(
        kind: ConstraintKind,
        constraint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ConstraintViolation {
            kind,
            constraint: constraint.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Kind of the violated constraint, if this is an integrity failure
    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            Self::ConstraintViolation { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound {
                entity: "row",
                key: "query".to_string(),
            },
            sqlx::Error::Database(db_err) => {
                let kind = match db_err.kind() {
                    sqlx::error::ErrorKind::ForeignKeyViolation => Some(ConstraintKind::ForeignKey),
                    sqlx::error::ErrorKind::UniqueViolation => Some(ConstraintKind::Unique),
                    sqlx::error::ErrorKind::CheckViolation => Some(ConstraintKind::Check),
                    sqlx::error::ErrorKind::NotNullViolation => Some(ConstraintKind::NotNull),
                    _ => None,
                };
                match kind {
                    Some(kind) => Self::ConstraintViolation {
                        kind,
                        constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                        message: db_err.message().to_string(),
                    },
                    None => Self::Storage(db_err.to_string()),
                }
            }
            sqlx::Error::Io(e) => Self::StorageUnavailable(e.to_string()),
            sqlx::Error::Tls(e) => Self::StorageUnavailable(e.to_string()),
            sqlx::Error::PoolTimedOut => {
                Self::StorageUnavailable("connection pool timed out".to_string())
            }
            sqlx::Error::PoolClosed => {
                Self::StorageUnavailable("connection pool closed".to_string())
            }
            sqlx::Error::WorkerCrashed => {
                Self::StorageUnavailable("database worker crashed".to_string())
            }
            other => Self::Storage(other.to_string()),
        }
    }
}
