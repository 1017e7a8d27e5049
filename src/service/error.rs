use thiserror::Error;

use crate::store::{Currency, LedgerError};
use crate::user_auth::{PasswordError, TokenError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("{0}")]
    Forbidden(String),

    #[error("account [{account_id}] currency mismatched. expected: {expected}, actual: {actual}")]
    CurrencyMismatch {
        account_id: i64,
        expected: Currency,
        actual: Currency,
    },

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Password(PasswordError),
}

impl From<PasswordError> for ServiceError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Mismatch => Self::InvalidCredentials,
            other => Self::Password(other),
        }
    }
}
