use std::{error::Error, fmt::Debug};

use uuid::Uuid;

#[derive(thiserror::Error)]
pub enum LedgerError {
    #[error("amount must be positive")]
    InvalidAmount,

    #[error("description is required")]
    MissingDescription,

    #[error("invalid transaction ID")]
    InvalidId,

    #[error("insufficient coins: have {have}, need {need}")]
    InsufficientFunds { have: i32, need: i32 },

    #[error("account {0} not found")]
    AccountNotFound(Uuid),

    #[error("transaction {0} not found")]
    TransactionNotFound(i32),

    /// A concurrent writer changed the account between read and write.
    #[error("concurrent update on account")]
    Conflict,

    #[error("failed to commit ledger mutation: {0}")]
    CommitFailed(String),

    /// The commit was sent but not acknowledged in time. It may have been
    /// applied; callers must check before retrying.
    #[error("commit outcome unknown: {0}")]
    CommitUnconfirmed(String),

    #[error("Database query")]
    DBError(#[source] sqlx::Error),

    #[error("stored record is corrupt: {0}")]
    CorruptRecord(String),
}

impl LedgerError {
    /// Caller errors that are detected before any state is touched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidAmount | LedgerError::MissingDescription | LedgerError::InvalidId
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LedgerError::AccountNotFound(_) | LedgerError::TransactionNotFound(_)
        )
    }
}

impl Debug for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_with_source(self, f)
    }
}

#[derive(thiserror::Error)]
pub enum ServiceError {
    #[error("ENV '{0}' Not Found")]
    EnvError(String, #[source] std::env::VarError),

    #[error("ENV '{name}' has invalid value '{value}'")]
    InvalidEnv { name: String, value: String },

    #[error("Error decode public key")]
    KeyError(#[source] jsonwebtoken::errors::Error),

    #[error("Missing bearer token")]
    MissingToken,

    #[error("Token rejected")]
    TokenError(#[source] jsonwebtoken::errors::Error),

    #[error("Token subject '{0}' is not an account id")]
    InvalidSubject(String),

    #[error("Database connection")]
    DBConnectionError(#[source] sqlx::Error),
}

impl Debug for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_with_source(self, f)
    }
}

fn write_with_source(err: &dyn Error, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", err)?;
    if let Some(source) = err.source() {
        write!(f, " (Caused by: {})", source)?;
    }
    Ok(())
}
