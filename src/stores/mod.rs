pub mod airtable;

use std::fmt::Display;
use thiserror::Error;
use async_trait::async_trait;

/// Enum used by lead stores to report errors
/// Callers only ever log these: the user sees a generic failure
#[derive(Error, Debug)]
pub enum StoreError {
    /// Credentials or identifiers are not configured
    #[error("missing store configuration: {0}")]
    MissingConfiguration(&'static str),

    /// Network connectivity issue
    #[error("connection issue: {0}")]
    Connectivity(String),

    /// The store answered with an error status, pass the code and message
    #[error("rejected by the store: {1} ({0})")]
    Rejected(u16, String),

    /// The store answered something we could not make sense of
    #[error("invalid response from the store: {0}")]
    InvalidResponse(String),
}

/// Convenience type: storage result, the store's record ID on success
pub type StoreResult = Result<String, StoreError>;

/// A lead: someone who left their email
#[derive(Debug, Clone)]
pub struct Lead {
    pub email: String,
}

/// The LeadStore trait, where leads end up
#[async_trait]
pub trait LeadStore: Display + Send + Sync {
    /// Creates a single record for the lead, returns its ID
    async fn create_lead(&self, lead: &Lead) -> StoreResult;
}
