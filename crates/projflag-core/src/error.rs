//! Error taxonomy for the active-flag protocol.
//!
//! Every failure is returned as a value; nothing here aborts a session.

/// Result alias used across the core.
pub type FlagResult<T> = Result<T, FlagError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlagError {
    /// The project list could not be fetched. Fatal to the current reconciliation,
    /// never retried here.
    #[error("Directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// The stored value could not be decoded. Recovered locally by substituting an empty map.
    #[error("Malformed stored map: {0}")]
    MalformedStoredMap(String),

    /// A write to the flag store was not acknowledged. The in-memory map must not advance.
    #[error("Persist failed: {0}")]
    PersistFailed(String),

    /// The flag store could not be read.
    #[error("Flag store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FlagError {
    /// True for failures that leave the stored value unchanged by this core.
    pub fn is_persist_failure(&self) -> bool {
        matches!(self, FlagError::PersistFailed(_))
    }
}

impl From<config::ConfigError> for FlagError {
    fn from(e: config::ConfigError) -> Self {
        FlagError::Config(e.to_string())
    }
}
