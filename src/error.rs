//! Error kinds surfaced by the icon library
//!
//! Every failure maps to one `IconError` variant. Callers that need to branch
//! on the failure (the CLI, tests, embedding hosts) should match on
//! [`IconError::kind`] instead of parsing messages.

use std::fmt;

use serde::Serialize;
use strum::{Display, EnumString};
use thiserror::Error;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, IconError>;

/// Stable, message-free error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedIdentifier,
    UnknownPrefix,
    IconNotFound,
    BrokenAlias,
    IndexNotBuilt,
    CorpusUnavailable,
    IndexWriteError,
    UnsafeIconContent,
    NetworkError,
    CacheCorrupted,
    InvalidStyle,
}

/// Unified library error type.
#[derive(Error, Debug)]
pub enum IconError {
    /// Identifier is not of the form `prefix:name`
    #[error("Malformed icon identifier '{0}' (expected 'prefix:name')")]
    MalformedIdentifier(String),

    /// No collection source knows this prefix
    #[error("Unknown icon prefix '{0}'")]
    UnknownPrefix(String),

    /// Prefix exists but the icon does not
    #[error("Icon not found: {0}")]
    IconNotFound(String),

    /// Alias points at a missing icon or at another alias
    #[error("Broken alias {alias} -> {target}")]
    BrokenAlias { alias: String, target: String },

    /// No index artifact and no fallback scan configured
    #[error("Search index not built. Run 'icx build-index' first.")]
    IndexNotBuilt,

    /// Corpus directory missing or unreadable
    #[error("Icon corpus unavailable: {0}")]
    CorpusUnavailable(String),

    /// Index artifact could not be persisted
    #[error("Failed to write index: {0}")]
    IndexWriteError(String),

    /// Icon body contains script, event handlers or external references
    #[error("Icon {id} contains unsafe content: {reason}")]
    UnsafeIconContent { id: String, reason: String },

    /// Remote fetch failed
    #[error("{}", network_message(.resource, .timeout, .message))]
    NetworkError {
        resource: String,
        timeout: bool,
        message: String,
    },

    /// Persisted cache or index is unreadable
    #[error("Cache corrupted: {0}")]
    CacheCorrupted(String),

    /// Size or color rejected before assembly
    #[error("Invalid style: {0}")]
    InvalidStyle(String),
}

fn network_message(resource: &str, timeout: &bool, message: &str) -> String {
    if *timeout {
        format!("Network timeout fetching {}: {}", resource, message)
    } else {
        format!("Network error fetching {}: {}", resource, message)
    }
}

impl IconError {
    /// The stable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedIdentifier(_) => ErrorKind::MalformedIdentifier,
            Self::UnknownPrefix(_) => ErrorKind::UnknownPrefix,
            Self::IconNotFound(_) => ErrorKind::IconNotFound,
            Self::BrokenAlias { .. } => ErrorKind::BrokenAlias,
            Self::IndexNotBuilt => ErrorKind::IndexNotBuilt,
            Self::CorpusUnavailable(_) => ErrorKind::CorpusUnavailable,
            Self::IndexWriteError(_) => ErrorKind::IndexWriteError,
            Self::UnsafeIconContent { .. } => ErrorKind::UnsafeIconContent,
            Self::NetworkError { .. } => ErrorKind::NetworkError,
            Self::CacheCorrupted(_) => ErrorKind::CacheCorrupted,
            Self::InvalidStyle(_) => ErrorKind::InvalidStyle,
        }
    }

    /// True for network failures caused by the caller-supplied timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::NetworkError { timeout: true, .. })
    }

    pub fn corpus(message: impl fmt::Display) -> Self {
        Self::CorpusUnavailable(message.to_string())
    }

    pub fn index_write(message: impl fmt::Display) -> Self {
        Self::IndexWriteError(message.to_string())
    }

    pub fn corrupted(message: impl fmt::Display) -> Self {
        Self::CacheCorrupted(message.to_string())
    }

    pub fn unsafe_content(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsafeIconContent {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn network(resource: impl Into<String>, timeout: bool, message: impl fmt::Display) -> Self {
        Self::NetworkError {
            resource: resource.into(),
            timeout,
            message: message.to_string(),
        }
    }
}
