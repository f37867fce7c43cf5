// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error type shared by every auto-unseal operation.
//!
//! Config and key operations always propagate their failures with the name of
//! the operation that failed. Health-check failures never show up here: the
//! monitor turns them into an unhealthy backend plus a log line and a gauge.

use crate::storage::StorageError;

/// Error returned by the auto-unseal manager and its stores.
#[derive(Debug, thiserror::Error)]
pub enum SealError {
    /// Seal configuration could not be read, written, migrated or did not
    /// match the configured seal type.
    #[error("{0}")]
    Config(String),

    /// Durable read/write of a key entry failed.
    #[error("{context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: StorageError,
    },

    /// A seal backend could not wrap or unwrap a value, or a wrapped value
    /// could not be decoded.
    #[error("{0}")]
    Crypto(String),

    /// Missing or empty input.
    #[error("{0}")]
    Validation(String),

    /// Submitted recovery key does not match the stored one.
    #[error("{0}")]
    Mismatch(String),

    /// An expected persisted artifact is absent.
    #[error("{0}")]
    NotFound(String),

    /// The manager was used before `set_core` bound it to a server.
    #[error("seal does not have a core set")]
    NotBound,

    /// A background task was requested outside a tokio runtime.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}

impl SealError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Wrap a storage failure with the operation that hit it.
    pub fn storage(context: impl Into<String>, source: StorageError) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }

    /// Re-label an error with an outer operation, keeping its kind.
    pub fn context(self, context: &str) -> Self {
        match self {
            Self::Config(msg) => Self::Config(format!("{context}: {msg}")),
            Self::Storage {
                context: inner,
                source,
            } => Self::Storage {
                context: format!("{context}: {inner}"),
                source,
            },
            Self::Crypto(msg) => Self::Crypto(format!("{context}: {msg}")),
            Self::Validation(msg) => Self::Validation(format!("{context}: {msg}")),
            Self::Mismatch(msg) => Self::Mismatch(format!("{context}: {msg}")),
            Self::NotFound(msg) => Self::NotFound(format!("{context}: {msg}")),
            Self::NotBound => Self::NotBound,
            Self::NoRuntime(msg) => Self::NoRuntime(format!("{context}: {msg}")),
        }
    }
}

/// Result type for auto-unseal operations.
pub type SealResult<T> = Result<T, SealError>;
