// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query-layer error taxonomy.
//!
//! | Variant           | Raised when                                         | Batch effect     |
//! |-------------------|-----------------------------------------------------|------------------|
//! | `InvalidArgument` | malformed region, bad precision, negative cursor    | whole call fails |
//! | `NotFound`        | an id has no stored record                          | item omitted     |
//! | `Unavailable`     | record store unreachable or returned corrupt data   | whole call fails |
//! | `Cancelled`       | caller cancelled mid-operation                      | whole call fails |

use thiserror::Error;

use crate::storage::traits::StorageError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Record store unavailable: {0}")]
    Unavailable(String),
    #[error("Operation cancelled")]
    Cancelled,
}

impl QueryError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Stable label for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::Unavailable(_) => "unavailable",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<StorageError> for QueryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Cancelled => Self::Cancelled,
            StorageError::NotFound => Self::NotFound("record store reported missing item".into()),
            other => Self::Unavailable(other.to_string()),
        }
    }
}
