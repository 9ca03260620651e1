// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Papyrus.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for all Papyrus operations.
#[derive(Debug, Error)]
pub enum PapyrusError {
    // -- Input errors --
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid page reorder: {0}")]
    InvalidReorder(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    // -- Document errors --
    #[error("corrupt document: {0}")]
    CorruptDocument(String),

    #[error("PDF operation failed: {0}")]
    Pdf(String),

    #[error("image processing failed: {0}")]
    Image(String),

    #[error("extraction failed: {0}")]
    ExtractionFailure(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Whether the job scheduler may retry a failed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Engine hiccup, I/O or database trouble. Re-running the page may succeed.
    Retriable,
    /// The input itself is wrong. Re-running produces the same failure.
    Terminal,
}

impl PapyrusError {
    /// Classify this error for the external job scheduler.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidInput(_)
            | Self::InvalidReorder(_)
            | Self::UnsupportedFormat(_)
            | Self::PageOutOfRange { .. }
            | Self::CorruptDocument(_) => ErrorClass::Terminal,

            Self::Pdf(_)
            | Self::Image(_)
            | Self::ExtractionFailure(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Serialization(_) => ErrorClass::Retriable,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PapyrusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_is_terminal() {
        let err = PapyrusError::UnsupportedFormat("text/plain".into());
        assert_eq!(err.class(), ErrorClass::Terminal);
    }

    #[test]
    fn extraction_failure_is_retriable() {
        let err = PapyrusError::ExtractionFailure("tesseract exited with 1".into());
        assert_eq!(err.class(), ErrorClass::Retriable);
    }

    #[test]
    fn page_out_of_range_message() {
        let err = PapyrusError::PageOutOfRange {
            page: 4,
            page_count: 3,
        };
        assert_eq!(
            err.to_string(),
            "page 4 is out of range (document has 3 pages)"
        );
    }
}
