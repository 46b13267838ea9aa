//! Error taxonomy for tree loads.
//!
//! Only cancellation ever escapes a load, as [`LoadCancelled`]. Provider failures
//! are absorbed by the loader and surface as an inline error placeholder (or just a
//! log line after partial success), reported to callers through [`LoadOutcome`].
//!
//! [`categorize_error`] classifies provider failure text for log output. It does
//! not drive retries; retry and backoff belong to the provider itself.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("operation cancelled")]
    Cancelled,
    #[error("{0}")]
    Failed(#[from] anyhow::Error),
}

impl ProviderError {
    pub fn failed(message: impl std::fmt::Display) -> Self {
        ProviderError::Failed(anyhow::anyhow!("{}", message))
    }
}

/// The deliberate re-raise of a cancelled load. The node is left retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("load cancelled")]
pub struct LoadCancelled;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// `begin_load` refused: already loading or loaded
    Skipped,
    Loaded { added: usize },
    /// Provider failed after some children were added; they were kept
    LoadedWithErrors { added: usize, message: String },
    /// Provider failed before any child was added; an error placeholder replaced the children
    Failed { message: String },
}

impl LoadOutcome {
    pub fn added(&self) -> usize {
        match self {
            LoadOutcome::Loaded { added } | LoadOutcome::LoadedWithErrors { added, .. } => *added,
            LoadOutcome::Skipped | LoadOutcome::Failed { .. } => 0,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            LoadOutcome::LoadedWithErrors { .. } | LoadOutcome::Failed { .. }
        )
    }
}

/// Coarse classification of provider failures for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Throttled,
    Timeout,
    Network,
    Permission,
    NotFound,
    Other,
}

impl ErrorCategory {
    pub fn short_label(&self) -> &'static str {
        match self {
            ErrorCategory::Throttled => "throttled",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Network => "network",
            ErrorCategory::Permission => "permission",
            ErrorCategory::NotFound => "not-found",
            ErrorCategory::Other => "error",
        }
    }
}

pub fn categorize_error(error: &anyhow::Error) -> ErrorCategory {
    categorize_error_string(&format!("{:#}", error))
}

pub fn categorize_error_string(error_str: &str) -> ErrorCategory {
    let lowered = error_str.to_lowercase();
    if lowered.contains("throttl")
        || lowered.contains("too many requests")
        || lowered.contains("429")
    {
        ErrorCategory::Throttled
    } else if lowered.contains("timed out") || lowered.contains("timeout") {
        ErrorCategory::Timeout
    } else if lowered.contains("connection")
        || lowered.contains("dns")
        || lowered.contains("network")
    {
        ErrorCategory::Network
    } else if lowered.contains("authorization")
        || lowered.contains("forbidden")
        || lowered.contains("access denied")
        || lowered.contains("403")
    {
        ErrorCategory::Permission
    } else if lowered.contains("not found") || lowered.contains("404") {
        ErrorCategory::NotFound
    } else {
        ErrorCategory::Other
    }
}
