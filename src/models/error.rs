//! Error types for curator.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Expected failures (bad config, bad input, ledger says no)
//! - I^B materialized: Infrastructure failures (network, feed, publisher)
//! - K_i violated: Internal invariant violations (allocation, sampling)
//!
//! Screening rejections and AI classification outcomes are values, not
//! errors: see `ScreeningVerdict` and `AIResponse`.

use thiserror::Error;

/// Top-level error type for curator.
#[derive(Debug, Error)]
pub enum CuratorError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED — Belief proven wrong (expected failures)
    // ═══════════════════════════════════════════════════════════════════
    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED — Bounded ignorance became known-bad
    // ═══════════════════════════════════════════════════════════════════
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Feed unavailable after {attempts} attempts: {last_error}")]
    FeedExhausted { attempts: u32, last_error: String },

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED — Invariant broken (defect, must never be corrected)
    // ═══════════════════════════════════════════════════════════════════
    #[error("Allocation invariant violated: {0}")]
    Allocation(#[from] AllocationError),

    #[error("Sampling error: {0}")]
    Sampling(#[from] SamplingError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Ledger (JSON-RPC node or auxiliary API) errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Network error talking to {endpoint}: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("HTTP {status} from {endpoint}")]
    Http { endpoint: String, status: u16 },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Unexpected response shape: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl LedgerError {
    /// Whether a bounded retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Self::Rpc { .. } | Self::Decode(_) | Self::NotFound(_) => false,
        }
    }
}

/// Publisher errors.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Publisher rejected {permlink}: {message}")]
    Rejected { permlink: String, message: String },

    #[error("Vote on {target} rejected: {message}")]
    VoteRejected { target: String, message: String },

    #[error("Failed to write publication {path}: {source}")]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize publication: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Publishing {permlink} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        permlink: String,
        attempts: u32,
        last_error: String,
    },
}

/// Weighted sampler misuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SamplingError {
    #[error("Participant '{0}' has a non-positive weight")]
    NonPositiveWeight(String),

    #[error("Cannot draw from an empty participant pool")]
    EmptyPool,
}

/// Beneficiary allocation defects. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("Beneficiary weights over-committed: {required} required, {total} available")]
    Overcommitted { required: u64, total: u32 },

    #[error("Too many beneficiaries: {count} exceeds the limit of {limit}")]
    TooManyBeneficiaries { count: usize, limit: usize },

    #[error("Role {role} is singular but was given to both '{first}' and '{second}'")]
    ConflictingSingular {
        role: &'static str,
        first: String,
        second: String,
    },
}

impl CuratorError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Ledger(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Whether this error must abort the run rather than skip a candidate.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::FeedExhausted { .. }
                | Self::Publish(_)
                | Self::Allocation(_)
                | Self::Sampling(_)
                | Self::Internal(_)
        )
    }
}

/// Result type alias for curator.
pub type Result<T> = std::result::Result<T, CuratorError>;
