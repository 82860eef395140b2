//! curator - Automated content curation over an append-only post feed.
//!
//! ## Architecture
//!
//! A single sequential loop drives every candidate through:
//! - **Screening**: ordered, short-circuiting eligibility checks with reason codes
//! - **Evaluation**: LLM review through a model roster with rate-limit failover
//! - **Rewards**: weighted delegator sampling and fixed-point beneficiary tables
//! - **Publishing**: one curation post plus one reply per curated article
//!
//! ## Design
//!
//! - K_i (Knowledge): Beneficiary totals and sampler permutations are exact integers
//! - B_i (Beliefs): Ledger reads and AI calls are fallible and classified
//! - I^R (Resolvable): Every threshold lives in the explicit [`Config`]
//! - I^B (Bounded): Network uncertainty is absorbed by bounded retry with jitter

pub mod checkpoint;
pub mod client;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod rewards;
pub mod screening;

// Re-exports for convenience
pub use checkpoint::StreamCursor;
pub use client::{AIResponse, Classification, Evaluator, ModelFailoverClient, ModelRoster};
pub use models::{Candidate, Config, CuratorError, FeedEvent, Result, Vests};
pub use pipeline::{CurationLoop, RunStats};
pub use rewards::{BeneficiaryAllocator, BeneficiaryEntry, BeneficiaryRole, WeightedSampler};
pub use screening::{RejectReason, ScreeningPipeline, ScreeningVerdict};
