//! Candidate screening.
//!
//! - **Verdict**: `ScreeningVerdict` and `RejectReason` codes
//! - **Content**: formatting removal, tag and length rules
//! - **Language**: `LanguageDetector` seam and the `whatlang` detector
//! - **Author**: blacklists, reputation, activity, follower metrics
//! - **Wallet**: delegation ceilings and undelegated-stake floor
//! - **Pipeline**: `ScreeningPipeline`, the ordered stage chain

mod author;
mod content;
mod language;
mod pipeline;
mod verdict;
mod wallet;

pub use author::{
    decay_adjusted_per_month, followers_per_month, median, rep_log10, AuthorScreen,
};
pub use content::{has_patch_marker, word_count, ContentRules, FormattingRemover};
pub use language::{language_mismatch, LanguageDetector, WhatlangDetector};
pub use pipeline::ScreeningPipeline;
pub use verdict::{RejectReason, ScreeningVerdict};
pub use wallet::{WalletScreen, WalletSummary};
