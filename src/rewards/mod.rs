//! Reward distribution.
//!
//! - **Sampler**: stake-weighted draw of delegators without replacement
//! - **Beneficiary**: role-tagged accounts → exact basis-point table

mod beneficiary;
mod sampler;

pub use beneficiary::*;
pub use sampler::*;
