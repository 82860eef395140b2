//! LLM client layer.
//!
//! - **Roster**: ordered models with rate-limit failover
//! - **Retry**: backoff policy and request state machine
//! - **Provider**: per-endpoint request dialect
//! - **Prompt**: system/curation prompt assembly
//! - **LLM client**: `ModelFailoverClient`, the `Evaluator` used by the loop

mod llm_client;
mod prompt;
mod provider;
mod retry;
mod roster;

pub use llm_client::*;
pub use prompt::*;
pub use provider::*;
pub use retry::*;
pub use roster::*;
