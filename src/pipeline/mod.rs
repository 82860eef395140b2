//! Pipeline module - the curation loop and its publishing collaborators.

mod curation;
mod publish;
mod vote;

pub use curation::*;
pub use publish::*;
pub use vote::*;
