//! Feed events and curation candidates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single operation read from the ordered feed.
///
/// K_i: `position` is the feed's resume unit (a block number for the live
/// ledger). Several events can share a position; `closes_position` marks the
/// last one, after which the cursor may move past it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEvent {
    /// Operation type ("comment", "vote", ...)
    #[serde(rename = "type")]
    pub op_type: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub permlink: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub body: String,

    #[serde(default)]
    pub tags: Vec<String>,

    pub timestamp: DateTime<Utc>,

    /// Empty for top-level posts
    #[serde(default)]
    pub parent_author: String,

    pub position: u64,

    #[serde(default = "default_true")]
    pub closes_position: bool,
}

fn default_true() -> bool {
    true
}

impl FeedEvent {
    pub fn is_comment(&self) -> bool {
        self.op_type == "comment"
    }

    /// Replies carry a parent author; top-level posts do not.
    pub fn is_reply(&self) -> bool {
        !self.parent_author.is_empty()
    }

    /// The position the cursor should hold once this event is processed.
    pub fn resume_position(&self) -> u64 {
        if self.closes_position {
            self.position + 1
        } else {
            self.position
        }
    }

    pub fn to_candidate(&self) -> Candidate {
        Candidate {
            author: self.author.clone(),
            permlink: self.permlink.clone(),
            title: self.title.clone(),
            body: self.body.clone(),
            tags: self.tags.clone(),
            timestamp: self.timestamp,
            position: self.position,
        }
    }
}

/// A top-level post under consideration for curation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub author: String,
    pub permlink: String,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub position: u64,
}

impl Candidate {
    pub fn post_ref(&self) -> PostRef {
        PostRef::new(&self.author, &self.permlink)
    }
}

/// `@author/permlink` reference to a post.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostRef {
    pub author: String,
    pub permlink: String,
}

impl PostRef {
    pub fn new(author: impl Into<String>, permlink: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            permlink: permlink.into(),
        }
    }
}

impl fmt::Display for PostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}/{}", self.author, self.permlink)
    }
}
