//! Ledger records as returned by condenser-style JSON-RPC nodes.

use crate::models::Vests;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Latest revision of a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub author: String,
    pub permlink: String,
    #[serde(deserialize_with = "ledger_time")]
    pub created: DateTime<Utc>,
    #[serde(default, deserialize_with = "ledger_time_opt")]
    pub last_update: Option<DateTime<Utc>>,
}

/// Account record with the fields screening needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    #[serde(default, deserialize_with = "int_or_string")]
    pub reputation: i64,
    #[serde(deserialize_with = "ledger_time")]
    pub created: DateTime<Utc>,
    #[serde(default, deserialize_with = "ledger_time_opt")]
    pub last_post: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "ledger_time_opt")]
    pub last_vote_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub vesting_shares: Vests,
    #[serde(default)]
    pub delegated_vesting_shares: Vests,
    #[serde(default)]
    pub received_vesting_shares: Vests,
}

impl Account {
    /// Most recent post or vote.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        match (self.last_post, self.last_vote_time) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowCount {
    pub account: String,
    pub follower_count: u32,
    pub following_count: u32,
}

/// One row of a follower/following page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowEntry {
    pub follower: String,
    pub following: String,
    #[serde(default)]
    pub what: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VestingDelegation {
    pub delegator: String,
    pub delegatee: String,
    pub vesting_shares: Vests,
}

const LEDGER_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse the node's zone-less UTC timestamps ("2024-05-01T12:00:00"),
/// also accepting RFC 3339.
pub fn parse_ledger_time(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, LEDGER_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

fn ledger_time<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let s = String::deserialize(d)?;
    parse_ledger_time(&s).ok_or_else(|| serde::de::Error::custom(format!("bad timestamp '{s}'")))
}

/// Unset times come back as the epoch ("1970-01-01T00:00:00").
fn ledger_time_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    let s: Option<String> = Option::deserialize(d)?;
    Ok(s.as_deref()
        .and_then(parse_ledger_time)
        .filter(|t| t.timestamp() > 0))
}

fn int_or_string<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Str(String),
    }

    match Raw::deserialize(d)? {
        Raw::Int(v) => Ok(v),
        Raw::Float(v) => Ok(v as i64),
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
