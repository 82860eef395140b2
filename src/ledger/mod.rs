//! Ledger, feed and delegation collaborators.
//!
//! Epistemic foundation:
//! - K_i: The node speaks condenser-style JSON-RPC
//! - B_i: Every read can fail → Result<_, LedgerError>
//! - I^B: Node availability → bounded retry inside the RPC client
//!
//! Traits sit at every seam so screening and the curation loop can run against
//! in-memory doubles.

mod delegations;
mod feed;
#[cfg(test)]
pub(crate) mod memory;
mod rpc;
mod types;

pub use delegations::*;
pub use feed::*;
pub use rpc::*;
pub use types::*;

use crate::models::{FeedEvent, LedgerError};
use crate::rewards::WeightedParticipant;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read access to the curated chain.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn get_content(&self, author: &str, permlink: &str) -> Result<Content, LedgerError>;

    async fn get_accounts(&self, names: &[String]) -> Result<Vec<Account>, LedgerError>;

    async fn get_account(&self, name: &str) -> Result<Account, LedgerError> {
        self.get_accounts(&[name.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::NotFound(format!("account {name}")))
    }

    async fn get_follow_count(&self, name: &str) -> Result<FollowCount, LedgerError>;

    /// One page of followers, starting at `start` (inclusive) when given.
    async fn get_followers(
        &self,
        name: &str,
        start: Option<&str>,
        limit: u32,
    ) -> Result<Vec<FollowEntry>, LedgerError>;

    /// One page of accounts `name` follows with type `what` ("blog", "ignore").
    async fn get_following(
        &self,
        name: &str,
        start: Option<&str>,
        what: &str,
        limit: u32,
    ) -> Result<Vec<FollowEntry>, LedgerError>;

    /// One page of outgoing delegations, starting at delegatee `start` (inclusive).
    async fn get_vesting_delegations(
        &self,
        delegator: &str,
        start: Option<&str>,
        limit: u32,
    ) -> Result<Vec<VestingDelegation>, LedgerError>;

    /// Liquid tokens per million vesting shares.
    async fn get_steem_per_mvest(&self) -> Result<f64, LedgerError>;
}

/// Activity lookup on a secondary chain that shares account names.
#[async_trait]
pub trait ActivityLookup: Send + Sync {
    /// Last post or vote, or `None` if the account is unknown there.
    async fn last_activity(&self, name: &str) -> Result<Option<DateTime<Utc>>, LedgerError>;
}

/// Ordered event source that can resume from a position.
#[async_trait]
pub trait Feed: Send {
    async fn seek(&mut self, position: u64) -> Result<(), LedgerError>;

    /// Next event, or `None` when a finite feed is exhausted.
    async fn next_event(&mut self) -> Result<Option<FeedEvent>, LedgerError>;

    /// Position a fresh run starts from when nothing is checkpointed.
    async fn head_position(&mut self) -> Result<u64, LedgerError>;
}

/// Stake-weighted delegators of the operator account.
#[async_trait]
pub trait DelegatorSource: Send + Sync {
    async fn incoming_delegations(
        &self,
        account: &str,
    ) -> Result<Vec<WeightedParticipant>, LedgerError>;
}

/// All followers of `name`, paging until a short page.
pub async fn all_followers<L: Ledger + ?Sized>(
    ledger: &L,
    name: &str,
    page_size: u32,
) -> Result<Vec<String>, LedgerError> {
    let page_size = page_size.max(2);
    let mut followers: Vec<String> = Vec::new();
    let mut start: Option<String> = None;

    loop {
        let page = ledger
            .get_followers(name, start.as_deref(), page_size)
            .await?;
        let fetched = page.len();
        // Pages after the first repeat their start entry
        let skip = usize::from(start.is_some());
        for entry in page.into_iter().skip(skip) {
            followers.push(entry.follower);
        }

        if fetched < page_size as usize {
            break;
        }
        match followers.last() {
            Some(last) if start.as_deref() != Some(last.as_str()) => start = Some(last.clone()),
            _ => break,
        }
    }

    Ok(followers)
}

/// All outgoing delegations of `delegator`, paging until a short page.
pub async fn all_vesting_delegations<L: Ledger + ?Sized>(
    ledger: &L,
    delegator: &str,
    page_size: u32,
) -> Result<Vec<VestingDelegation>, LedgerError> {
    let page_size = page_size.max(2);
    let mut delegations: Vec<VestingDelegation> = Vec::new();
    let mut start: Option<String> = None;

    loop {
        let page = ledger
            .get_vesting_delegations(delegator, start.as_deref(), page_size)
            .await?;
        let fetched = page.len();
        let skip = usize::from(start.is_some());
        delegations.extend(page.into_iter().skip(skip));

        if fetched < page_size as usize {
            break;
        }
        match delegations.last() {
            Some(last) if start.as_deref() != Some(last.delegatee.as_str()) => {
                start = Some(last.delegatee.clone())
            }
            _ => break,
        }
    }

    Ok(delegations)
}

/// Whether `registry` has `account` on its "ignore" list.
pub async fn is_ignored_by<L: Ledger + ?Sized>(
    ledger: &L,
    registry: &str,
    account: &str,
) -> Result<bool, LedgerError> {
    let page = ledger
        .get_following(registry, Some(account), "ignore", 1)
        .await?;
    Ok(page
        .first()
        .is_some_and(|entry| entry.following == account))
}
