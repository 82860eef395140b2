//! In-memory ledger doubles for tests.

use super::types::{Account, Content, FollowCount, FollowEntry, VestingDelegation};
use super::{ActivityLookup, DelegatorSource, Ledger};
use crate::models::{LedgerError, Vests};
use crate::rewards::WeightedParticipant;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Account with neutral defaults: 1000 VESTS, reputation ~60, active today.
pub fn account(name: &str) -> Account {
    let now = Utc::now();
    Account {
        name: name.to_string(),
        reputation: 500_000_000_000_000,
        created: now - Duration::days(3 * 365),
        last_post: Some(now - Duration::hours(2)),
        last_vote_time: Some(now - Duration::hours(1)),
        vesting_shares: Vests::from_whole(1000),
        delegated_vesting_shares: Vests::ZERO,
        received_vesting_shares: Vests::ZERO,
    }
}

#[derive(Default)]
pub struct InMemoryLedger {
    accounts: HashMap<String, Account>,
    contents: HashMap<(String, String), Content>,
    followers: HashMap<String, Vec<String>>,
    ignores: HashMap<String, BTreeSet<String>>,
    delegations: HashMap<String, Vec<VestingDelegation>>,
    steem_per_mvest: f64,
    failing: HashSet<&'static str>,
}

impl InMemoryLedger {
    pub fn add_account(&mut self, account: Account) {
        self.accounts.insert(account.name.clone(), account);
    }

    pub fn account_mut(&mut self, name: &str) -> &mut Account {
        self.accounts
            .entry(name.to_string())
            .or_insert_with(|| account(name))
    }

    pub fn set_content(
        &mut self,
        author: &str,
        permlink: &str,
        created: DateTime<Utc>,
        updated: Option<DateTime<Utc>>,
    ) {
        self.contents.insert(
            (author.to_string(), permlink.to_string()),
            Content {
                author: author.to_string(),
                permlink: permlink.to_string(),
                created,
                last_update: updated,
            },
        );
    }

    pub fn set_followers(&mut self, name: &str, followers: &[String]) {
        self.followers.insert(name.to_string(), followers.to_vec());
    }

    pub fn add_ignore(&mut self, registry: &str, account: &str) {
        self.ignores
            .entry(registry.to_string())
            .or_default()
            .insert(account.to_string());
    }

    pub fn add_delegation(&mut self, delegator: &str, delegatee: &str, vests: Vests) {
        self.delegations
            .entry(delegator.to_string())
            .or_default()
            .push(VestingDelegation {
                delegator: delegator.to_string(),
                delegatee: delegatee.to_string(),
                vesting_shares: vests,
            });
    }

    pub fn set_steem_per_mvest(&mut self, rate: f64) {
        self.steem_per_mvest = rate;
    }

    /// Make every call to `method` fail with a transient error.
    pub fn fail(&mut self, method: &'static str) {
        self.failing.insert(method);
    }

    fn check(&self, method: &'static str) -> Result<(), LedgerError> {
        if self.failing.contains(method) {
            return Err(LedgerError::Timeout {
                endpoint: format!("memory:{method}"),
            });
        }
        Ok(())
    }
}

/// Inclusive start, then up to `limit` entries.
fn page_from<T: Clone>(items: &[T], start_at: Option<usize>, limit: u32) -> Vec<T> {
    items
        .iter()
        .skip(start_at.unwrap_or(0))
        .take(limit as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn get_content(&self, author: &str, permlink: &str) -> Result<Content, LedgerError> {
        self.check("get_content")?;
        self.contents
            .get(&(author.to_string(), permlink.to_string()))
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("@{author}/{permlink}")))
    }

    async fn get_accounts(&self, names: &[String]) -> Result<Vec<Account>, LedgerError> {
        self.check("get_accounts")?;
        Ok(names
            .iter()
            .filter_map(|n| self.accounts.get(n).cloned())
            .collect())
    }

    async fn get_follow_count(&self, name: &str) -> Result<FollowCount, LedgerError> {
        self.check("get_follow_count")?;
        Ok(FollowCount {
            account: name.to_string(),
            follower_count: self.followers.get(name).map_or(0, |f| f.len() as u32),
            following_count: 0,
        })
    }

    async fn get_followers(
        &self,
        name: &str,
        start: Option<&str>,
        limit: u32,
    ) -> Result<Vec<FollowEntry>, LedgerError> {
        self.check("get_followers")?;
        let all = self.followers.get(name).cloned().unwrap_or_default();
        let start_at = start.and_then(|s| all.iter().position(|f| f == s));
        Ok(page_from(&all, start_at, limit)
            .into_iter()
            .map(|follower| FollowEntry {
                follower,
                following: name.to_string(),
                what: vec!["blog".to_string()],
            })
            .collect())
    }

    async fn get_following(
        &self,
        name: &str,
        start: Option<&str>,
        what: &str,
        limit: u32,
    ) -> Result<Vec<FollowEntry>, LedgerError> {
        self.check("get_following")?;
        if what != "ignore" {
            return Ok(Vec::new());
        }
        let ignored = self.ignores.get(name).cloned().unwrap_or_default();
        Ok(ignored
            .iter()
            .filter(|account| start.map_or(true, |s| account.as_str() >= s))
            .take(limit as usize)
            .map(|account| FollowEntry {
                follower: name.to_string(),
                following: account.clone(),
                what: vec![what.to_string()],
            })
            .collect())
    }

    async fn get_vesting_delegations(
        &self,
        delegator: &str,
        start: Option<&str>,
        limit: u32,
    ) -> Result<Vec<VestingDelegation>, LedgerError> {
        self.check("get_vesting_delegations")?;
        let all = self.delegations.get(delegator).cloned().unwrap_or_default();
        let start_at = start.and_then(|s| all.iter().position(|d| d.delegatee == s));
        Ok(page_from(&all, start_at, limit))
    }

    async fn get_steem_per_mvest(&self) -> Result<f64, LedgerError> {
        self.check("get_steem_per_mvest")?;
        Ok(self.steem_per_mvest)
    }
}

/// Fixed activity table for the cross-reference chain.
#[derive(Default)]
pub struct InMemoryActivity {
    pub last_seen: HashMap<String, DateTime<Utc>>,
}

#[async_trait]
impl ActivityLookup for InMemoryActivity {
    async fn last_activity(&self, name: &str) -> Result<Option<DateTime<Utc>>, LedgerError> {
        Ok(self.last_seen.get(name).copied())
    }
}

/// Fixed delegator list.
#[derive(Default)]
pub struct InMemoryDelegators {
    pub delegators: Vec<WeightedParticipant>,
}

#[async_trait]
impl DelegatorSource for InMemoryDelegators {
    async fn incoming_delegations(
        &self,
        _account: &str,
    ) -> Result<Vec<WeightedParticipant>, LedgerError> {
        Ok(self.delegators.clone())
    }
}
