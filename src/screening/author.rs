//! Author screening: lists, reputation, activity and follower metrics.
//!
//! Epistemic foundation:
//! - K_i: Reputation is stored raw; `rep_log10` maps it to the 25-based scale
//! - B_i: Every ledger read can fail → the stage rejects with `LookupFailed`
//! - I^B: Follower-wide checks page the whole follower list → run last

use super::verdict::{RejectReason, StageResult};
use crate::ledger::{all_followers, is_ignored_by, Account, ActivityLookup, Ledger};
use crate::models::{AuthorConfig, LedgerError};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

const DAYS_PER_MONTH: f64 = 30.4375;

/// Accounts fetched per `get_accounts` call when scanning followers.
const ACCOUNT_BATCH: usize = 100;

/// Raw ledger reputation on the familiar 25-based scale.
pub fn rep_log10(raw: i64) -> f64 {
    if raw == 0 {
        return 25.0;
    }
    let magnitude = (raw.unsigned_abs() as f64).log10();
    let score = (magnitude - 9.0).max(0.0);
    let score = if raw < 0 { -score } else { score };
    score * 9.0 + 25.0
}

/// Followers gained per month of account age (at least one month).
pub fn followers_per_month(followers: u32, age_days: f64) -> f64 {
    let months = (age_days / DAYS_PER_MONTH).max(1.0);
    f64::from(followers) / months
}

/// Follower growth over a half-life-discounted age.
///
/// The effective age is `∫₀^age 0.5^(t/h) dt = h/ln2 · (1 − 0.5^(age/h))`, so
/// old accounts are not penalised for months in which few people were around
/// to follow them. A non-positive half-life disables the discount.
pub fn decay_adjusted_per_month(followers: u32, age_days: f64, halflife_years: f64) -> f64 {
    let age_months = age_days / DAYS_PER_MONTH;
    let halflife_months = halflife_years * 12.0;
    if halflife_months <= 0.0 {
        return followers_per_month(followers, age_days);
    }
    let effective = halflife_months / std::f64::consts::LN_2
        * (1.0 - 0.5f64.powf(age_months / halflife_months));
    f64::from(followers) / effective.max(1.0)
}

/// Median of `values`, or `None` when empty.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_seconds().max(0) as f64 / 86_400.0
}

/// Log a ledger failure and turn it into a stage rejection.
pub(crate) fn lookup<T>(
    stage: &'static str,
    result: Result<T, LedgerError>,
) -> Result<T, RejectReason> {
    result.map_err(|e| {
        warn!(stage, error = %e, "Ledger lookup failed during screening");
        RejectReason::LookupFailed { stage }
    })
}

/// Author-level checks, grouped by cost.
pub struct AuthorScreen {
    config: AuthorConfig,
    follower_page_size: u32,
}

impl AuthorScreen {
    pub fn new(config: AuthorConfig, follower_page_size: u32) -> Self {
        Self {
            config,
            follower_page_size,
        }
    }

    pub fn config(&self) -> &AuthorConfig {
        &self.config
    }

    pub fn is_whitelisted(&self, author: &str) -> bool {
        self.config.whitelist.iter().any(|a| a == author)
    }

    /// Configured blacklist, then the registry's ignore list.
    pub async fn check_blacklist(&self, ledger: &dyn Ledger, author: &str) -> StageResult {
        if self.config.blacklist.iter().any(|a| a == author) {
            return Err(RejectReason::BlacklistedAuthor);
        }
        if let Some(registry) = &self.config.registry_account {
            if lookup("registry", is_ignored_by(ledger, registry, author).await)? {
                return Err(RejectReason::RegistryListed {
                    registry: registry.clone(),
                });
            }
        }
        Ok(())
    }

    /// Reputation, activity and follower-count checks.
    pub async fn check_metrics(
        &self,
        ledger: &dyn Ledger,
        cross_reference: Option<&dyn ActivityLookup>,
        author: &str,
        now: DateTime<Utc>,
    ) -> StageResult {
        let c = &self.config;
        let needs_account = c.min_reputation > 0.0
            || c.max_inactivity_days > 0
            || c.min_followers_per_month > 0.0
            || c.min_adjusted_followers_per_month > 0.0;
        let needs_followers = c.min_followers > 0
            || c.min_followers_per_month > 0.0
            || c.min_adjusted_followers_per_month > 0.0;

        let account: Option<Account> = if needs_account {
            Some(lookup("author", ledger.get_account(author).await)?)
        } else {
            None
        };

        if let Some(account) = &account {
            self.check_reputation(account)?;
            self.check_inactivity(account, now)?;
        }

        if c.min_cross_reference_idle_days > 0 {
            if let Some(cross_reference) = cross_reference {
                let seen = lookup("cross_reference", cross_reference.last_activity(author).await)?;
                if let Some(seen) = seen {
                    let idle_days = (now - seen).num_days();
                    if idle_days < c.min_cross_reference_idle_days {
                        return Err(RejectReason::CrossReferenceActive {
                            idle_days,
                            min: c.min_cross_reference_idle_days,
                        });
                    }
                }
            }
        }

        if !needs_followers {
            return Ok(());
        }
        let followers = lookup("followers", ledger.get_follow_count(author).await)?
            .follower_count;

        if followers < c.min_followers {
            return Err(RejectReason::FewFollowers {
                count: followers,
                min: c.min_followers,
            });
        }

        if let Some(account) = &account {
            let age_days = days_between(account.created, now);

            let per_month = followers_per_month(followers, age_days);
            if c.min_followers_per_month > 0.0 && per_month < c.min_followers_per_month {
                return Err(RejectReason::SlowFollowerGrowth {
                    per_month,
                    min: c.min_followers_per_month,
                });
            }

            let adjusted = decay_adjusted_per_month(followers, age_days, c.follower_halflife_years);
            if c.min_adjusted_followers_per_month > 0.0
                && adjusted < c.min_adjusted_followers_per_month
            {
                return Err(RejectReason::SlowAdjustedGrowth {
                    per_month: adjusted,
                    min: c.min_adjusted_followers_per_month,
                });
            }
        }

        Ok(())
    }

    fn check_reputation(&self, account: &Account) -> StageResult {
        let reputation = rep_log10(account.reputation);
        if self.config.min_reputation > 0.0 && reputation < self.config.min_reputation {
            return Err(RejectReason::LowReputation {
                reputation,
                min: self.config.min_reputation,
            });
        }
        Ok(())
    }

    /// Recency is judged by voting, since the candidate post itself
    /// refreshes the last-post time.
    fn check_inactivity(&self, account: &Account, now: DateTime<Utc>) -> StageResult {
        let max = self.config.max_inactivity_days;
        if max <= 0 {
            return Ok(());
        }
        let idle_days = account
            .last_vote_time
            .map_or(i64::MAX, |seen| (now - seen).num_days());
        if idle_days > max {
            return Err(RejectReason::Inactive { idle_days, max });
        }
        Ok(())
    }

    /// Whether the follower-wide checks are configured at all.
    pub fn has_follower_checks(&self) -> bool {
        self.config.min_follower_median_reputation > 0.0 || self.config.min_active_followers > 0
    }

    /// Median follower reputation and active-follower count.
    pub async fn check_followers(
        &self,
        ledger: &dyn Ledger,
        author: &str,
        now: DateTime<Utc>,
    ) -> StageResult {
        if !self.has_follower_checks() {
            return Ok(());
        }

        let names = lookup(
            "follower_scan",
            all_followers(ledger, author, self.follower_page_size).await,
        )?;
        debug!(author, followers = names.len(), "Scanning followers");

        let mut accounts: Vec<Account> = Vec::with_capacity(names.len());
        for chunk in names.chunks(ACCOUNT_BATCH) {
            accounts.extend(lookup("follower_scan", ledger.get_accounts(chunk).await)?);
        }

        let min_median = self.config.min_follower_median_reputation;
        if min_median > 0.0 {
            let mut reputations: Vec<f64> =
                accounts.iter().map(|a| rep_log10(a.reputation)).collect();
            match median(&mut reputations) {
                Some(m) if m >= min_median => {}
                median => {
                    return Err(RejectReason::LowFollowerReputation {
                        median,
                        min: min_median,
                    })
                }
            }
        }

        let min_active = self.config.min_active_followers;
        if min_active > 0 {
            let window = self.config.active_follower_days;
            let active = accounts
                .iter()
                .filter_map(Account::last_activity)
                .filter(|seen| (now - *seen).num_days() <= window)
                .count() as u32;
            if active < min_active {
                return Err(RejectReason::FewActiveFollowers {
                    count: active,
                    min: min_active,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::{account, InMemoryActivity, InMemoryLedger};
    use chrono::Duration;

    #[test]
    fn test_rep_log10_scale() {
        assert_eq!(rep_log10(0), 25.0);
        assert_eq!(rep_log10(1_000_000_000), 25.0);
        assert!((rep_log10(1_000_000_000_000) - 52.0).abs() < 1e-9);
        assert!((rep_log10(-1_000_000_000_000) - -2.0).abs() < 1e-9);
        let high = rep_log10(95_832_978_796_820);
        assert!(high > 69.0 && high < 70.0);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut []), None);
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn test_growth_rates() {
        // 120 followers over two years
        let plain = followers_per_month(120, 2.0 * 365.25);
        assert!((plain - 5.0).abs() < 1e-6);

        let adjusted = decay_adjusted_per_month(120, 2.0 * 365.25, 1.0);
        assert!(adjusted > plain);

        // Young accounts count as one month old
        assert_eq!(followers_per_month(10, 3.0), 10.0);
        assert_eq!(decay_adjusted_per_month(10, 3.0, 0.0), 10.0);
    }

    #[tokio::test]
    async fn test_registry_blacklist() {
        let mut ledger = InMemoryLedger::default();
        ledger.add_ignore("registry", "spammer");
        let screen = AuthorScreen::new(
            AuthorConfig {
                blacklist: vec!["known-bad".to_string()],
                registry_account: Some("registry".to_string()),
                ..AuthorConfig::default()
            },
            100,
        );

        assert_eq!(
            screen.check_blacklist(&ledger, "known-bad").await,
            Err(RejectReason::BlacklistedAuthor)
        );
        assert!(matches!(
            screen.check_blacklist(&ledger, "spammer").await,
            Err(RejectReason::RegistryListed { .. })
        ));
        assert!(screen.check_blacklist(&ledger, "alice").await.is_ok());
    }

    #[tokio::test]
    async fn test_metrics_order_and_lookup_failure() {
        let now = Utc::now();
        let mut ledger = InMemoryLedger::default();
        ledger.add_account(account("alice"));
        ledger.set_followers("alice", &["f1".to_string()]);

        let screen = AuthorScreen::new(
            AuthorConfig {
                min_reputation: 50.0,
                min_followers: 5,
                ..AuthorConfig::default()
            },
            100,
        );
        assert!(matches!(
            screen.check_metrics(&ledger, None, "alice", now).await,
            Err(RejectReason::FewFollowers { count: 1, min: 5 })
        ));

        ledger.fail("get_follow_count");
        assert_eq!(
            screen.check_metrics(&ledger, None, "alice", now).await,
            Err(RejectReason::LookupFailed { stage: "followers" })
        );
    }

    #[tokio::test]
    async fn test_cross_reference_activity() {
        let now = Utc::now();
        let ledger = InMemoryLedger::default();
        let mut activity = InMemoryActivity::default();
        activity.last_seen.insert("alice".to_string(), now - Duration::days(2));

        let screen = AuthorScreen::new(
            AuthorConfig {
                min_cross_reference_idle_days: 30,
                ..AuthorConfig::default()
            },
            100,
        );
        assert!(matches!(
            screen
                .check_metrics(&ledger, Some(&activity as &dyn ActivityLookup), "alice", now)
                .await,
            Err(RejectReason::CrossReferenceActive { idle_days: 2, min: 30 })
        ));
        assert!(screen
            .check_metrics(&ledger, Some(&activity as &dyn ActivityLookup), "bob", now)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_follower_checks() {
        let now = Utc::now();
        let mut ledger = InMemoryLedger::default();
        let names: Vec<String> = (0..5).map(|i| format!("f{i}")).collect();
        ledger.set_followers("alice", &names);
        for (i, name) in names.iter().enumerate() {
            let follower = ledger.account_mut(name);
            // reputations 25, 34, 43, 52, 61 → median 43
            follower.reputation = if i == 0 { 0 } else { 10i64.pow(9 + i as u32) };
            if i < 3 {
                follower.last_vote_time = Some(now - Duration::days(400));
                follower.last_post = None;
            }
        }

        let strict = AuthorScreen::new(
            AuthorConfig {
                min_follower_median_reputation: 45.0,
                ..AuthorConfig::default()
            },
            2,
        );
        match strict.check_followers(&ledger, "alice", now).await {
            Err(RejectReason::LowFollowerReputation { median: Some(m), .. }) => {
                assert!((m - 43.0).abs() < 1e-9)
            }
            other => panic!("unexpected {other:?}"),
        }

        let active = AuthorScreen::new(
            AuthorConfig {
                min_active_followers: 3,
                ..AuthorConfig::default()
            },
            2,
        );
        assert_eq!(
            active.check_followers(&ledger, "alice", now).await,
            Err(RejectReason::FewActiveFollowers { count: 2, min: 3 })
        );

        let lonely = AuthorScreen::new(
            AuthorConfig {
                min_follower_median_reputation: 30.0,
                ..AuthorConfig::default()
            },
            2,
        );
        assert_eq!(
            lonely.check_followers(&ledger, "nobody", now).await,
            Err(RejectReason::LowFollowerReputation {
                median: None,
                min: 30.0
            })
        );
    }
}
