//! Wallet screening: how much of an author's stake is delegated away, and to whom.

use super::author::lookup;
use super::verdict::{RejectReason, StageResult};
use crate::ledger::{all_vesting_delegations, Ledger, VestingDelegation};
use crate::models::{Vests, WalletConfig};
use tracing::debug;

/// Stake breakdown used by the wallet checks.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletSummary {
    pub vesting: Vests,
    /// Outgoing delegation, excluding delegation to the operator
    pub delegated: Vests,
    pub screened: Vests,
}

impl WalletSummary {
    pub fn from_delegations(
        vesting: Vests,
        delegated: Vests,
        delegations: &[VestingDelegation],
        operator: &str,
        screened_delegatees: &[String],
    ) -> Self {
        let to_operator: Vests = delegations
            .iter()
            .filter(|d| d.delegatee == operator)
            .map(|d| d.vesting_shares)
            .sum();
        let screened: Vests = delegations
            .iter()
            .filter(|d| screened_delegatees.iter().any(|s| s == &d.delegatee))
            .map(|d| d.vesting_shares)
            .sum();

        Self {
            vesting,
            delegated: delegated.saturating_sub(to_operator),
            screened,
        }
    }

    /// Delegated share of own stake in percent (0 for an empty wallet).
    pub fn delegation_pct(&self) -> f64 {
        self.delegated.percent_of(self.vesting)
    }

    pub fn screened_pct(&self) -> f64 {
        self.screened.percent_of(self.vesting)
    }

    /// Undelegated stake in liquid-token units.
    pub fn undelegated_sp(&self, steem_per_mvest: f64) -> f64 {
        self.vesting.saturating_sub(self.delegated).as_f64() / 1_000_000.0 * steem_per_mvest
    }
}

pub struct WalletScreen {
    config: WalletConfig,
    operator: String,
    page_size: u32,
}

impl WalletScreen {
    pub fn new(config: WalletConfig, operator: impl Into<String>, page_size: u32) -> Self {
        Self {
            config,
            operator: operator.into(),
            page_size,
        }
    }

    /// Whether any wallet threshold is configured.
    pub fn is_active(&self) -> bool {
        self.config.max_delegation_pct < 100.0
            || self.config.min_undelegated_sp > 0.0
            || (self.config.max_screened_delegation_pct < 100.0
                && !self.config.screened_delegatees.is_empty())
    }

    pub async fn check(&self, ledger: &dyn Ledger, author: &str) -> StageResult {
        if !self.is_active() {
            return Ok(());
        }

        let account = lookup("wallet", ledger.get_account(author).await)?;
        let delegations = if account.delegated_vesting_shares.is_zero() {
            Vec::new()
        } else {
            lookup(
                "wallet",
                all_vesting_delegations(ledger, author, self.page_size).await,
            )?
        };

        let summary = WalletSummary::from_delegations(
            account.vesting_shares,
            account.delegated_vesting_shares,
            &delegations,
            &self.operator,
            &self.config.screened_delegatees,
        );
        debug!(
            author,
            vesting = %summary.vesting,
            delegated = %summary.delegated,
            screened = %summary.screened,
            "Wallet summary"
        );

        let pct = summary.delegation_pct();
        if pct > self.config.max_delegation_pct {
            return Err(RejectReason::HighDelegation {
                pct,
                max: self.config.max_delegation_pct,
            });
        }

        if self.config.min_undelegated_sp > 0.0 {
            let steem_per_mvest = lookup("wallet", ledger.get_steem_per_mvest().await)?;
            if steem_per_mvest <= 0.0 {
                return Err(RejectReason::LookupFailed {
                    stage: "steem_per_mvest",
                });
            }
            let sp = summary.undelegated_sp(steem_per_mvest);
            if sp < self.config.min_undelegated_sp {
                return Err(RejectReason::LowUndelegatedStake {
                    sp,
                    min: self.config.min_undelegated_sp,
                });
            }
        }

        let screened_pct = summary.screened_pct();
        if screened_pct > self.config.max_screened_delegation_pct {
            return Err(RejectReason::ScreenedDelegation {
                pct: screened_pct,
                max: self.config.max_screened_delegation_pct,
            });
        }

        Ok(())
    }
}
