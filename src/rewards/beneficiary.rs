//! Fixed-point beneficiary allocation.
//!
//! Epistemic foundation:
//! - K_i: Output weights are non-negative integers summing exactly to `total`
//! - K_i: The burn sink absorbs every basis point no other role claims
//! - K_i: Over-commitment is a configuration defect → AllocationError, never clamped

use crate::models::{AllocationError, BlogConfig, RoleWeights};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why an account is on the beneficiary list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeneficiaryRole {
    /// Account operating the curator (singular)
    Operator,
    /// Author of a curated article (accumulative)
    Author,
    /// Stake delegator drawn by the sampler (accumulative)
    Delegator,
    /// Receives the unallocated remainder (singular)
    BurnSink,
}

impl BeneficiaryRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Operator => "operator",
            Self::Author => "author",
            Self::Delegator => "delegator",
            Self::BurnSink => "burn",
        }
    }
}

impl fmt::Display for BeneficiaryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of a post's beneficiary table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeneficiaryEntry {
    pub account: String,
    /// Basis points
    pub weight: u32,
}

/// Turns role-tagged accounts into an exact basis-point table.
#[derive(Debug, Clone)]
pub struct BeneficiaryAllocator {
    weights: RoleWeights,
    total: u32,
    burn_account: String,
    max_beneficiaries: usize,
}

impl BeneficiaryAllocator {
    pub fn new(weights: RoleWeights, total: u32, burn_account: impl Into<String>) -> Self {
        Self {
            weights,
            total,
            burn_account: burn_account.into(),
            max_beneficiaries: usize::MAX,
        }
    }

    pub fn from_config(blog: &BlogConfig) -> Self {
        Self::new(blog.weights, blog.total_weight, blog.burn_account.clone())
            .with_max_beneficiaries(blog.max_beneficiaries)
    }

    pub fn with_max_beneficiaries(mut self, limit: usize) -> Self {
        self.max_beneficiaries = limit;
        self
    }

    /// Same allocator with a different per-author weight.
    pub fn with_author_weight(&self, weight: u32) -> Self {
        let mut next = self.clone();
        next.weights.author = weight;
        next
    }

    /// Same allocator with a different per-delegator weight.
    pub fn with_delegator_weight(&self, weight: u32) -> Self {
        let mut next = self.clone();
        next.weights.delegator = weight;
        next
    }

    pub fn weights(&self) -> RoleWeights {
        self.weights
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn burn_account(&self) -> &str {
        &self.burn_account
    }

    /// Verify that `authors` author slots and `delegators` delegator slots fit
    /// inside `total` and the beneficiary-count limit.
    ///
    /// Run once at startup; a failure means the configuration is unusable.
    pub fn check_capacity(&self, authors: usize, delegators: usize) -> Result<(), AllocationError> {
        let required = u64::from(self.weights.operator)
            + authors as u64 * u64::from(self.weights.author)
            + delegators as u64 * u64::from(self.weights.delegator);

        if required > u64::from(self.total) {
            return Err(AllocationError::Overcommitted {
                required,
                total: self.total,
            });
        }

        let mut slots = 0;
        if self.weights.operator > 0 {
            slots += 1;
        }
        if self.weights.author > 0 {
            slots += authors;
        }
        if self.weights.delegator > 0 {
            slots += delegators;
        }
        if required < u64::from(self.total) {
            slots += 1;
        }
        if slots > self.max_beneficiaries {
            return Err(AllocationError::TooManyBeneficiaries {
                count: slots,
                limit: self.max_beneficiaries,
            });
        }

        Ok(())
    }

    /// Allocate weights to `members`, in input order.
    ///
    /// Output is sorted by account and sums exactly to `total`.
    pub fn allocate(
        &self,
        members: &[(String, BeneficiaryRole)],
    ) -> Result<Vec<BeneficiaryEntry>, AllocationError> {
        let mut weights: BTreeMap<String, u64> = BTreeMap::new();
        let mut operator: Option<&str> = None;
        let mut burn: Option<&str> = None;

        for (account, role) in members {
            match role {
                BeneficiaryRole::Operator => {
                    let first = claim_singular(&mut operator, account, *role)?;
                    if first && self.weights.operator > 0 {
                        *weights.entry(account.clone()).or_default() +=
                            u64::from(self.weights.operator);
                    }
                }
                BeneficiaryRole::BurnSink => {
                    claim_singular(&mut burn, account, *role)?;
                }
                BeneficiaryRole::Author => {
                    if self.weights.author > 0 {
                        *weights.entry(account.clone()).or_default() +=
                            u64::from(self.weights.author);
                    }
                }
                BeneficiaryRole::Delegator => {
                    if self.weights.delegator > 0 {
                        *weights.entry(account.clone()).or_default() +=
                            u64::from(self.weights.delegator);
                    }
                }
            }
        }

        let claimed: u64 = weights.values().sum();
        let total = u64::from(self.total);
        if claimed > total {
            return Err(AllocationError::Overcommitted {
                required: claimed,
                total: self.total,
            });
        }

        let remainder = total - claimed;
        if remainder > 0 {
            let sink = burn.unwrap_or(self.burn_account.as_str());
            *weights.entry(sink.to_string()).or_default() += remainder;
        }

        if weights.len() > self.max_beneficiaries {
            return Err(AllocationError::TooManyBeneficiaries {
                count: weights.len(),
                limit: self.max_beneficiaries,
            });
        }

        // Every value is ≤ total, which is a u32
        Ok(weights
            .into_iter()
            .filter(|(_, w)| *w > 0)
            .map(|(account, weight)| BeneficiaryEntry {
                account,
                weight: weight as u32,
            })
            .collect())
    }
}

/// Record the account holding a singular role.
///
/// Returns `true` on first claim, `false` on a repeat by the same account,
/// and an error when a different account tries to claim it.
fn claim_singular<'a>(
    slot: &mut Option<&'a str>,
    account: &'a str,
    role: BeneficiaryRole,
) -> Result<bool, AllocationError> {
    match slot {
        None => {
            *slot = Some(account);
            Ok(true)
        }
        Some(existing) if *existing == account => Ok(false),
        Some(existing) => Err(AllocationError::ConflictingSingular {
            role: role.as_str(),
            first: existing.to_string(),
            second: account.to_string(),
        }),
    }
}

/// Sum of a beneficiary table's weights.
pub fn total_weight(entries: &[BeneficiaryEntry]) -> u64 {
    entries.iter().map(|e| u64::from(e.weight)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn allocator(operator: u32, author: u32, delegator: u32) -> BeneficiaryAllocator {
        BeneficiaryAllocator::new(
            RoleWeights {
                operator,
                author,
                delegator,
            },
            10_000,
            "null",
        )
    }

    fn tagged(account: &str, role: BeneficiaryRole) -> (String, BeneficiaryRole) {
        (account.to_string(), role)
    }

    #[test]
    fn test_allocation_sorted_and_exact() {
        let members = vec![
            tagged("curator", BeneficiaryRole::Operator),
            tagged("zed", BeneficiaryRole::Author),
            tagged("amy", BeneficiaryRole::Author),
            tagged("dan", BeneficiaryRole::Delegator),
        ];
        let entries = allocator(500, 1000, 200).allocate(&members).unwrap();

        let accounts: Vec<_> = entries.iter().map(|e| e.account.as_str()).collect();
        assert_eq!(accounts, vec!["amy", "curator", "dan", "null", "zed"]);
        assert_eq!(total_weight(&entries), 10_000);

        let null = entries.iter().find(|e| e.account == "null").unwrap();
        assert_eq!(null.weight, 10_000 - 500 - 2_000 - 200);
    }

    #[test]
    fn test_accumulates_across_roles_and_repeats() {
        let members = vec![
            tagged("amy", BeneficiaryRole::Author),
            tagged("amy", BeneficiaryRole::Author),
            tagged("amy", BeneficiaryRole::Delegator),
        ];
        let entries = allocator(0, 1000, 300).allocate(&members).unwrap();
        let amy = entries.iter().find(|e| e.account == "amy").unwrap();
        assert_eq!(amy.weight, 2_300);
        assert_eq!(total_weight(&entries), 10_000);
    }

    #[test]
    fn test_operator_counted_once() {
        let members = vec![
            tagged("curator", BeneficiaryRole::Operator),
            tagged("curator", BeneficiaryRole::Operator),
        ];
        let entries = allocator(700, 0, 0).allocate(&members).unwrap();
        assert_eq!(
            entries,
            vec![
                BeneficiaryEntry {
                    account: "curator".to_string(),
                    weight: 700
                },
                BeneficiaryEntry {
                    account: "null".to_string(),
                    weight: 9_300
                },
            ]
        );
    }

    #[test]
    fn test_conflicting_operator_rejected() {
        let members = vec![
            tagged("one", BeneficiaryRole::Operator),
            tagged("two", BeneficiaryRole::Operator),
        ];
        assert!(matches!(
            allocator(100, 0, 0).allocate(&members),
            Err(AllocationError::ConflictingSingular { role: "operator", .. })
        ));
    }

    #[test]
    fn test_zero_weight_roles_omitted() {
        let members = vec![
            tagged("curator", BeneficiaryRole::Operator),
            tagged("amy", BeneficiaryRole::Author),
        ];
        let entries = allocator(0, 0, 0).allocate(&members).unwrap();
        assert_eq!(
            entries,
            vec![BeneficiaryEntry {
                account: "null".to_string(),
                weight: 10_000
            }]
        );
    }

    #[test]
    fn test_explicit_burn_sink_account() {
        let members = vec![
            tagged("amy", BeneficiaryRole::Author),
            tagged("burner", BeneficiaryRole::BurnSink),
        ];
        let entries = allocator(0, 4_000, 0).allocate(&members).unwrap();
        assert!(entries.iter().any(|e| e.account == "burner" && e.weight == 6_000));
        assert!(!entries.iter().any(|e| e.account == "null"));
    }

    #[test]
    fn test_full_commitment_has_no_burn_entry() {
        let members = vec![
            tagged("curator", BeneficiaryRole::Operator),
            tagged("amy", BeneficiaryRole::Author),
        ];
        let entries = allocator(4_000, 6_000, 0).allocate(&members).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(total_weight(&entries), 10_000);
    }

    #[test]
    fn test_overcommitted_weights_abort() {
        // 6000 + 5 × 1000 = 11000 > 10000
        let alloc = allocator(6_000, 1_000, 0);
        assert_eq!(
            alloc.check_capacity(5, 0),
            Err(AllocationError::Overcommitted {
                required: 11_000,
                total: 10_000
            })
        );

        let mut members = vec![tagged("curator", BeneficiaryRole::Operator)];
        for name in ["a", "b", "c", "d", "e"] {
            members.push(tagged(name, BeneficiaryRole::Author));
        }
        assert!(matches!(
            alloc.allocate(&members),
            Err(AllocationError::Overcommitted { required: 11_000, .. })
        ));
    }

    #[test]
    fn test_capacity_counts_beneficiary_slots() {
        let alloc = allocator(500, 500, 100).with_max_beneficiaries(8);
        // operator + 5 authors + 2 delegators + burn = 9
        assert!(matches!(
            alloc.check_capacity(5, 2),
            Err(AllocationError::TooManyBeneficiaries { count: 9, limit: 8 })
        ));
        assert!(alloc.check_capacity(4, 2).is_ok());
    }

    #[test]
    fn test_delegator_weight_override() {
        let base = allocator(500, 1_000, 200);
        let adjusted = base.with_delegator_weight(66);
        let members = vec![
            tagged("d1", BeneficiaryRole::Delegator),
            tagged("d2", BeneficiaryRole::Delegator),
            tagged("d3", BeneficiaryRole::Delegator),
        ];
        let entries = adjusted.allocate(&members).unwrap();
        assert!(entries.iter().filter(|e| e.account.starts_with('d')).all(|e| e.weight == 66));
        assert_eq!(total_weight(&entries), 10_000);
        assert_eq!(base.weights().delegator, 200);
    }

    fn role_strategy() -> impl Strategy<Value = BeneficiaryRole> {
        prop_oneof![
            Just(BeneficiaryRole::Author),
            Just(BeneficiaryRole::Delegator),
        ]
    }

    proptest! {
        #[test]
        fn prop_allocation_sums_to_total(
            operator in 0u32..3_000,
            author in 0u32..1_000,
            delegator in 0u32..500,
            members in proptest::collection::vec(("[a-f]{1,3}", role_strategy()), 0..7),
        ) {
            let alloc = allocator(operator, author, delegator);
            let mut tagged_members = vec![("curator".to_string(), BeneficiaryRole::Operator)];
            tagged_members.extend(members.into_iter().map(|(a, r)| (a, r)));

            let authors = tagged_members.iter().filter(|(_, r)| *r == BeneficiaryRole::Author).count();
            let delegators = tagged_members.iter().filter(|(_, r)| *r == BeneficiaryRole::Delegator).count();
            let claimed = u64::from(operator) + authors as u64 * u64::from(author)
                + delegators as u64 * u64::from(delegator);

            match alloc.allocate(&tagged_members) {
                Ok(entries) => {
                    prop_assert!(claimed <= 10_000);
                    prop_assert_eq!(total_weight(&entries), 10_000);
                    prop_assert!(entries.iter().all(|e| e.weight > 0));
                    let mut sorted = entries.clone();
                    sorted.sort_by(|a, b| a.account.cmp(&b.account));
                    prop_assert_eq!(sorted, entries);
                }
                Err(AllocationError::Overcommitted { required, .. }) => {
                    prop_assert!(claimed > 10_000);
                    prop_assert_eq!(required, claimed);
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }
    }
}
