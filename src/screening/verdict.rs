//! Screening outcomes.

use std::fmt;

/// Why a candidate was screened out.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    EditedPost,
    BlacklistedTag(String),
    MissingRequiredTag,
    LanguageMismatch { detected: Option<String> },
    BlacklistedAuthor,
    RegistryListed { registry: String },
    TooShort { words: usize, min: usize },
    TooManyTags { count: usize, max: usize },
    LowReputation { reputation: f64, min: f64 },
    Inactive { idle_days: i64, max: i64 },
    CrossReferenceActive { idle_days: i64, min: i64 },
    FewFollowers { count: u32, min: u32 },
    SlowFollowerGrowth { per_month: f64, min: f64 },
    SlowAdjustedGrowth { per_month: f64, min: f64 },
    HighDelegation { pct: f64, max: f64 },
    LowUndelegatedStake { sp: f64, min: f64 },
    ScreenedDelegation { pct: f64, max: f64 },
    LowFollowerReputation { median: Option<f64>, min: f64 },
    FewActiveFollowers { count: u32, min: u32 },
    LookupFailed { stage: &'static str },
}

impl RejectReason {
    /// Stable identifier used in logs and run statistics.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EditedPost => "edited",
            Self::BlacklistedTag(_) => "blacklisted_tag",
            Self::MissingRequiredTag => "missing_required_tag",
            Self::LanguageMismatch { .. } => "language_mismatch",
            Self::BlacklistedAuthor => "blacklisted_author",
            Self::RegistryListed { .. } => "registry_listed",
            Self::TooShort { .. } => "too_short",
            Self::TooManyTags { .. } => "too_many_tags",
            Self::LowReputation { .. } => "low_reputation",
            Self::Inactive { .. } => "inactive",
            Self::CrossReferenceActive { .. } => "cross_reference_active",
            Self::FewFollowers { .. } => "few_followers",
            Self::SlowFollowerGrowth { .. } => "slow_follower_growth",
            Self::SlowAdjustedGrowth { .. } => "slow_adjusted_growth",
            Self::HighDelegation { .. } => "high_delegation",
            Self::LowUndelegatedStake { .. } => "low_undelegated_stake",
            Self::ScreenedDelegation { .. } => "screened_delegation",
            Self::LowFollowerReputation { .. } => "low_follower_reputation",
            Self::FewActiveFollowers { .. } => "few_active_followers",
            Self::LookupFailed { .. } => "lookup_failed",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EditedPost => write!(f, "post is an edit of an earlier revision"),
            Self::BlacklistedTag(tag) => write!(f, "blacklisted tag '{tag}'"),
            Self::MissingRequiredTag => write!(f, "no required tag present"),
            Self::LanguageMismatch { detected: Some(code) } => {
                write!(f, "language '{code}' is not a target language")
            }
            Self::LanguageMismatch { detected: None } => write!(f, "language not detected"),
            Self::BlacklistedAuthor => write!(f, "author is blacklisted"),
            Self::RegistryListed { registry } => write!(f, "author is ignored by @{registry}"),
            Self::TooShort { words, min } => write!(f, "{words} words, minimum is {min}"),
            Self::TooManyTags { count, max } => write!(f, "{count} tags, maximum is {max}"),
            Self::LowReputation { reputation, min } => {
                write!(f, "reputation {reputation:.1} below {min:.1}")
            }
            Self::Inactive { idle_days, max } => {
                write!(f, "inactive for {idle_days} days, maximum is {max}")
            }
            Self::CrossReferenceActive { idle_days, min } => write!(
                f,
                "active on the cross-reference chain {idle_days} days ago, needs {min}"
            ),
            Self::FewFollowers { count, min } => write!(f, "{count} followers, minimum is {min}"),
            Self::SlowFollowerGrowth { per_month, min } => {
                write!(f, "{per_month:.2} followers/month, minimum is {min:.2}")
            }
            Self::SlowAdjustedGrowth { per_month, min } => write!(
                f,
                "{per_month:.2} decay-adjusted followers/month, minimum is {min:.2}"
            ),
            Self::HighDelegation { pct, max } => {
                write!(f, "{pct:.1}% of stake delegated, maximum is {max:.1}%")
            }
            Self::LowUndelegatedStake { sp, min } => {
                write!(f, "{sp:.3} SP undelegated, minimum is {min:.3}")
            }
            Self::ScreenedDelegation { pct, max } => write!(
                f,
                "{pct:.1}% delegated to screened accounts, maximum is {max:.1}%"
            ),
            Self::LowFollowerReputation {
                median: Some(median),
                min,
            } => write!(f, "median follower reputation {median:.1} below {min:.1}"),
            Self::LowFollowerReputation { median: None, .. } => {
                write!(f, "no followers to take a median reputation from")
            }
            Self::FewActiveFollowers { count, min } => {
                write!(f, "{count} active followers, minimum is {min}")
            }
            Self::LookupFailed { stage } => write!(f, "ledger lookup failed during {stage}"),
        }
    }
}

/// Terminal state of the screening pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreeningVerdict {
    Accept,
    Reject(RejectReason),
}

impl ScreeningVerdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }

    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            Self::Accept => None,
            Self::Reject(reason) => Some(reason),
        }
    }
}

impl fmt::Display for ScreeningVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept => write!(f, "accept"),
            Self::Reject(reason) => write!(f, "reject ({}): {}", reason.code(), reason),
        }
    }
}

/// Result of a single stage: pass, or the reason to stop.
pub(crate) type StageResult = Result<(), RejectReason>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_display_includes_code() {
        let verdict = ScreeningVerdict::Reject(RejectReason::TooShort { words: 12, min: 500 });
        assert_eq!(verdict.to_string(), "reject (too_short): 12 words, minimum is 500");
        assert!(!verdict.is_accept());
        assert_eq!(verdict.reason().map(RejectReason::code), Some("too_short"));
    }

    #[test]
    fn test_missing_median_display() {
        let reason = RejectReason::LowFollowerReputation {
            median: None,
            min: 40.0,
        };
        assert_eq!(reason.code(), "low_follower_reputation");
        assert!(reason.to_string().contains("no followers"));
    }
}
