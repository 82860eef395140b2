//! Ordered, short-circuiting screening pipeline.
//!
//! Stages run cheapest first and stop at the first rejection:
//!
//! 1. edit detection
//! 2. blacklisted tag
//! 3. required tag missing
//! 4. language mismatch (body and title)
//! 5. author blacklist (configured list, registry ignore list)
//! 6. whitelist short-circuit: accepts, skipping everything below
//! 7. too short
//! 8. too many tags
//! 9. author metrics (reputation, activity, followers, growth)
//! 10. wallet (delegation ceiling, undelegated floor, screened delegatees)
//! 11. follower-wide checks (median reputation, active followers)

use super::author::{lookup, AuthorScreen};
use super::content::{has_patch_marker, ContentRules, FormattingRemover};
use super::language::{language_mismatch, LanguageDetector, WhatlangDetector};
use super::verdict::{RejectReason, ScreeningVerdict, StageResult};
use super::wallet::WalletScreen;
use crate::ledger::{ActivityLookup, Ledger};
use crate::models::{Candidate, Config, CuratorError, LedgerError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

pub struct ScreeningPipeline {
    content: ContentRules,
    formatting: FormattingRemover,
    authors: AuthorScreen,
    wallet: WalletScreen,
    ledger: Arc<dyn Ledger>,
    cross_reference: Option<Arc<dyn ActivityLookup>>,
    detector: Box<dyn LanguageDetector>,
}

impl ScreeningPipeline {
    pub fn new(
        content: ContentRules,
        authors: AuthorScreen,
        wallet: WalletScreen,
        ledger: Arc<dyn Ledger>,
    ) -> Result<Self> {
        let formatting = FormattingRemover::new()
            .map_err(|e| CuratorError::Internal(format!("formatting rules: {e}")))?;

        Ok(Self {
            content,
            formatting,
            authors,
            wallet,
            ledger,
            cross_reference: None,
            detector: Box::new(WhatlangDetector),
        })
    }

    pub fn from_config(config: &Config, ledger: Arc<dyn Ledger>) -> Result<Self> {
        Self::new(
            ContentRules::new(config.content.clone()),
            AuthorScreen::new(config.author.clone(), config.ledger.follower_page_size),
            WalletScreen::new(
                config.wallet.clone(),
                config.blog.account.clone(),
                config.ledger.delegation_page_size,
            ),
            ledger,
        )
    }

    pub fn with_cross_reference(mut self, lookup: Arc<dyn ActivityLookup>) -> Self {
        self.cross_reference = Some(lookup);
        self
    }

    pub fn with_language_detector(mut self, detector: Box<dyn LanguageDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Body with markdown and HTML removed.
    pub fn plain_text(&self, body: &str) -> String {
        self.formatting.strip(body)
    }

    pub async fn screen(&self, candidate: &Candidate) -> ScreeningVerdict {
        self.screen_at(candidate, Utc::now()).await
    }

    /// Screen with an explicit clock.
    pub async fn screen_at(&self, candidate: &Candidate, now: DateTime<Utc>) -> ScreeningVerdict {
        match self.run_stages(candidate, now).await {
            Ok(()) => ScreeningVerdict::Accept,
            Err(reason) => {
                debug!(
                    author = %candidate.author,
                    permlink = %candidate.permlink,
                    reason = reason.code(),
                    "Screened out"
                );
                ScreeningVerdict::Reject(reason)
            }
        }
    }

    /// Author-level stages only (blacklist, whitelist, metrics, wallet, followers).
    pub async fn screen_author(&self, author: &str, now: DateTime<Utc>) -> ScreeningVerdict {
        match self.run_author_stages(author, now).await {
            Ok(()) => ScreeningVerdict::Accept,
            Err(reason) => ScreeningVerdict::Reject(reason),
        }
    }

    async fn run_stages(&self, candidate: &Candidate, now: DateTime<Utc>) -> StageResult {
        self.check_edit(candidate).await?;
        self.content.check_blacklisted_tags(candidate)?;
        self.content.check_required_tags(candidate)?;

        let plain = self.plain_text(&candidate.body);
        language_mismatch(
            self.detector.as_ref(),
            &self.content.config().languages,
            &plain,
            &candidate.title,
        )
        .map_err(|detected| RejectReason::LanguageMismatch { detected })?;

        self.authors
            .check_blacklist(self.ledger.as_ref(), &candidate.author)
            .await?;
        if self.authors.is_whitelisted(&candidate.author) {
            debug!(author = %candidate.author, "Whitelisted, skipping remaining stages");
            return Ok(());
        }

        self.content.check_length(&plain)?;
        self.content.check_tag_count(candidate)?;

        self.check_author_account(&candidate.author, now).await
    }

    async fn run_author_stages(&self, author: &str, now: DateTime<Utc>) -> StageResult {
        self.authors
            .check_blacklist(self.ledger.as_ref(), author)
            .await?;
        if self.authors.is_whitelisted(author) {
            return Ok(());
        }
        self.check_author_account(author, now).await
    }

    async fn check_author_account(&self, author: &str, now: DateTime<Utc>) -> StageResult {
        let ledger = self.ledger.as_ref();
        self.authors
            .check_metrics(ledger, self.cross_reference.as_deref(), author, now)
            .await?;
        self.wallet.check(ledger, author).await?;
        self.authors.check_followers(ledger, author, now).await
    }

    /// A patch marker in the body, or a creation time that differs from the
    /// event's (the operation re-targets an older post).
    async fn check_edit(&self, candidate: &Candidate) -> StageResult {
        if has_patch_marker(&candidate.body) {
            return Err(RejectReason::EditedPost);
        }

        match self
            .ledger
            .get_content(&candidate.author, &candidate.permlink)
            .await
        {
            Ok(content) if content.created.timestamp() != candidate.timestamp.timestamp() => {
                Err(RejectReason::EditedPost)
            }
            Ok(_) => Ok(()),
            // Node has not indexed the post yet
            Err(LedgerError::NotFound(_)) => Ok(()),
            Err(e) => lookup("edit", Err(e)),
        }
    }
}
