//! The curation loop: feed → screening → evaluation → publish → vote.
//!
//! Pipeline flow:
//! Feed events → ScreeningPipeline → Evaluator → CuratedArticle batch →
//! PostPlanner → PublishStep → VoteScheduler
//!
//! Candidates are handled one at a time, in feed order. The cursor moves past
//! every event once it has been handled, whatever the outcome.

use crate::checkpoint::StreamCursor;
use crate::client::{Classification, Evaluator, RetryPolicy};
use crate::ledger::{DelegatorSource, Feed};
use crate::models::{Config, CuratorError, FeedConfig, FeedEvent, LedgerError, Result, VoteConfig};
use crate::pipeline::{CuratedArticle, PostPlanner, PublishStep, Publisher, VoteScheduler};
use crate::screening::{RejectReason, ScreeningPipeline, ScreeningVerdict};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use rand_chacha::ChaCha20Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Counters for one run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub events_seen: u64,
    pub non_comments: u64,
    pub replies_skipped: u64,
    pub screened_out: u64,
    /// Screening rejections by reason code
    pub reject_reasons: BTreeMap<&'static str, u64>,
    pub evaluated: u64,
    pub curated: u64,
    pub ai_rejected: u64,
    pub ai_errors: u64,
    pub published: u64,
    pub votes_cast: u64,
    pub runtime_secs: f64,
}

impl RunStats {
    pub fn record_rejection(&mut self, reason: &RejectReason) {
        self.screened_out += 1;
        *self.reject_reasons.entry(reason.code()).or_default() += 1;
    }

    /// Share of evaluated candidates the model curated.
    pub fn curation_rate(&self) -> f64 {
        if self.evaluated == 0 {
            0.0
        } else {
            self.curated as f64 / self.evaluated as f64
        }
    }

    pub fn log(&self) {
        info!(
            events = self.events_seen,
            non_comments = self.non_comments,
            replies = self.replies_skipped,
            screened_out = self.screened_out,
            reasons = ?self.reject_reasons,
            evaluated = self.evaluated,
            curated = self.curated,
            ai_rejected = self.ai_rejected,
            ai_errors = self.ai_errors,
            curation_rate = format!("{:.1}%", self.curation_rate() * 100.0),
            published = self.published,
            votes = self.votes_cast,
            runtime = format!("{:.1}s", self.runtime_secs),
            "Curation run complete"
        );
    }
}

/// Drives every component over the feed for one batch.
pub struct CurationLoop {
    feed: Box<dyn Feed>,
    cursor: StreamCursor,
    screening: ScreeningPipeline,
    evaluator: Box<dyn Evaluator>,
    delegators: Arc<dyn DelegatorSource>,
    planner: PostPlanner<ChaCha20Rng>,
    publishing: PublishStep,
    feed_config: FeedConfig,
    feed_policy: RetryPolicy,
    vote_config: VoteConfig,
    operator: String,
    batch_size: usize,
    show_progress: bool,
}

impl CurationLoop {
    pub fn new(
        config: &Config,
        feed: Box<dyn Feed>,
        cursor: StreamCursor,
        screening: ScreeningPipeline,
        evaluator: Box<dyn Evaluator>,
        delegators: Arc<dyn DelegatorSource>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let feed_policy = RetryPolicy {
            max_retries: config.feed.max_retries,
            base: Duration::from_millis(config.feed.retry_delay_ms),
            growth: 2.0,
            jitter_factor: 0.0,
        };

        Self {
            feed,
            cursor,
            screening,
            evaluator,
            delegators,
            planner: PostPlanner::from_config(&config.blog),
            publishing: PublishStep::new(publisher, &config.publish),
            feed_config: config.feed.clone(),
            feed_policy,
            vote_config: config.vote.clone(),
            operator: config.blog.account.clone(),
            batch_size: config.blog.batch_size,
            show_progress: true,
        }
    }

    /// Replace the planner (tests seed it).
    pub fn with_planner(mut self, planner: PostPlanner<ChaCha20Rng>) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn cursor(&self) -> &StreamCursor {
        &self.cursor
    }

    /// Collect a batch, publish it, then wait for the votes.
    pub async fn run(&mut self) -> Result<RunStats> {
        let start = Instant::now();
        let mut stats = RunStats::default();

        let articles = self.collect(&mut stats).await?;
        if articles.is_empty() {
            info!("Nothing curated, skipping publication");
        } else {
            self.publish(&articles, &mut stats).await?;
        }

        stats.runtime_secs = start.elapsed().as_secs_f64();
        stats.log();
        Ok(stats)
    }

    /// Read events until the batch is full or the feed ends.
    pub async fn collect(&mut self, stats: &mut RunStats) -> Result<Vec<CuratedArticle>> {
        let start = match (self.cursor.position(), self.feed_config.start_position) {
            (Some(position), _) | (None, Some(position)) => position,
            (None, None) => self.head_position().await?,
        };
        self.feed.seek(start).await?;
        let mut skip = match self.cursor.position() {
            Some(position) if position == start => self.cursor.handled(),
            _ => 0,
        };

        info!(
            start,
            skip,
            stop = ?self.feed_config.stop_position,
            batch_size = self.batch_size,
            "Starting curation loop"
        );

        let pb = self.progress_bar();
        let mut articles = Vec::with_capacity(self.batch_size);

        while articles.len() < self.batch_size {
            if self.past_stop() {
                info!(position = ?self.cursor.position(), "Stop position reached");
                break;
            }

            let Some(event) = self.next_event().await? else {
                info!("Feed exhausted");
                break;
            };
            if self
                .feed_config
                .stop_position
                .is_some_and(|stop| event.position > stop)
            {
                info!(position = event.position, "Stop position reached");
                break;
            }
            if skip > 0 && event.position == start {
                skip -= 1;
                debug!(position = event.position, "Skipping event handled by an earlier run");
                continue;
            }

            stats.events_seen += 1;
            if let Some(article) = self.process(&event, stats).await {
                articles.push(article);
                pb.inc(1);
            }
            self.cursor.record(&event)?;

            pb.set_message(format!(
                "seen: {}, screened out: {}, evaluated: {}",
                stats.events_seen, stats.screened_out, stats.evaluated
            ));
        }

        pb.finish_with_message(format!(
            "Done! {} curated from {} events",
            articles.len(),
            stats.events_seen
        ));
        Ok(articles)
    }

    async fn process(&mut self, event: &FeedEvent, stats: &mut RunStats) -> Option<CuratedArticle> {
        if !event.is_comment() {
            stats.non_comments += 1;
            return None;
        }
        if event.is_reply() {
            stats.replies_skipped += 1;
            return None;
        }

        let candidate = event.to_candidate();
        if let ScreeningVerdict::Reject(reason) = self.screening.screen(&candidate).await {
            info!(
                author = %candidate.author,
                permlink = %candidate.permlink,
                reason = reason.code(),
                detail = %reason,
                "Candidate screened out"
            );
            stats.record_rejection(&reason);
            return None;
        }

        stats.evaluated += 1;
        let article = self.screening.plain_text(&candidate.body);
        let response = self.evaluator.evaluate(&article).await;

        match response.classification {
            Classification::Curated(review) => {
                stats.curated += 1;
                info!(
                    author = %candidate.author,
                    permlink = %candidate.permlink,
                    model = %response.model,
                    "Curated"
                );
                Some(CuratedArticle {
                    candidate,
                    review,
                    model: response.model,
                })
            }
            Classification::Rejected => {
                stats.ai_rejected += 1;
                info!(
                    author = %candidate.author,
                    permlink = %candidate.permlink,
                    model = %response.model,
                    "Model declined to curate"
                );
                None
            }
            other => {
                stats.ai_errors += 1;
                warn!(
                    author = %candidate.author,
                    permlink = %candidate.permlink,
                    model = %response.model,
                    outcome = ?other,
                    "Evaluation failed, skipping"
                );
                None
            }
        }
    }

    async fn publish(&mut self, articles: &[CuratedArticle], stats: &mut RunStats) -> Result<()> {
        let delegators = match self.delegators.incoming_delegations(&self.operator).await {
            Ok(delegators) => delegators,
            Err(e) => {
                warn!(error = %e, "Delegator lookup failed, publishing without delegators");
                Vec::new()
            }
        };
        debug!(count = delegators.len(), "Delegators loaded");

        let models = self.evaluator.models_used();
        let publications = self
            .planner
            .plan(articles, &delegators, &models, Utc::now())?;

        let mut votes = self.vote_config.enabled.then(|| {
            VoteScheduler::new(
                self.publishing.publisher(),
                self.operator.clone(),
                self.vote_config.clone(),
            )
        });
        let published = self
            .publishing
            .publish_all(&publications, votes.as_mut())
            .await;

        if let Some(votes) = votes {
            let outcomes = votes.shutdown().await;
            stats.votes_cast = outcomes.iter().filter(|o| o.is_voted()).count() as u64;
        }
        stats.published = published?.len() as u64;
        Ok(())
    }

    fn past_stop(&self) -> bool {
        match (self.feed_config.stop_position, self.cursor.position()) {
            (Some(stop), Some(position)) => position > stop,
            _ => false,
        }
    }

    async fn head_position(&mut self) -> Result<u64> {
        let mut attempt = 0;
        loop {
            match self.feed.head_position().await {
                Ok(head) => return Ok(head),
                Err(e) => self.feed_backoff(&mut attempt, e).await?,
            }
        }
    }

    async fn next_event(&mut self) -> Result<Option<FeedEvent>> {
        let mut attempt = 0;
        loop {
            match self.feed.next_event().await {
                Ok(event) => return Ok(event),
                Err(e) => self.feed_backoff(&mut attempt, e).await?,
            }
        }
    }

    /// Sleep before the next feed read, or give up.
    async fn feed_backoff(&self, attempt: &mut u32, error: LedgerError) -> Result<()> {
        if !error.is_transient() {
            return Err(error.into());
        }
        if !self.feed_policy.allows_retry(*attempt) {
            return Err(CuratorError::FeedExhausted {
                attempts: *attempt + 1,
                last_error: error.to_string(),
            });
        }

        let (delay, _) = self.feed_policy.delay_bounds(*attempt);
        warn!(
            attempt = *attempt + 1,
            max_retries = self.feed_policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Feed read failed, retrying"
        );
        *attempt += 1;
        tokio::time::sleep(delay).await;
        Ok(())
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(self.batch_size as u64);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
        pb.set_style(style);
        pb
    }
}
