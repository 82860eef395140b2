//! Publishing: one parent curation post plus one reply per curated article.
//!
//! Epistemic foundation:
//! - K_i: Every publication's beneficiary table comes from the allocator and sums to `total`
//! - K_i: A reply never claims more weight or slots than the parent post
//! - B_i: The publisher accepts the post (might fail) → bounded retry, then abort
//! - I^B: Delegator draws are random → the sampler is seedable for tests

use crate::models::{BlogConfig, Candidate, PostRef, PublishConfig, PublishError, Result};
use crate::pipeline::VoteScheduler;
use crate::rewards::{
    BeneficiaryAllocator, BeneficiaryEntry, BeneficiaryRole, WeightedParticipant, WeightedSampler,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const APP_NAME: &str = "curator/0.1";
const SUFFIX_LEN: usize = 10;

/// An article that passed screening and the AI review.
#[derive(Debug, Clone)]
pub struct CuratedArticle {
    pub candidate: Candidate,
    /// Cleaned review text
    pub review: String,
    /// Model that wrote the review
    pub model: String,
}

/// Payout options attached to every publication.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentOptions {
    pub max_accepted_payout: String,
    pub percent_steem_dollars: u16,
    pub allow_votes: bool,
    pub allow_curation_rewards: bool,
}

impl Default for CommentOptions {
    fn default() -> Self {
        Self {
            max_accepted_payout: "1000000.000 SBD".to_string(),
            percent_steem_dollars: 0,
            allow_votes: true,
            allow_curation_rewards: true,
        }
    }
}

/// A post or reply ready to hand to a [`Publisher`].
#[derive(Debug, Clone, Serialize)]
pub struct Publication {
    pub author: String,
    pub permlink: String,
    /// Empty for the parent post
    pub parent_author: String,
    pub parent_permlink: String,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub json_metadata: Value,
    pub beneficiaries: Vec<BeneficiaryEntry>,
    pub options: CommentOptions,
}

impl Publication {
    pub fn post_ref(&self) -> PostRef {
        PostRef::new(&self.author, &self.permlink)
    }

    pub fn is_reply(&self) -> bool {
        !self.parent_author.is_empty()
    }
}

/// Where publications and votes go.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn post(&self, publication: &Publication) -> std::result::Result<(), PublishError>;

    async fn vote(
        &self,
        target: &PostRef,
        weight: u16,
        voter: &str,
    ) -> std::result::Result<(), PublishError>;
}

/// Writes each publication as pretty JSON into a directory and logs votes.
pub struct DryRunPublisher {
    output_dir: PathBuf,
}

impl DryRunPublisher {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn path_for(&self, permlink: &str) -> PathBuf {
        self.output_dir.join(format!("{permlink}.json"))
    }
}

#[async_trait]
impl Publisher for DryRunPublisher {
    async fn post(&self, publication: &Publication) -> std::result::Result<(), PublishError> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| PublishError::Write {
            path: self.output_dir.clone(),
            source: e,
        })?;

        let path = self.path_for(&publication.permlink);
        let json = serde_json::to_string_pretty(publication)?;
        std::fs::write(&path, json).map_err(|e| PublishError::Write {
            path: path.clone(),
            source: e,
        })?;

        info!(
            permlink = %publication.permlink,
            path = %path.display(),
            beneficiaries = publication.beneficiaries.len(),
            "Publication written"
        );
        Ok(())
    }

    async fn vote(
        &self,
        target: &PostRef,
        weight: u16,
        voter: &str,
    ) -> std::result::Result<(), PublishError> {
        info!(target = %target, weight, voter, "Dry-run vote");
        Ok(())
    }
}

/// Lays out the parent post and its replies, beneficiaries included.
pub struct PostPlanner<R: Rng> {
    blog: BlogConfig,
    allocator: BeneficiaryAllocator,
    rng: R,
}

impl PostPlanner<ChaCha20Rng> {
    pub fn from_config(blog: &BlogConfig) -> Self {
        Self::new(blog.clone(), ChaCha20Rng::from_entropy())
    }

    /// Deterministic planner for reproducible draws.
    pub fn seeded(blog: &BlogConfig, seed: u64) -> Self {
        Self::new(blog.clone(), ChaCha20Rng::seed_from_u64(seed))
    }
}

impl<R: Rng> PostPlanner<R> {
    pub fn new(blog: BlogConfig, rng: R) -> Self {
        let allocator = BeneficiaryAllocator::from_config(&blog);
        Self {
            blog,
            allocator,
            rng,
        }
    }

    /// Parent post first, then one reply per article in batch order.
    pub fn plan(
        &mut self,
        articles: &[CuratedArticle],
        delegators: &[WeightedParticipant],
        models_used: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<Publication>> {
        let parent = self.parent(articles, delegators, models_used, now)?;
        let mut publications = Vec::with_capacity(articles.len() + 1);

        for (index, article) in articles.iter().enumerate() {
            let reply = self.reply(&parent, index, article, delegators)?;
            publications.push(reply);
        }
        publications.insert(0, parent);

        Ok(publications)
    }

    fn parent(
        &mut self,
        articles: &[CuratedArticle],
        delegators: &[WeightedParticipant],
        models_used: &[String],
        now: DateTime<Utc>,
    ) -> Result<Publication> {
        let drawn = self.draw(delegators, self.blog.delegators_per_post)?;

        let mut members = vec![(self.blog.account.clone(), BeneficiaryRole::Operator)];
        members.extend(
            articles
                .iter()
                .map(|a| (a.candidate.author.clone(), BeneficiaryRole::Author)),
        );
        members.extend(drawn.into_iter().map(|d| (d, BeneficiaryRole::Delegator)));
        let beneficiaries = self.allocator.allocate(&members)?;

        let mut body = String::new();
        for (index, article) in articles.iter().enumerate() {
            let candidate = &article.candidate;
            let _ = write!(
                body,
                "### Post number {} - [{}]({})\nAuthor: @{}\n\n{}\n\n---\n\n",
                index + 1,
                display_title(&candidate.title),
                self.article_link(candidate),
                candidate.author,
                article.review,
            );
        }
        body.push_str(&self.footer(models_used, &beneficiaries, &members));

        let suffix = self.suffix();
        Ok(Publication {
            author: self.blog.account.clone(),
            permlink: format!("{}-{}", slug(&self.blog.title_prefix), suffix),
            parent_author: String::new(),
            parent_permlink: self
                .blog
                .tags
                .first()
                .cloned()
                .unwrap_or_else(|| "curation".to_string()),
            title: format!("{} | {}", self.blog.title_prefix, now.format("%Y-%m-%d")),
            body,
            tags: self.blog.tags.clone(),
            json_metadata: self.metadata(),
            beneficiaries,
            options: CommentOptions::default(),
        })
    }

    /// Each reply pays one author, so the author's weight scales with the
    /// batch cap and the freed author slots go to extra delegators sharing
    /// the parent's delegator budget.
    fn reply(
        &mut self,
        parent: &Publication,
        index: usize,
        article: &CuratedArticle,
        delegators: &[WeightedParticipant],
    ) -> Result<Publication> {
        let weights = self.allocator.weights();
        let freed_slots = self.blog.batch_size.saturating_sub(1);
        let wanted = self.blog.delegators_per_post + freed_slots;
        let drawn = self.draw(delegators, wanted)?;

        let author_weight = weights.author.saturating_mul(self.blog.batch_size as u32);
        let mut allocator = self.allocator.with_author_weight(author_weight);
        if !drawn.is_empty() {
            let budget = self.blog.delegators_per_post as u64 * u64::from(weights.delegator);
            let adjusted = budget / drawn.len() as u64;
            allocator = allocator.with_delegator_weight(adjusted as u32);
        }

        let candidate = &article.candidate;
        let mut members = vec![
            (self.blog.account.clone(), BeneficiaryRole::Operator),
            (candidate.author.clone(), BeneficiaryRole::Author),
        ];
        members.extend(drawn.into_iter().map(|d| (d, BeneficiaryRole::Delegator)));
        let beneficiaries = allocator.allocate(&members)?;

        let mut body = String::new();
        let _ = write!(
            body,
            "| # | Title | Author |\n| --- | --- | --- |\n| {} | [{}]({}) | @{} |\n\n{}\n\n",
            index + 1,
            display_title(&candidate.title),
            self.article_link(candidate),
            candidate.author,
            article.review,
        );
        body.push_str(&self.footer(
            std::slice::from_ref(&article.model),
            &beneficiaries,
            &members,
        ));

        let suffix = self.suffix();
        Ok(Publication {
            author: self.blog.account.clone(),
            permlink: reply_permlink(&parent.author, &parent.permlink, &suffix),
            parent_author: parent.author.clone(),
            parent_permlink: parent.permlink.clone(),
            title: String::new(),
            body,
            tags: self.blog.tags.clone(),
            json_metadata: self.metadata(),
            beneficiaries,
            options: CommentOptions::default(),
        })
    }

    fn draw(&mut self, delegators: &[WeightedParticipant], k: usize) -> Result<Vec<String>> {
        if delegators.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        Ok(WeightedSampler::new(&mut self.rng).draw_k(delegators, k)?)
    }

    fn suffix(&mut self) -> String {
        (0..SUFFIX_LEN)
            .map(|_| char::from(self.rng.gen_range(b'a'..=b'z')))
            .collect()
    }

    fn metadata(&self) -> Value {
        json!({
            "app": APP_NAME,
            "format": "markdown",
            "tags": self.blog.tags,
        })
    }

    fn article_link(&self, candidate: &Candidate) -> String {
        format!(
            "{}/@{}/{}",
            self.blog.frontend_url.trim_end_matches('/'),
            candidate.author,
            candidate.permlink
        )
    }

    fn footer(
        &self,
        models_used: &[String],
        beneficiaries: &[BeneficiaryEntry],
        members: &[(String, BeneficiaryRole)],
    ) -> String {
        let mut footer = String::from("\n---\n\n");
        if !models_used.is_empty() {
            let _ = writeln!(footer, "AI models: {}\n", models_used.join(", "));
        }

        footer.push_str("| Beneficiary | Role | Share |\n| --- | --- | --- |\n");
        for entry in beneficiaries {
            let _ = writeln!(
                footer,
                "| @{} | {} | {} |",
                entry.account,
                roles_of(&entry.account, members, self.allocator.burn_account()),
                basis_points(entry.weight),
            );
        }

        let operator = self
            .blog
            .operator_name
            .as_deref()
            .unwrap_or(&self.blog.account);
        let _ = write!(footer, "\nThis curator is operated by {operator}.\n");
        footer
    }
}

/// Publishes a planned batch with bounded retries per publication.
pub struct PublishStep {
    publisher: Arc<dyn Publisher>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl PublishStep {
    pub fn new(publisher: Arc<dyn Publisher>, config: &PublishConfig) -> Self {
        Self {
            publisher,
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        }
    }

    pub fn publisher(&self) -> Arc<dyn Publisher> {
        Arc::clone(&self.publisher)
    }

    /// Post every publication in order, handing each posted reply to `votes`
    /// right away. Any exhausted publication aborts the batch; the ones
    /// already posted stay posted and keep their scheduled votes.
    pub async fn publish_all(
        &self,
        publications: &[Publication],
        mut votes: Option<&mut VoteScheduler>,
    ) -> std::result::Result<Vec<PostRef>, PublishError> {
        let mut posted = Vec::with_capacity(publications.len());
        for publication in publications {
            self.publish(publication).await?;
            let target = publication.post_ref();
            if let Some(votes) = votes.as_deref_mut().filter(|_| publication.is_reply()) {
                votes.schedule(target.clone());
            }
            posted.push(target);
        }
        Ok(posted)
    }

    pub async fn publish(&self, publication: &Publication) -> std::result::Result<(), PublishError> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match self.publisher.post(publication).await {
                Ok(()) => {
                    info!(
                        post = %publication.post_ref(),
                        reply = publication.is_reply(),
                        attempt,
                        "Published"
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        permlink = %publication.permlink,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Publish attempt failed"
                    );
                    last_error = e.to_string();
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(PublishError::Exhausted {
            permlink: publication.permlink.clone(),
            attempts: self.max_attempts,
            last_error,
        })
    }
}

/// `re-<parent author>-<parent permlink>-<suffix>`, with the author made
/// permlink-safe.
pub fn reply_permlink(parent_author: &str, parent_permlink: &str, suffix: &str) -> String {
    let author = parent_author
        .trim_start_matches('@')
        .replace('.', "-")
        .to_lowercase();
    format!("re-{author}-{parent_permlink}-{suffix}")
}

fn slug(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "curation".to_string()
    } else {
        slug.to_string()
    }
}

fn display_title(title: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        "(untitled)".to_string()
    } else {
        title.replace(['[', ']', '|'], "")
    }
}

fn roles_of(account: &str, members: &[(String, BeneficiaryRole)], burn: &str) -> String {
    let mut roles: Vec<&str> = Vec::new();
    for (member, role) in members {
        if member == account && !roles.contains(&role.as_str()) {
            roles.push(role.as_str());
        }
    }
    if account == burn && roles.is_empty() {
        roles.push(BeneficiaryRole::BurnSink.as_str());
    }
    roles.join("+")
}

/// `1234` → `12.34%`.
fn basis_points(weight: u32) -> String {
    format!("{}.{:02}%", weight / 100, weight % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RoleWeights, Vests};
    use crate::rewards::total_weight;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn blog() -> BlogConfig {
        let toml = r#"
account = "curator"
batch_size = 2
delegators_per_post = 1
tags = ["curation", "ai"]
title_prefix = "Curated Reading"
"#;
        let mut blog: BlogConfig = toml::from_str(toml).unwrap();
        blog.weights = RoleWeights {
            operator: 500,
            author: 500,
            delegator: 100,
        };
        blog
    }

    fn article(author: &str, permlink: &str) -> CuratedArticle {
        CuratedArticle {
            candidate: Candidate {
                author: author.to_string(),
                permlink: permlink.to_string(),
                title: format!("A post by {author}"),
                body: "body".to_string(),
                tags: vec!["life".to_string()],
                timestamp: Utc::now(),
                position: 1,
            },
            review: format!("Review of {author}"),
            model: "model-a".to_string(),
        }
    }

    fn delegators() -> Vec<WeightedParticipant> {
        vec![
            WeightedParticipant::new("dan", Vests::from_whole(100)),
            WeightedParticipant::new("erin", Vests::from_whole(50)),
            WeightedParticipant::new("fay", Vests::from_whole(10)),
        ]
    }

    fn weight_of(publication: &Publication, account: &str) -> Option<u32> {
        publication
            .beneficiaries
            .iter()
            .find(|e| e.account == account)
            .map(|e| e.weight)
    }

    #[test]
    fn test_parent_and_reply_layout() {
        let mut planner = PostPlanner::seeded(&blog(), 7);
        let articles = vec![article("alice", "first"), article("bob", "second")];
        let plan = planner
            .plan(&articles, &delegators(), &["model-a".to_string()], Utc::now())
            .unwrap();

        assert_eq!(plan.len(), 3);
        let parent = &plan[0];
        assert!(!parent.is_reply());
        assert_eq!(parent.parent_permlink, "curation");
        assert!(parent.permlink.starts_with("curated-reading-"));
        assert!(parent.body.contains("Post number 1"));
        assert!(parent.body.contains("Review of bob"));
        assert!(parent.body.contains("AI models: model-a"));
        assert!(parent.body.contains("operated by curator"));
        assert_eq!(weight_of(parent, "curator"), Some(500));
        assert_eq!(weight_of(parent, "alice"), Some(500));
        assert_eq!(weight_of(parent, "bob"), Some(500));
        assert_eq!(total_weight(&parent.beneficiaries), 10_000);

        // one delegator at 100 basis points
        let delegator_total: u32 = parent
            .beneficiaries
            .iter()
            .filter(|e| ["dan", "erin", "fay"].contains(&e.account.as_str()))
            .map(|e| e.weight)
            .sum();
        assert_eq!(delegator_total, 100);

        for reply in &plan[1..] {
            assert!(reply.is_reply());
            assert_eq!(reply.parent_author, "curator");
            assert_eq!(reply.parent_permlink, parent.permlink);
            assert!(reply.title.is_empty());
            assert_eq!(total_weight(&reply.beneficiaries), 10_000);
        }
    }

    #[test]
    fn test_reply_weights_scale_with_batch() {
        let mut planner = PostPlanner::seeded(&blog(), 11);
        let articles = vec![article("alice", "first"), article("bob", "second")];
        let plan = planner
            .plan(&articles, &delegators(), &[], Utc::now())
            .unwrap();
        let reply = &plan[1];

        // author weight × batch cap of 2
        assert_eq!(weight_of(reply, "alice"), Some(1000));
        assert_eq!(weight_of(reply, "bob"), None);

        // 1 + 1 freed slot = 2 delegators sharing 1 × 100: 50 each
        let delegator_weights: Vec<u32> = reply
            .beneficiaries
            .iter()
            .filter(|e| ["dan", "erin", "fay"].contains(&e.account.as_str()))
            .map(|e| e.weight)
            .collect();
        assert_eq!(delegator_weights, vec![50, 50]);
        assert_eq!(weight_of(reply, "null"), Some(10_000 - 500 - 1000 - 100));
    }

    #[test]
    fn test_no_delegators_sends_remainder_to_burn() {
        let mut planner = PostPlanner::seeded(&blog(), 3);
        let plan = planner
            .plan(&[article("alice", "first")], &[], &[], Utc::now())
            .unwrap();
        let reply = &plan[1];
        assert_eq!(reply.beneficiaries.len(), 3);
        assert_eq!(weight_of(reply, "null"), Some(10_000 - 500 - 1000));
    }

    #[test]
    fn test_seeded_planner_is_reproducible() {
        let articles = vec![article("alice", "first")];
        let a = PostPlanner::seeded(&blog(), 99)
            .plan(&articles, &delegators(), &[], Utc::now())
            .unwrap();
        let b = PostPlanner::seeded(&blog(), 99)
            .plan(&articles, &delegators(), &[], Utc::now())
            .unwrap();
        assert_eq!(a[0].permlink, b[0].permlink);
        assert_eq!(a[1].beneficiaries, b[1].beneficiaries);
    }

    #[test]
    fn test_reply_permlink_sanitizes_author() {
        assert_eq!(
            reply_permlink("@Cur.ator", "daily-pick", "abcdefghij"),
            "re-cur-ator-daily-pick-abcdefghij"
        );
    }

    #[test]
    fn test_footer_helpers() {
        assert_eq!(basis_points(500), "5.00%");
        assert_eq!(basis_points(8925), "89.25%");
        assert_eq!(slug("Curated Reading: Week #3"), "curated-reading-week-3");
        assert_eq!(slug("!!!"), "curation");

        let members = vec![
            ("curator".to_string(), BeneficiaryRole::Operator),
            ("alice".to_string(), BeneficiaryRole::Author),
            ("alice".to_string(), BeneficiaryRole::Delegator),
        ];
        assert_eq!(roles_of("alice", &members, "null"), "author+delegator");
        assert_eq!(roles_of("null", &members, "null"), "burn");
    }

    #[tokio::test]
    async fn test_dry_run_writes_json() {
        let dir = TempDir::new().unwrap();
        let publisher = DryRunPublisher::new(dir.path().join("out"));
        let mut planner = PostPlanner::seeded(&blog(), 5);
        let plan = planner
            .plan(&[article("alice", "first")], &delegators(), &[], Utc::now())
            .unwrap();

        publisher.post(&plan[0]).await.unwrap();
        let written = std::fs::read_to_string(
            publisher
                .output_dir()
                .join(format!("{}.json", plan[0].permlink)),
        )
        .unwrap();
        let value: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["author"], "curator");
        assert_eq!(value["json_metadata"]["app"], APP_NAME);
        assert_eq!(value["options"]["max_accepted_payout"], "1000000.000 SBD");
        assert!(value["beneficiaries"].as_array().unwrap().len() >= 3);
    }

    /// Fails the first `failures` posts, then records the rest.
    struct FlakyPublisher {
        failures: Mutex<u32>,
        posted: Mutex<Vec<String>>,
    }

    impl FlakyPublisher {
        fn new(failures: u32) -> Self {
            Self {
                failures: Mutex::new(failures),
                posted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Publisher for FlakyPublisher {
        async fn post(&self, publication: &Publication) -> std::result::Result<(), PublishError> {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(PublishError::Rejected {
                    permlink: publication.permlink.clone(),
                    message: "node busy".to_string(),
                });
            }
            self.posted.lock().unwrap().push(publication.permlink.clone());
            Ok(())
        }

        async fn vote(
            &self,
            _target: &PostRef,
            _weight: u16,
            _voter: &str,
        ) -> std::result::Result<(), PublishError> {
            Ok(())
        }
    }

    fn publish_config(max_attempts: u32) -> PublishConfig {
        PublishConfig {
            max_attempts,
            retry_delay_secs: 60,
            ..PublishConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_retries_then_succeeds() {
        let publisher = Arc::new(FlakyPublisher::new(2));
        let step = PublishStep::new(publisher.clone(), &publish_config(3));
        let plan = PostPlanner::seeded(&blog(), 1)
            .plan(&[article("alice", "first")], &[], &[], Utc::now())
            .unwrap();

        let posted = step.publish_all(&plan, None).await.unwrap();
        assert_eq!(posted.len(), 2);
        assert_eq!(publisher.posted.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_exhausts_attempts() {
        let publisher = Arc::new(FlakyPublisher::new(10));
        let step = PublishStep::new(publisher.clone(), &publish_config(3));
        let plan = PostPlanner::seeded(&blog(), 1)
            .plan(&[article("alice", "first")], &[], &[], Utc::now())
            .unwrap();

        match step.publish_all(&plan, None).await {
            Err(PublishError::Exhausted {
                attempts,
                last_error,
                ..
            }) => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("node busy"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(publisher.posted.lock().unwrap().is_empty());
    }
}
