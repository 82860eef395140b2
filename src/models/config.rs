//! Configuration models for curator.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! The config is loaded once at startup and passed by reference into each
//! component's constructor.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for curator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// LLM endpoint, model roster and prompts
    pub llm: LlmConfig,

    /// Backoff policy for AI requests
    #[serde(default)]
    pub retry: RetryConfig,

    /// Feed source and cursor location
    #[serde(default)]
    pub feed: FeedConfig,

    /// Ledger node and auxiliary API endpoints
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Content screening thresholds
    #[serde(default)]
    pub content: ContentConfig,

    /// Author screening thresholds
    #[serde(default)]
    pub author: AuthorConfig,

    /// Wallet screening thresholds
    #[serde(default)]
    pub wallet: WalletConfig,

    /// Curation post layout and beneficiary weights
    pub blog: BlogConfig,

    /// Publisher settings
    #[serde(default)]
    pub publish: PublishConfig,

    /// Background voting
    #[serde(default)]
    pub vote: VoteConfig,
}

/// LLM provider configuration.
///
/// K_i: The endpoint speaks the OpenAI chat-completions schema; the URL is the
/// full completions URL and its prefix selects the provider profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Full chat-completions URL
    pub url: String,

    /// API key (can also be set via the env var named by `api_key_env`)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Ordered model roster, tried in sequence on rate limiting
    pub models: Vec<String>,

    /// Path to the system prompt file
    pub system_prompt: PathBuf,

    /// Path to the curation (user) prompt file
    pub curation_prompt: PathBuf,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_top_p")]
    pub top_p: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_stop_sequences")]
    pub stop_sequences: Vec<String>,

    /// Marker the model emits to disqualify an article
    #[serde(default = "default_reject_marker")]
    pub reject_marker: String,

    /// Cleaned responses shorter than this are treated as failures
    #[serde(default = "default_min_response_chars")]
    pub min_response_chars: usize,
}

fn default_api_key_env() -> String {
    "LLM_API_KEY".to_string()
}

fn default_timeout() -> u64 {
    180
}

fn default_temperature() -> f64 {
    0.3
}

fn default_top_p() -> f64 {
    0.85
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_stop_sequences() -> Vec<String> {
    vec![
        "END_OF_CURATION_REPORT".to_string(),
        "DO NOT CURATE".to_string(),
    ]
}

fn default_reject_marker() -> String {
    "DO NOT CURATE".to_string()
}

fn default_min_response_chars() -> usize {
    100
}

/// Backoff for AI requests: `base * growth^attempt` plus up to
/// `jitter_factor` of that as uniform jitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt, per model
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_growth")]
    pub growth: f64,

    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_growth() -> f64 {
    2.0
}

fn default_jitter_factor() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            growth: default_growth(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

/// Where feed events come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    /// Live ledger node, block by block
    #[default]
    Rpc,
    /// Recorded JSONL events
    Replay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub source: FeedSource,

    /// JSONL file of recorded events (replay source only)
    #[serde(default)]
    pub replay_path: Option<PathBuf>,

    /// Text file holding the next position to resume from
    #[serde(default = "default_cursor_path")]
    pub cursor_path: PathBuf,

    /// Position to start from when no cursor exists (default: head block)
    #[serde(default)]
    pub start_position: Option<u64>,

    /// Stop once this position is reached, even if the batch is not full
    #[serde(default)]
    pub stop_position: Option<u64>,

    /// Delay between head polls when the feed is caught up
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Consecutive failed reads tolerated before the run aborts
    #[serde(default = "default_feed_retries")]
    pub max_retries: u32,

    #[serde(default = "default_feed_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_cursor_path() -> PathBuf {
    PathBuf::from("state/cursor.txt")
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_feed_retries() -> u32 {
    5
}

fn default_feed_retry_delay_ms() -> u64 {
    1000
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            source: FeedSource::default(),
            replay_path: None,
            cursor_path: default_cursor_path(),
            start_position: None,
            stop_position: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_retries: default_feed_retries(),
            retry_delay_ms: default_feed_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// JSON-RPC node for the curated chain
    #[serde(default = "default_node")]
    pub node: String,

    /// JSON-RPC node for the cross-reference chain (activity lookups)
    #[serde(default)]
    pub cross_reference_node: Option<String>,

    /// Incoming-delegation API base URL; the account name is appended
    #[serde(default = "default_delegation_api")]
    pub delegation_api: String,

    #[serde(default = "default_delegation_page_size")]
    pub delegation_page_size: u32,

    #[serde(default = "default_follower_page_size")]
    pub follower_page_size: u32,

    #[serde(default = "default_ledger_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_ledger_retries")]
    pub max_retries: u32,
}

fn default_node() -> String {
    "https://api.steemit.com".to_string()
}

fn default_delegation_api() -> String {
    "https://sds1.steemworld.org/delegations_api/getIncomingDelegations".to_string()
}

fn default_delegation_page_size() -> u32 {
    100
}

fn default_follower_page_size() -> u32 {
    1000
}

fn default_ledger_timeout() -> u64 {
    30
}

fn default_ledger_retries() -> u32 {
    5
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            node: default_node(),
            cross_reference_node: None,
            delegation_api: default_delegation_api(),
            delegation_page_size: default_delegation_page_size(),
            follower_page_size: default_follower_page_size(),
            timeout_secs: default_ledger_timeout(),
            max_retries: default_ledger_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Minimum word count after formatting removal
    #[serde(default = "default_min_words")]
    pub min_words: usize,

    #[serde(default)]
    pub blacklisted_tags: Vec<String>,

    /// At least one of these must be present (empty: no requirement)
    #[serde(default)]
    pub required_tags: Vec<String>,

    #[serde(default)]
    pub max_tags: Option<usize>,

    /// ISO 639-3 codes accepted for both body and title
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
}

fn default_min_words() -> usize {
    500
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            min_words: default_min_words(),
            blacklisted_tags: Vec::new(),
            required_tags: Vec::new(),
            max_tags: None,
            languages: default_languages(),
        }
    }
}

/// Author thresholds. A zero value disables the corresponding check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorConfig {
    /// Always accepted after the blacklist stage
    #[serde(default)]
    pub whitelist: Vec<String>,

    #[serde(default)]
    pub blacklist: Vec<String>,

    /// Account whose "ignore" follow list acts as a shared blacklist
    #[serde(default)]
    pub registry_account: Option<String>,

    /// Floor on the 25-based reputation score
    #[serde(default)]
    pub min_reputation: f64,

    /// Reject authors idle on this chain for longer than this
    #[serde(default)]
    pub max_inactivity_days: i64,

    /// Reject authors active on the cross-reference chain more recently than this
    #[serde(default)]
    pub min_cross_reference_idle_days: i64,

    #[serde(default)]
    pub min_followers: u32,

    #[serde(default)]
    pub min_followers_per_month: f64,

    #[serde(default)]
    pub min_adjusted_followers_per_month: f64,

    /// Half-life used to discount account age for adjusted growth
    #[serde(default = "default_follower_halflife_years")]
    pub follower_halflife_years: f64,

    #[serde(default)]
    pub min_follower_median_reputation: f64,

    #[serde(default)]
    pub min_active_followers: u32,

    /// A follower counts as active if seen within this many days
    #[serde(default = "default_active_follower_days")]
    pub active_follower_days: i64,
}

fn default_follower_halflife_years() -> f64 {
    1.0
}

fn default_active_follower_days() -> i64 {
    30
}

impl Default for AuthorConfig {
    fn default() -> Self {
        Self {
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            registry_account: None,
            min_reputation: 0.0,
            max_inactivity_days: 0,
            min_cross_reference_idle_days: 0,
            min_followers: 0,
            min_followers_per_month: 0.0,
            min_adjusted_followers_per_month: 0.0,
            follower_halflife_years: default_follower_halflife_years(),
            min_follower_median_reputation: 0.0,
            min_active_followers: 0,
            active_follower_days: default_active_follower_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Ceiling on outgoing delegation as a share of own stake (percent)
    #[serde(default = "default_hundred")]
    pub max_delegation_pct: f64,

    /// Floor on undelegated stake, in liquid-token units
    #[serde(default)]
    pub min_undelegated_sp: f64,

    /// Ceiling on delegation to screened delegatees (percent)
    #[serde(default = "default_hundred")]
    pub max_screened_delegation_pct: f64,

    #[serde(default)]
    pub screened_delegatees: Vec<String>,
}

fn default_hundred() -> f64 {
    100.0
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            max_delegation_pct: default_hundred(),
            min_undelegated_sp: 0.0,
            max_screened_delegation_pct: default_hundred(),
            screened_delegatees: Vec::new(),
        }
    }
}

/// Integer basis-point weight per beneficiary role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleWeights {
    #[serde(default = "default_operator_weight")]
    pub operator: u32,

    #[serde(default = "default_author_weight")]
    pub author: u32,

    #[serde(default = "default_delegator_weight")]
    pub delegator: u32,
}

fn default_operator_weight() -> u32 {
    500
}

fn default_author_weight() -> u32 {
    500
}

fn default_delegator_weight() -> u32 {
    100
}

impl Default for RoleWeights {
    fn default() -> Self {
        Self {
            operator: default_operator_weight(),
            author: default_author_weight(),
            delegator: default_delegator_weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogConfig {
    /// Operator account that publishes and receives delegations
    pub account: String,

    /// Human-readable operator credit shown in post footers
    #[serde(default)]
    pub operator_name: Option<String>,

    /// Curated articles per run
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Delegators drawn into the parent post's beneficiaries
    #[serde(default = "default_delegators_per_post")]
    pub delegators_per_post: usize,

    #[serde(default)]
    pub weights: RoleWeights,

    #[serde(default = "default_total_weight")]
    pub total_weight: u32,

    #[serde(default = "default_burn_account")]
    pub burn_account: String,

    /// Chain limit on beneficiaries per post
    #[serde(default = "default_max_beneficiaries")]
    pub max_beneficiaries: usize,

    #[serde(default = "default_post_tags")]
    pub tags: Vec<String>,

    #[serde(default = "default_title_prefix")]
    pub title_prefix: String,

    /// Web front-end used for article links
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
}

fn default_batch_size() -> usize {
    5
}

fn default_delegators_per_post() -> usize {
    1
}

fn default_total_weight() -> u32 {
    10_000
}

fn default_burn_account() -> String {
    "null".to_string()
}

fn default_max_beneficiaries() -> usize {
    8
}

fn default_post_tags() -> Vec<String> {
    vec!["curation".to_string(), "ai-curation".to_string()]
}

fn default_title_prefix() -> String {
    "Curated Reading".to_string()
}

fn default_frontend_url() -> String {
    "https://steemit.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Directory the dry-run publisher writes into
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_publish_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_publish_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_publish_attempts() -> u32 {
    3
}

fn default_publish_retry_delay() -> u64 {
    60
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_attempts: default_publish_attempts(),
            retry_delay_secs: default_publish_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Wait before the first vote attempt
    #[serde(default = "default_vote_delay")]
    pub delay_secs: u64,

    /// Vote weight in basis points
    #[serde(default = "default_vote_weight")]
    pub weight: u16,

    #[serde(default = "default_vote_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_vote_retry_delay")]
    pub retry_delay_secs: u64,

    /// Base wait after a minimum-vote-interval rejection
    #[serde(default = "default_vote_interval_delay_ms")]
    pub interval_retry_delay_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_vote_delay() -> u64 {
    300
}

fn default_vote_weight() -> u16 {
    10_000
}

fn default_vote_attempts() -> u32 {
    20
}

fn default_vote_retry_delay() -> u64 {
    5
}

fn default_vote_interval_delay_ms() -> u64 {
    3000
}

impl Default for VoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_secs: default_vote_delay(),
            weight: default_vote_weight(),
            max_attempts: default_vote_attempts(),
            retry_delay_secs: default_vote_retry_delay(),
            interval_retry_delay_ms: default_vote_interval_delay_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Resolve the LLM API key from config or environment.
    ///
    /// B_i(api key available) → Result
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = &self.llm.api_key {
            let expanded = expand_env_vars(key);
            // Tolerate trailing comments pasted after the key
            if let Some(first) = expanded.split_whitespace().next() {
                return Ok(first.to_string());
            }
        }

        std::env::var(&self.llm.api_key_env).map_err(|_| ConfigError::MissingApiKey {
            env_var: self.llm.api_key_env.clone(),
        })
    }

    /// Fail-fast consistency checks run before any event is processed.
    ///
    /// A reply never needs more weight or slots than the parent post, so the
    /// parent's layout bounds the beneficiary capacity of the whole batch.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.url.trim().is_empty() {
            return Err(ConfigError::Invalid("llm.url is empty".to_string()));
        }
        if self.llm.models.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::NoModels);
        }
        if self.blog.account.trim().is_empty() {
            return Err(ConfigError::Invalid("blog.account is empty".to_string()));
        }
        if self.blog.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "blog.batch_size must be at least 1".to_string(),
            ));
        }
        if self.content.languages.is_empty() {
            return Err(ConfigError::Invalid(
                "content.languages must name at least one language".to_string(),
            ));
        }
        if self.feed.source == FeedSource::Replay && self.feed.replay_path.is_none() {
            return Err(ConfigError::Invalid(
                "feed.replay_path is required for the replay source".to_string(),
            ));
        }
        crate::rewards::BeneficiaryAllocator::from_config(&self.blog)
            .check_capacity(self.blog.batch_size, self.blog.delegators_per_post)?;
        for prompt in [&self.llm.system_prompt, &self.llm.curation_prompt] {
            if !prompt.exists() {
                return Err(ConfigError::PromptMissing(prompt.clone()));
            }
        }
        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let re = match regex::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };

    re.replace_all(s, |cap: &regex::Captures<'_>| {
        std::env::var(&cap[1]).unwrap_or_else(|_| cap[0].to_string())
    })
    .into_owned()
}

/// Configuration errors.
///
/// Epistemic origin:
/// - B_i falsified: File not found, parse error
/// - I^B materialized: Missing required values
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing LLM API key: set {env_var} env var or llm.api_key in config")]
    MissingApiKey { env_var: String },

    #[error("Model roster is empty")]
    NoModels,

    #[error("Prompt file not found: {0}")]
    PromptMissing(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Beneficiary configuration is inconsistent: {0}")]
    Allocation(#[from] super::AllocationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    const MINIMAL: &str = r#"
[llm]
url = "https://api.arliai.com/v1/chat/completions"
models = ["model-a", "model-b"]
system_prompt = "prompts/system.md"
curation_prompt = "prompts/curation.md"

[blog]
account = "curator-bot"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.llm.models.len(), 2);
        assert_eq!(config.llm.max_tokens, 8192);
        assert_eq!(config.llm.reject_marker, "DO NOT CURATE");
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.feed.source, FeedSource::Rpc);
        assert_eq!(config.blog.total_weight, 10_000);
        assert_eq!(config.blog.burn_account, "null");
        assert_eq!(config.vote.max_attempts, 20);
        assert_eq!(config.content.languages, vec!["eng".to_string()]);
    }

    #[test]
    fn test_from_file_reports_path() {
        let err = Config::from_file(Path::new("/nonexistent/curator.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[llm\nbroken").unwrap();
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validate_checks_prompts_and_models() {
        let dir = TempDir::new().unwrap();
        let system = dir.path().join("system.md");
        let curation = dir.path().join("curation.md");
        std::fs::write(&system, "You are a curator.").unwrap();

        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.llm.system_prompt = system;
        config.llm.curation_prompt = curation.clone();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PromptMissing(p)) if p == curation
        ));

        std::fs::write(&curation, "Review this.").unwrap();
        assert!(config.validate().is_ok());

        config.llm.models = vec!["  ".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::NoModels)));
    }

    #[test]
    fn test_validate_rejects_overcommitted_weights() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.blog.weights.operator = 6000;
        config.blog.weights.author = 1000;
        assert!(matches!(config.validate(), Err(ConfigError::Allocation(_))));
    }

    #[test]
    fn test_resolve_api_key_strips_comment() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.llm.api_key = Some("sk-abc   # staging key".to_string());
        assert_eq!(config.resolve_api_key().unwrap(), "sk-abc");
    }

    #[test]
    fn test_expand_env_vars_leaves_unknown() {
        std::env::set_var("CURATOR_TEST_TOKEN", "secret");
        assert_eq!(
            expand_env_vars("Bearer ${CURATOR_TEST_TOKEN}"),
            "Bearer secret"
        );
        assert_eq!(
            expand_env_vars("${CURATOR_DEFINITELY_UNSET_VAR}"),
            "${CURATOR_DEFINITELY_UNSET_VAR}"
        );
    }
}
