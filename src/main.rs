//! curator CLI - Automated content curation over an append-only post feed.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use curator::ledger::{Feed, ReplayFeed, RpcFeed, RpcLedger, SdsDelegationSource};
use curator::models::FeedSource;
use curator::pipeline::DryRunPublisher;
use curator::{
    Config, CurationLoop, ModelFailoverClient, ModelRoster, ScreeningPipeline, ScreeningVerdict,
    StreamCursor,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "curator")]
#[command(version)]
#[command(about = "Screen, evaluate and reward posts from an append-only feed")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Curate one batch from the feed and publish it
    Run {
        /// Comma-separated model roster, overriding llm.models
        #[arg(short, long)]
        models: Option<String>,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,

    /// Run the author-level screening stages for one account
    CheckAuthor {
        /// Account name, with or without a leading '@'
        name: String,
    },

    /// Print or override the feed cursor
    Cursor {
        /// New position to resume from
        #[arg(long)]
        set: Option<u64>,
    },
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_file(path).with_context(|| format!("Failed to load config from {path:?}"))
}

fn print_example_config() {
    let example = r#"# curator configuration file

[llm]
url = "https://api.arliai.com/v1/chat/completions"
# API key (can also use the env var named by api_key_env, default LLM_API_KEY)
# api_key = "${ARLIAI_API_KEY}"
models = ["Gemma-3-27B-it", "Mistral-Nemo-12B-Instruct-2407"]
system_prompt = "prompts/system.md"
curation_prompt = "prompts/curation.md"
timeout_secs = 180
temperature = 0.3
top_p = 0.85
max_tokens = 8192
reject_marker = "DO NOT CURATE"
min_response_chars = 100

[retry]
max_retries = 3
base_delay_ms = 2000
growth = 2.0
jitter_factor = 0.2

[feed]
source = "rpc"            # or "replay" with replay_path
# replay_path = "data/events.jsonl"
cursor_path = "state/cursor.txt"
# start_position = 95000000
# stop_position = 95001000
poll_interval_ms = 3000
max_retries = 5
retry_delay_ms = 1000

[ledger]
node = "https://api.steemit.com"
# cross_reference_node = "https://api.hive.blog"
delegation_api = "https://sds1.steemworld.org/delegations_api/getIncomingDelegations"

[content]
min_words = 500
blacklisted_tags = ["nsfw", "spam"]
required_tags = []
max_tags = 10
languages = ["eng"]

[author]
blacklist = []
whitelist = []
# registry_account = "spaminator"
min_reputation = 45.0
max_inactivity_days = 30
min_cross_reference_idle_days = 0
min_followers = 50
min_followers_per_month = 1.0
min_adjusted_followers_per_month = 2.0
follower_halflife_years = 1.0
min_follower_median_reputation = 35.0
min_active_followers = 10
active_follower_days = 30

[wallet]
max_delegation_pct = 90.0
min_undelegated_sp = 50.0
max_screened_delegation_pct = 10.0
screened_delegatees = []

[blog]
account = "my-curator"
operator_name = "@my-operator"
batch_size = 5
delegators_per_post = 1
total_weight = 10000
burn_account = "null"
max_beneficiaries = 8
tags = ["curation", "ai-curation"]
title_prefix = "Curated Reading"

[blog.weights]
operator = 500
author = 500
delegator = 100

[publish]
output_dir = "output"
max_attempts = 3
retry_delay_secs = 60

[vote]
enabled = true
delay_secs = 300
weight = 10000
max_attempts = 20
retry_delay_secs = 5
interval_retry_delay_ms = 3000
"#;
    println!("{example}");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Example => {
            print_example_config();
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            config.validate().context("Configuration is invalid")?;
            config
                .resolve_api_key()
                .context("Failed to resolve API key")?;

            info!("Configuration is valid");
            info!("  Models: {}", config.llm.models.join(", "));
            info!("  Feed: {:?} from {}", config.feed.source, config.ledger.node);
            info!(
                "  Batch: {} articles, {} delegators per post",
                config.blog.batch_size, config.blog.delegators_per_post
            );
            info!(
                "  Weights: operator {} / author {} / delegator {} of {}",
                config.blog.weights.operator,
                config.blog.weights.author,
                config.blog.weights.delegator,
                config.blog.total_weight
            );
        }

        Commands::Cursor { set } => {
            let config = load_config(&cli.config)?;
            let mut cursor = StreamCursor::open(&config.feed.cursor_path)
                .context("Failed to open cursor")?;
            if let Some(position) = set {
                cursor.reset(position).context("Failed to write cursor")?;
                info!(position, "Cursor overridden");
            }
            match cursor.position() {
                Some(position) => println!("{position}"),
                None => println!("(no cursor stored)"),
            }
        }

        Commands::CheckAuthor { name } => {
            let config = load_config(&cli.config)?;
            let name = name.trim_start_matches('@');
            let ledger = Arc::new(RpcLedger::from_config(&config.ledger)?);
            let mut screening = ScreeningPipeline::from_config(&config, ledger)?;
            if let Some(cross) = RpcLedger::cross_reference(&config.ledger)? {
                screening = screening.with_cross_reference(Arc::new(cross));
            }

            match screening.screen_author(name, Utc::now()).await {
                ScreeningVerdict::Accept => println!("@{name}: accept"),
                ScreeningVerdict::Reject(reason) => {
                    println!("@{name}: reject ({}) {reason}", reason.code())
                }
            }
        }

        Commands::Run { models } => {
            let mut config = load_config(&cli.config)?;
            if let Some(list) = models {
                let roster = ModelRoster::parse(&list).context("Invalid --models list")?;
                config.llm.models = roster.models().to_vec();
            }
            config.validate().context("Configuration is invalid")?;

            let roster = ModelRoster::new(&config.llm.models)?;
            let evaluator = ModelFailoverClient::from_config(&config, roster)
                .context("Failed to build LLM client")?;

            let ledger = Arc::new(RpcLedger::from_config(&config.ledger)?);
            let mut screening = ScreeningPipeline::from_config(&config, ledger.clone())?;
            if let Some(cross) = RpcLedger::cross_reference(&config.ledger)? {
                info!(node = %cross.endpoint(), "Cross-reference lookups enabled");
                screening = screening.with_cross_reference(Arc::new(cross));
            }

            let feed: Box<dyn Feed> = match config.feed.source {
                FeedSource::Rpc => Box::new(RpcFeed::new(
                    Arc::clone(&ledger),
                    Duration::from_millis(config.feed.poll_interval_ms),
                )),
                FeedSource::Replay => {
                    let path = config
                        .feed
                        .replay_path
                        .as_deref()
                        .context("feed.replay_path is required for the replay source")?;
                    Box::new(ReplayFeed::from_path(path)?)
                }
            };
            let cursor =
                StreamCursor::open(&config.feed.cursor_path).context("Failed to open cursor")?;

            let delegators = Arc::new(SdsDelegationSource::new(
                config.ledger.delegation_api.clone(),
                Duration::from_secs(config.ledger.timeout_secs),
            )?);
            let publisher = Arc::new(DryRunPublisher::new(config.publish.output_dir.clone()));

            let mut curation = CurationLoop::new(
                &config,
                feed,
                cursor,
                screening,
                Box::new(evaluator),
                delegators,
                publisher,
            );
            let stats = curation.run().await?;

            println!("\n=== Curation Run Complete ===");
            println!("Events:      {}", stats.events_seen);
            println!("Replies:     {}", stats.replies_skipped);
            println!("Screened:    {}", stats.screened_out);
            for (code, count) in &stats.reject_reasons {
                println!("  {code:<24} {count}");
            }
            println!("Evaluated:   {}", stats.evaluated);
            println!("Curated:     {}", stats.curated);
            println!("AI rejected: {}", stats.ai_rejected);
            println!("AI errors:   {}", stats.ai_errors);
            println!("Published:   {}", stats.published);
            println!("Votes:       {}", stats.votes_cast);
            println!("Runtime:     {:.1}s", stats.runtime_secs);
            if let Some(position) = curation.cursor().position() {
                println!("Cursor:      {position}");
            }
            println!("Output:      {:?}", config.publish.output_dir);
        }
    }

    Ok(())
}
