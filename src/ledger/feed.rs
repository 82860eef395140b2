//! Ordered operation feeds.
//!
//! - **RpcFeed**: follows the live chain block by block, polling at the head
//! - **ReplayFeed**: serves recorded events from a JSONL file or memory

use super::rpc::RpcLedger;
use super::types::parse_ledger_time;
use super::Feed;
use crate::models::{CuratorError, FeedEvent, LedgerError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Live feed reading one block at a time.
///
/// Blocks without operations produce no events.
pub struct RpcFeed {
    ledger: Arc<RpcLedger>,
    next_block: u64,
    buffer: VecDeque<FeedEvent>,
    poll_interval: Duration,
}

impl RpcFeed {
    pub fn new(ledger: Arc<RpcLedger>, poll_interval: Duration) -> Self {
        Self {
            ledger,
            next_block: 0,
            buffer: VecDeque::new(),
            poll_interval,
        }
    }

    pub fn next_block(&self) -> u64 {
        self.next_block
    }
}

#[async_trait]
impl Feed for RpcFeed {
    async fn seek(&mut self, position: u64) -> std::result::Result<(), LedgerError> {
        self.next_block = position;
        self.buffer.clear();
        info!(block = position, "Feed positioned");
        Ok(())
    }

    async fn next_event(&mut self) -> std::result::Result<Option<FeedEvent>, LedgerError> {
        loop {
            if let Some(event) = self.buffer.pop_front() {
                return Ok(Some(event));
            }

            let head = self
                .ledger
                .get_dynamic_global_properties()
                .await?
                .head_block_number;
            if self.next_block > head {
                debug!(next = self.next_block, head, "Caught up with head, waiting");
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            let Some(block) = self.ledger.get_block(self.next_block).await? else {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            };

            self.buffer.extend(events_from_block(self.next_block, &block));
            self.next_block += 1;
        }
    }

    async fn head_position(&mut self) -> std::result::Result<u64, LedgerError> {
        Ok(self
            .ledger
            .get_dynamic_global_properties()
            .await?
            .head_block_number)
    }
}

/// Flatten a condenser block into feed events, in transaction order.
///
/// Only the last event of the block closes its position.
pub fn events_from_block(number: u64, block: &Value) -> Vec<FeedEvent> {
    let timestamp = block
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_ledger_time)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let mut events: Vec<FeedEvent> = block
        .get("transactions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|tx| tx.get("operations").and_then(Value::as_array))
        .flatten()
        .filter_map(split_operation)
        .map(|(op_type, body)| event_from_operation(op_type, body, number, timestamp))
        .collect();

    let count = events.len();
    for (i, event) in events.iter_mut().enumerate() {
        event.closes_position = i + 1 == count;
    }
    events
}

/// Accept both `["comment", {..}]` and `{"type": "comment_operation", "value": {..}}`.
fn split_operation(op: &Value) -> Option<(String, &Value)> {
    if let Some(pair) = op.as_array() {
        let name = pair.first()?.as_str()?;
        return Some((name.to_string(), pair.get(1)?));
    }
    let name = op.get("type")?.as_str()?;
    let name = name.strip_suffix("_operation").unwrap_or(name);
    Some((name.to_string(), op.get("value")?))
}

fn event_from_operation(
    op_type: String,
    body: &Value,
    position: u64,
    timestamp: DateTime<Utc>,
) -> FeedEvent {
    let field = |key: &str| {
        body.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let tags = if op_type == "comment" {
        comment_tags(
            &field("parent_author"),
            &field("parent_permlink"),
            &field("json_metadata"),
        )
    } else {
        Vec::new()
    };

    FeedEvent {
        author: field("author"),
        permlink: field("permlink"),
        title: field("title"),
        body: field("body"),
        parent_author: field("parent_author"),
        tags,
        timestamp,
        position,
        closes_position: true,
        op_type,
    }
}

/// Tags from `json_metadata`, with a top-level post's category first.
fn comment_tags(parent_author: &str, parent_permlink: &str, json_metadata: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    if parent_author.is_empty() && !parent_permlink.is_empty() {
        tags.push(parent_permlink.to_string());
    }

    let metadata: Value = serde_json::from_str(json_metadata).unwrap_or(Value::Null);
    if let Some(listed) = metadata.get("tags").and_then(Value::as_array) {
        for tag in listed.iter().filter_map(Value::as_str) {
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
    }
    tags
}

/// Finite feed over recorded events.
pub struct ReplayFeed {
    events: Vec<FeedEvent>,
    next: usize,
}

impl ReplayFeed {
    pub fn new(events: Vec<FeedEvent>) -> Self {
        Self { events, next: 0 }
    }

    /// Load one JSON event per line; blank lines are skipped.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CuratorError::io(format!("reading replay file {}", path.display()), e))?;

        let mut events = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event: FeedEvent = serde_json::from_str(line).map_err(|e| {
                CuratorError::ParseError(format!("{} line {}: {e}", path.display(), i + 1))
            })?;
            events.push(event);
        }

        info!(path = %path.display(), events = events.len(), "Loaded replay feed");
        Ok(Self::new(events))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[async_trait]
impl Feed for ReplayFeed {
    async fn seek(&mut self, position: u64) -> std::result::Result<(), LedgerError> {
        self.next = self
            .events
            .iter()
            .position(|e| e.position >= position)
            .unwrap_or(self.events.len());
        Ok(())
    }

    async fn next_event(&mut self) -> std::result::Result<Option<FeedEvent>, LedgerError> {
        let event = self.events.get(self.next).cloned();
        if event.is_some() {
            self.next += 1;
        }
        Ok(event)
    }

    async fn head_position(&mut self) -> std::result::Result<u64, LedgerError> {
        Ok(self.events.first().map(|e| e.position).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RetryPolicy;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_block() -> Value {
        json!({
            "timestamp": "2025-02-01T10:00:00",
            "transactions": [
                {"operations": [
                    ["vote", {"voter": "v", "author": "a", "permlink": "p", "weight": 100}],
                    ["comment", {
                        "parent_author": "",
                        "parent_permlink": "science",
                        "author": "alice",
                        "permlink": "on-tides",
                        "title": "On Tides",
                        "body": "The moon pulls.",
                        "json_metadata": "{\"tags\":[\"science\",\"ocean\"]}"
                    }]
                ]},
                {"operations": [
                    {"type": "comment_operation", "value": {
                        "parent_author": "alice",
                        "parent_permlink": "on-tides",
                        "author": "bob",
                        "permlink": "re-on-tides",
                        "title": "",
                        "body": "Nice",
                        "json_metadata": ""
                    }}
                ]}
            ]
        })
    }

    #[test]
    fn test_events_from_block() {
        let events = events_from_block(42, &sample_block());
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].op_type, "vote");
        assert!(!events[0].closes_position);

        let post = &events[1];
        assert!(post.is_comment() && !post.is_reply());
        assert_eq!(post.tags, vec!["science", "ocean"]);
        assert_eq!(post.position, 42);

        let reply = &events[2];
        assert!(reply.is_reply());
        assert!(reply.closes_position);
        assert_eq!(reply.resume_position(), 43);
    }

    #[tokio::test]
    async fn test_rpc_feed_walks_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "condenser_api.get_dynamic_global_properties"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {
                    "head_block_number": 11u64,
                    "total_vesting_fund_steem": "1.000 STEEM",
                    "total_vesting_shares": "1.000000 VESTS"
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "condenser_api.get_block", "params": [10]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": sample_block()})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "condenser_api.get_block", "params": [11]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"timestamp": "2025-02-01T10:00:03", "transactions": [
                    {"operations": [["vote", {"voter": "x"}]]}
                ]}
            })))
            .mount(&server)
            .await;

        let ledger = RpcLedger::new(server.uri(), Duration::from_secs(5), 0)
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_retries: 0,
                base: Duration::ZERO,
                growth: 1.0,
                jitter_factor: 0.0,
            });
        let mut feed = RpcFeed::new(Arc::new(ledger), Duration::from_millis(1));
        assert_eq!(feed.head_position().await.unwrap(), 11);

        feed.seek(10).await.unwrap();
        let mut positions = Vec::new();
        for _ in 0..4 {
            let event = feed.next_event().await.unwrap().unwrap();
            positions.push((event.position, event.closes_position));
        }
        assert_eq!(positions, vec![(10, false), (10, false), (10, true), (11, true)]);
        assert_eq!(feed.next_block(), 12);
    }

    #[tokio::test]
    async fn test_replay_feed_from_jsonl() {
        let mut file = NamedTempFile::new().unwrap();
        for position in [5u64, 6, 7] {
            let event = json!({
                "type": "comment",
                "author": format!("author{position}"),
                "permlink": "p",
                "timestamp": "2025-02-01T10:00:00Z",
                "position": position
            });
            writeln!(file, "{event}").unwrap();
        }
        writeln!(file).unwrap();

        let mut feed = ReplayFeed::from_path(file.path()).unwrap();
        assert_eq!(feed.len(), 3);
        assert_eq!(feed.head_position().await.unwrap(), 5);

        feed.seek(6).await.unwrap();
        assert_eq!(feed.next_event().await.unwrap().unwrap().author, "author6");
        assert_eq!(feed.next_event().await.unwrap().unwrap().author, "author7");
        assert!(feed.next_event().await.unwrap().is_none());
    }

    #[test]
    fn test_replay_feed_rejects_bad_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{not json").unwrap();
        let err = ReplayFeed::from_path(file.path()).err().unwrap();
        assert!(matches!(err, CuratorError::ParseError(_)));
    }
}
