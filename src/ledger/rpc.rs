//! Condenser JSON-RPC client.
//!
//! Epistemic foundation:
//! - K_i: Requests are JSON-RPC 2.0 envelopes over HTTP POST
//! - B_i: Node responds within timeout (might fail)
//! - B_i: `result` has the documented shape (might fail → Decode)
//! - I^B: Node load unknowable → exponential backoff on transient errors

use super::types::{Account, Content, FollowCount, FollowEntry, VestingDelegation};
use super::{ActivityLookup, Ledger};
use crate::client::RetryPolicy;
use crate::models::{LedgerConfig, LedgerError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Subset of `get_dynamic_global_properties`.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalProperties {
    pub head_block_number: u64,
    pub total_vesting_fund_steem: String,
    pub total_vesting_shares: String,
}

impl GlobalProperties {
    /// Liquid tokens per million vesting shares.
    pub fn steem_per_mvest(&self) -> Result<f64, LedgerError> {
        let fund = leading_number(&self.total_vesting_fund_steem)?;
        let shares = leading_number(&self.total_vesting_shares)?;
        if shares <= 0.0 {
            return Ok(0.0);
        }
        Ok(fund / shares * 1_000_000.0)
    }
}

fn leading_number(amount: &str) -> Result<f64, LedgerError> {
    amount
        .split_whitespace()
        .next()
        .and_then(|n| n.parse::<f64>().ok())
        .ok_or_else(|| LedgerError::Decode(format!("bad amount '{amount}'")))
}

/// JSON-RPC ledger client with bounded retry.
pub struct RpcLedger {
    client: reqwest::Client,
    endpoint: String,
    policy: RetryPolicy,
    next_id: AtomicU64,
}

impl RpcLedger {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, LedgerError> {
        let endpoint = endpoint.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| LedgerError::Network {
                endpoint: endpoint.clone(),
                source,
            })?;

        Ok(Self {
            client,
            endpoint,
            policy: RetryPolicy {
                max_retries,
                base: Duration::from_secs(1),
                growth: 2.0,
                jitter_factor: 0.0,
            },
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &LedgerConfig) -> Result<Self, LedgerError> {
        Self::new(
            config.node.clone(),
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )
    }

    /// Client for the cross-reference chain, if one is configured.
    pub fn cross_reference(config: &LedgerConfig) -> Result<Option<Self>, LedgerError> {
        config
            .cross_reference_node
            .as_ref()
            .map(|node| {
                Self::new(
                    node.clone(),
                    Duration::from_secs(config.timeout_secs),
                    config.max_retries,
                )
            })
            .transpose()
    }

    /// Replace the backoff policy (tests use a zero base delay).
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Call `method` and decode `result` into `T`, retrying transient failures.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, LedgerError> {
        let mut attempt = 0u32;
        loop {
            match self.call_once(method, &params).await {
                Ok(value) => {
                    return serde_json::from_value(value)
                        .map_err(|e| LedgerError::Decode(format!("{method}: {e}")));
                }
                Err(e) if e.is_transient() && self.policy.allows_retry(attempt) => {
                    let (delay, _) = self.policy.delay_bounds(attempt);
                    warn!(
                        method,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Ledger call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_once(&self, method: &str, params: &Value) -> Result<Value, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        debug!(method, id, "Ledger request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|source| self.transport_error(source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Http {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }

        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(format!("{method}: {e}")))?;

        if let Some(error) = envelope.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(envelope.result.unwrap_or(Value::Null))
    }

    fn transport_error(&self, source: reqwest::Error) -> LedgerError {
        if source.is_timeout() {
            LedgerError::Timeout {
                endpoint: self.endpoint.clone(),
            }
        } else {
            LedgerError::Network {
                endpoint: self.endpoint.clone(),
                source,
            }
        }
    }

    pub async fn get_dynamic_global_properties(&self) -> Result<GlobalProperties, LedgerError> {
        self.call("condenser_api.get_dynamic_global_properties", json!([]))
            .await
    }

    /// Raw block, or `None` if it is not produced yet.
    pub async fn get_block(&self, number: u64) -> Result<Option<Value>, LedgerError> {
        let block: Value = self.call("condenser_api.get_block", json!([number])).await?;
        Ok(if block.is_null() { None } else { Some(block) })
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn get_content(&self, author: &str, permlink: &str) -> Result<Content, LedgerError> {
        let value: Value = self
            .call("condenser_api.get_content", json!([author, permlink]))
            .await?;
        // Missing posts come back as an empty shell with author ""
        if value.get("author").and_then(Value::as_str).unwrap_or("").is_empty() {
            return Err(LedgerError::NotFound(format!("@{author}/{permlink}")));
        }
        serde_json::from_value(value).map_err(|e| LedgerError::Decode(format!("get_content: {e}")))
    }

    async fn get_accounts(&self, names: &[String]) -> Result<Vec<Account>, LedgerError> {
        self.call("condenser_api.get_accounts", json!([names])).await
    }

    async fn get_follow_count(&self, name: &str) -> Result<FollowCount, LedgerError> {
        self.call("condenser_api.get_follow_count", json!([name]))
            .await
    }

    async fn get_followers(
        &self,
        name: &str,
        start: Option<&str>,
        limit: u32,
    ) -> Result<Vec<FollowEntry>, LedgerError> {
        self.call(
            "condenser_api.get_followers",
            json!([name, start.unwrap_or(""), "blog", limit]),
        )
        .await
    }

    async fn get_following(
        &self,
        name: &str,
        start: Option<&str>,
        what: &str,
        limit: u32,
    ) -> Result<Vec<FollowEntry>, LedgerError> {
        self.call(
            "condenser_api.get_following",
            json!([name, start.unwrap_or(""), what, limit]),
        )
        .await
    }

    async fn get_vesting_delegations(
        &self,
        delegator: &str,
        start: Option<&str>,
        limit: u32,
    ) -> Result<Vec<VestingDelegation>, LedgerError> {
        self.call(
            "condenser_api.get_vesting_delegations",
            json!([delegator, start.unwrap_or(""), limit]),
        )
        .await
    }

    async fn get_steem_per_mvest(&self) -> Result<f64, LedgerError> {
        self.get_dynamic_global_properties().await?.steem_per_mvest()
    }
}

#[async_trait]
impl ActivityLookup for RpcLedger {
    async fn last_activity(&self, name: &str) -> Result<Option<DateTime<Utc>>, LedgerError> {
        let accounts = self.get_accounts(&[name.to_string()]).await?;
        Ok(accounts.first().and_then(Account::last_activity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Vests;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_ledger(server: &MockServer, max_retries: u32) -> RpcLedger {
        RpcLedger::new(server.uri(), Duration::from_secs(5), max_retries)
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_retries,
                base: Duration::ZERO,
                growth: 2.0,
                jitter_factor: 0.0,
            })
    }

    #[tokio::test]
    async fn test_get_accounts_decodes_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "condenser_api.get_accounts",
                "params": [["alice"]]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": [{
                    "name": "alice",
                    "reputation": 95_832_978_796_820_i64,
                    "created": "2016-07-01T00:00:00",
                    "last_post": "2025-01-02T03:04:05",
                    "last_vote_time": "2025-01-03T00:00:00",
                    "vesting_shares": "2000.000000 VESTS",
                    "delegated_vesting_shares": "0.000000 VESTS",
                    "received_vesting_shares": "10.000000 VESTS"
                }]
            })))
            .mount(&server)
            .await;

        let ledger = fast_ledger(&server, 0);
        let account = ledger.get_account("alice").await.unwrap();
        assert_eq!(account.reputation, 95_832_978_796_820);
        assert_eq!(account.vesting_shares, Vests::from_whole(2000));
        assert_eq!(
            account.last_activity().unwrap().to_rfc3339(),
            "2025-01-03T00:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn test_missing_account_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": []})))
            .mount(&server)
            .await;

        let ledger = fast_ledger(&server, 0);
        let err = ledger.get_account("ghost").await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
        assert_eq!(ledger.last_activity("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_transient_http_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let ledger = fast_ledger(&server, 2);
        let err = ledger.get_follow_count("alice").await.unwrap_err();
        assert!(matches!(err, LedgerError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_rpc_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {"code": -32602, "message": "Invalid parameters"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ledger = fast_ledger(&server, 3);
        let err = ledger.get_follow_count("alice").await.unwrap_err();
        match err {
            LedgerError::Rpc { code, message } => {
                assert_eq!(code, -32602);
                assert_eq!(message, "Invalid parameters");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_steem_per_mvest_from_global_properties() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "condenser_api.get_dynamic_global_properties"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {
                    "head_block_number": 90_000_000u64,
                    "total_vesting_fund_steem": "500.000 STEEM",
                    "total_vesting_shares": "1000000.000000 VESTS"
                }
            })))
            .mount(&server)
            .await;

        let ledger = fast_ledger(&server, 0);
        let rate = ledger.get_steem_per_mvest().await.unwrap();
        assert!((rate - 500.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_content_shell_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"author": "", "permlink": "", "created": "1970-01-01T00:00:00"}
            })))
            .mount(&server)
            .await;

        let ledger = fast_ledger(&server, 0);
        let err = ledger.get_content("alice", "gone").await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }
}
