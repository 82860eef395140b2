//! Incoming-delegation lookup through a columnar HTTP API.
//!
//! K_i: `GET {base}/{account}` returns
//! `{"code": 0, "result": {"cols": {"from": i, "vests": j, ..}, "rows": [[..], ..]}}`.
//! Column positions are read from `cols` on every call.

use super::DelegatorSource;
use crate::models::{LedgerError, Vests};
use crate::rewards::WeightedParticipant;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct DelegationResponse {
    code: i64,
    #[serde(default)]
    result: Option<DelegationTable>,
}

#[derive(Debug, Deserialize)]
struct DelegationTable {
    cols: BTreeMap<String, usize>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

/// Delegator source backed by the delegation API.
pub struct SdsDelegationSource {
    client: reqwest::Client,
    base_url: String,
}

impl SdsDelegationSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LedgerError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| LedgerError::Network {
                endpoint: base_url.clone(),
                source,
            })?;
        Ok(Self { client, base_url })
    }

    fn url_for(&self, account: &str) -> String {
        format!("{}/{}", self.base_url, account)
    }
}

#[async_trait]
impl DelegatorSource for SdsDelegationSource {
    async fn incoming_delegations(
        &self,
        account: &str,
    ) -> Result<Vec<WeightedParticipant>, LedgerError> {
        let url = self.url_for(account);
        let response = self.client.get(&url).send().await.map_err(|source| {
            if source.is_timeout() {
                LedgerError::Timeout {
                    endpoint: url.clone(),
                }
            } else {
                LedgerError::Network {
                    endpoint: url.clone(),
                    source,
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Http {
                endpoint: url,
                status: status.as_u16(),
            });
        }

        let body: DelegationResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(format!("delegation API: {e}")))?;

        parse_delegations(body)
    }
}

fn parse_delegations(body: DelegationResponse) -> Result<Vec<WeightedParticipant>, LedgerError> {
    if body.code != 0 {
        return Err(LedgerError::Rpc {
            code: body.code,
            message: "delegation API returned an error code".to_string(),
        });
    }
    let table = body
        .result
        .ok_or_else(|| LedgerError::Decode("delegation API: missing result".to_string()))?;

    let column = |name: &str| {
        table
            .cols
            .get(name)
            .copied()
            .ok_or_else(|| LedgerError::Decode(format!("delegation API: missing column '{name}'")))
    };
    let from_index = column("from")?;
    let vests_index = column("vests")?;

    // Repeat delegators are merged; zero rows dropped
    let mut merged: BTreeMap<String, Vests> = BTreeMap::new();
    for row in &table.rows {
        let delegator = row
            .get(from_index)
            .and_then(Value::as_str)
            .ok_or_else(|| LedgerError::Decode("delegation API: bad 'from' cell".to_string()))?;
        let vests = row
            .get(vests_index)
            .and_then(vests_cell)
            .ok_or_else(|| {
                LedgerError::Decode(format!("delegation API: bad 'vests' for {delegator}"))
            })?;

        if vests.is_zero() {
            warn!(delegator, "Skipping zero delegation");
            continue;
        }
        let entry = merged.entry(delegator.to_string()).or_default();
        *entry = *entry + vests;
    }

    debug!(delegators = merged.len(), "Fetched incoming delegations");
    Ok(merged
        .into_iter()
        .map(|(id, weight)| WeightedParticipant::new(id, weight))
        .collect())
}

fn vests_cell(value: &Value) -> Option<Vests> {
    match value {
        Value::Number(n) => n.as_f64().and_then(|v| Vests::from_f64(v).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_reads_columns_by_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/delegations/curator"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "result": {
                    "cols": {"time": 0, "vests": 1, "from": 2},
                    "rows": [
                        [1700000000, 1500.5, "alice"],
                        [1700000001, "250.000000", "bob"],
                        [1700000002, 0.0, "zero"],
                        [1700000003, 100.0, "alice"]
                    ]
                }
            })))
            .mount(&server)
            .await;

        let base = format!("{}/delegations/", server.uri());
        let source = SdsDelegationSource::new(base, Duration::from_secs(5)).unwrap();
        let delegators = source.incoming_delegations("curator").await.unwrap();

        assert_eq!(delegators.len(), 2);
        assert_eq!(delegators[0].id, "alice");
        assert_eq!(delegators[0].weight, "1600.500000".parse().unwrap());
        assert_eq!(delegators[1].id, "bob");
        assert_eq!(delegators[1].weight, Vests::from_whole(250));
    }

    #[tokio::test]
    async fn test_error_code_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 7})))
            .mount(&server)
            .await;

        let source = SdsDelegationSource::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = source.incoming_delegations("curator").await.unwrap_err();
        assert!(matches!(err, LedgerError::Rpc { code: 7, .. }));
    }

    #[tokio::test]
    async fn test_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = SdsDelegationSource::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = source.incoming_delegations("curator").await.unwrap_err();
        assert!(matches!(err, LedgerError::Http { status: 500, .. }));
    }
}
