//! JSON-RPC chain client, used only for best-effort event correlation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PortError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Status of a transaction signature as reported by the RPC node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    pub slot: u64,
    #[serde(default)]
    pub confirmation_status: Option<String>,
    #[serde(default)]
    pub err: Option<serde_json::Value>,
}

/// Read-only chain lookups. Correlation only: the engine never submits
/// transactions and never holds keys.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// `None` when the node no longer knows the signature.
    async fn get_signature_status(&self, sig: &str) -> Result<Option<SignatureStatus>, PortError>;
}

/// JSON-RPC client against `RPC_URL`.
#[derive(Debug, Clone)]
pub struct HttpChainRpc {
    client: reqwest::Client,
    url: String,
}

impl HttpChainRpc {
    pub fn new(url: impl Into<String>) -> Result<Self, PortError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PortError::Config(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<RpcResult>,
}

#[derive(Debug, Deserialize)]
struct RpcResult {
    value: Vec<Option<SignatureStatus>>,
}

#[async_trait]
impl ChainRpc for HttpChainRpc {
    async fn get_signature_status(&self, sig: &str) -> Result<Option<SignatureStatus>, PortError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getSignatureStatuses",
            "params": [[sig], {"searchTransactionHistory": false}],
        });

        let response: RpcResponse = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .result
            .and_then(|r| r.value.into_iter().next())
            .flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_deserializes_rpc_shape() {
        let raw = r#"{"result": {"context": {"slot": 99}, "value": [
            {"slot": 98, "confirmationStatus": "finalized", "err": null},
            null
        ]}}"#;
        let parsed: RpcResponse = serde_json::from_str(raw).unwrap();
        let value = parsed.result.unwrap().value;
        assert_eq!(value.len(), 2);
        assert_eq!(value[0].as_ref().unwrap().slot, 98);
        assert!(value[1].is_none());
    }
}
