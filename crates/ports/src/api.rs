//! Deals API port: snapshot reads and finalize preparation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use escrowd_core::{DealId, DealSnapshot, SuggestedAction};

use crate::error::PortError;

/// Bound on every deals-API call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(6);

/// URLs handed to the reviewer after a finalize was prepared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizePrepared {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blink_url: Option<String>,
}

/// The deals API the engine reads from and prepares finalizes against.
///
/// `prepare_finalize` is idempotent per `(deal, action)`: re-preparing an
/// already-prepared finalize returns the same URLs.
#[async_trait]
pub trait DealApi: Send + Sync {
    async fn get_deal_snapshot(&self, deal_id: &DealId) -> Result<DealSnapshot, PortError>;

    async fn prepare_finalize(
        &self,
        deal_id: &DealId,
        action: SuggestedAction,
    ) -> Result<FinalizePrepared, PortError>;
}

/// HTTP client against the actions API (`ACTIONS_BASEURL`).
#[derive(Debug, Clone)]
pub struct HttpDealApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDealApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, PortError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PortError::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl DealApi for HttpDealApi {
    async fn get_deal_snapshot(&self, deal_id: &DealId) -> Result<DealSnapshot, PortError> {
        let url = format!("{}/deals/{}", self.base_url, deal_id);
        let snapshot: DealSnapshot = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(snapshot)
    }

    async fn prepare_finalize(
        &self,
        deal_id: &DealId,
        action: SuggestedAction,
    ) -> Result<FinalizePrepared, PortError> {
        let url = format!("{}/deals/{}/finalize", self.base_url, deal_id);
        let prepared: FinalizePrepared = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "dealId": deal_id, "action": action }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(prepared)
    }
}

/// In-memory deals API for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDealApi {
    snapshots: Mutex<HashMap<String, DealSnapshot>>,
    prepared: Mutex<Vec<(String, SuggestedAction)>>,
    fail_prepare: Mutex<Option<String>>,
}

impl InMemoryDealApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, snapshot: DealSnapshot) {
        let mut snapshots = self.snapshots.lock().unwrap();
        snapshots.insert(snapshot.id.as_str().to_string(), snapshot);
    }

    /// Make every `prepare_finalize` fail with the given message.
    pub fn fail_prepare_with(&self, message: impl Into<String>) {
        *self.fail_prepare.lock().unwrap() = Some(message.into());
    }

    /// Finalize preparations observed so far, in call order.
    pub fn prepared(&self) -> Vec<(String, SuggestedAction)> {
        self.prepared.lock().unwrap().clone()
    }
}

#[async_trait]
impl DealApi for InMemoryDealApi {
    async fn get_deal_snapshot(&self, deal_id: &DealId) -> Result<DealSnapshot, PortError> {
        let snapshots = self.snapshots.lock().unwrap();
        snapshots
            .get(deal_id.as_str())
            .cloned()
            .ok_or_else(|| PortError::Status(404))
    }

    async fn prepare_finalize(
        &self,
        deal_id: &DealId,
        action: SuggestedAction,
    ) -> Result<FinalizePrepared, PortError> {
        if let Some(message) = self.fail_prepare.lock().unwrap().clone() {
            return Err(PortError::Transport(message));
        }
        let mut prepared = self.prepared.lock().unwrap();
        prepared.push((deal_id.as_str().to_string(), action));
        Ok(FinalizePrepared {
            approval_url: Some(format!("https://actions.test/approve/{deal_id}")),
            blink_url: Some(format!("https://actions.test/blink/{deal_id}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrowd_core::DealState;

    #[tokio::test]
    async fn in_memory_round_trip() {
        let api = InMemoryDealApi::new();
        let id = DealId::new("D-1").unwrap();
        api.insert(DealSnapshot {
            id: id.clone(),
            state: DealState::Funded,
            delivery_by: Some(100),
            dispute_until: None,
        });

        let snap = api.get_deal_snapshot(&id).await.unwrap();
        assert_eq!(snap.state, DealState::Funded);

        let missing = DealId::new("D-404").unwrap();
        assert!(api.get_deal_snapshot(&missing).await.is_err());
    }

    #[tokio::test]
    async fn prepare_records_and_can_fail() {
        let api = InMemoryDealApi::new();
        let id = DealId::new("D-2").unwrap();
        let prepared = api.prepare_finalize(&id, SuggestedAction::Release).await.unwrap();
        assert!(prepared.approval_url.is_some());
        assert_eq!(api.prepared(), vec![("D-2".to_string(), SuggestedAction::Release)]);

        api.fail_prepare_with("actions api down");
        assert!(api.prepare_finalize(&id, SuggestedAction::Refund).await.is_err());
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let api = HttpDealApi::new("https://actions.test/").unwrap();
        assert_eq!(api.base_url, "https://actions.test");
    }
}
