//! Webhook router: snapshot fetch and timer scheduling per event.

use std::sync::Arc;

use chrono::Utc;

use escrowd_core::NormalizedEvent;
use escrowd_ports::{ChainRpc, DealApi, PortError};

use crate::scheduler::{EngineError, SchedulingEngine};

/// Per-batch result reported back over HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BatchOutcome {
    pub accepted: usize,
    pub ignored: usize,
}

#[derive(Debug, thiserror::Error)]
enum RouteError {
    #[error(transparent)]
    Port(#[from] PortError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub struct WebhookRouter {
    engine: SchedulingEngine,
    api: Arc<dyn DealApi>,
    chain: Option<Arc<dyn ChainRpc>>,
}

impl WebhookRouter {
    pub fn new(
        engine: SchedulingEngine,
        api: Arc<dyn DealApi>,
        chain: Option<Arc<dyn ChainRpc>>,
    ) -> Self {
        Self { engine, api, chain }
    }

    /// Route a verified, normalized batch.
    ///
    /// Events are processed sequentially; one event's failure is logged and
    /// counted as ignored without aborting the rest of the batch.
    pub async fn route_batch(&self, events: &[NormalizedEvent]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for event in events {
            match self.route_one(event).await {
                Ok(()) => outcome.accepted += 1,
                Err(err) => {
                    tracing::warn!(
                        event_id = %event.id,
                        deal_id = %event.effect.deal_id(),
                        error = %err,
                        "webhook event ignored"
                    );
                    outcome.ignored += 1;
                }
            }
        }
        outcome
    }

    async fn route_one(&self, event: &NormalizedEvent) -> Result<(), RouteError> {
        self.correlate(event).await;

        let snapshot = self.api.get_deal_snapshot(event.effect.deal_id()).await?;
        let now = Utc::now().timestamp();
        let scheduled = self.engine.apply_event(&event.effect, &snapshot, now)?;

        tracing::info!(
            event_id = %event.id,
            deal_id = %snapshot.id,
            state = ?snapshot.state,
            scheduled = scheduled.scheduled,
            cancelled = scheduled.cancelled,
            "webhook event routed"
        );
        Ok(())
    }

    /// Best-effort chain correlation: confirm the provider-reported
    /// signature is known to the RPC node. Log-only; a miss never fails the
    /// event.
    async fn correlate(&self, event: &NormalizedEvent) {
        let Some(chain) = &self.chain else {
            return;
        };
        match chain.get_signature_status(&event.sig).await {
            Ok(Some(status)) => {
                tracing::debug!(
                    sig = %event.sig,
                    slot = status.slot,
                    confirmation = ?status.confirmation_status,
                    "signature correlated"
                );
            }
            Ok(None) => {
                tracing::debug!(sig = %event.sig, "signature unknown to rpc node");
            }
            Err(err) => {
                tracing::debug!(sig = %event.sig, error = %err, "signature correlation failed");
            }
        }
    }
}
