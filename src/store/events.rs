//! Domain event publishing over NATS

use tracing::{debug, warn};

use crate::domain::events::DomainEvent;
use crate::{Result, StoreError};

const SUBJECT_PREFIX: &str = "packstore.events";

/// Publishes domain events when a NATS client is configured; otherwise drops them.
#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    pub fn subject(event: &DomainEvent) -> String { format!("{SUBJECT_PREFIX}.{}", event.kind()) }

    pub async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let Some(client) = &self.nats else { return Ok(()) };
        let payload = serde_json::to_vec(event).map_err(|e| StoreError::Events(e.to_string()))?;
        let subject = Self::subject(event);
        client.publish(subject.clone(), payload.into()).await.map_err(|e| StoreError::Events(e.to_string()))?;
        debug!(subject = %subject, "event published");
        Ok(())
    }

    /// Publish a batch, logging failures instead of returning them. Events
    /// are informational; a failed publish never undoes the change.
    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in &events {
            if let Err(e) = self.publish(event).await {
                warn!(kind = event.kind(), error = %e, "event publish failed");
            }
        }
    }
}
