//! Best-effort publication of domain events to NATS.

use tracing::{debug, warn};
use crate::domain::events::DomainEvent;

pub const SUBJECT_PREFIX: &str = "furnish";

#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    pub fn disabled() -> Self { Self::default() }

    /// Publishes events after the write that raised them has committed.
    /// Failures are logged and never reach the caller.
    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        let Some(client) = &self.nats else {
            for event in &events { debug!(subject = %event.subject(), "event publishing disabled"); }
            return;
        };
        for event in events {
            let subject = format!("{SUBJECT_PREFIX}.{}", event.subject());
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => { warn!(%subject, error = %e, "failed to encode event"); continue; }
            };
            if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                warn!(%subject, error = %e, "failed to publish event");
            }
        }
    }
}
