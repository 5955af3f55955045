use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::warn;

use super::AuditEvent;

/// An event and the moment it was emitted. The writer stores this timestamp,
/// not the time it got around to the insert.
#[derive(Debug, Clone)]
pub struct AuditEventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
}

impl AuditEventEnvelope {
    fn now(event: AuditEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Sending side of the audit channel, handed to every component that records
/// events. Dropped events are logged; emitting never fails the caller.
#[derive(Clone)]
pub struct AuditHandle {
    tx: mpsc::Sender<AuditEventEnvelope>,
}

impl AuditHandle {
    pub(crate) fn new(tx: mpsc::Sender<AuditEventEnvelope>) -> Self {
        Self { tx }
    }

    /// Emit an event, waiting for channel capacity.
    pub async fn emit(&self, event: AuditEvent) {
        let kind = event.event_type();
        if self.tx.send(AuditEventEnvelope::now(event)).await.is_err() {
            warn!(event_type = kind, "Audit writer is gone, event dropped");
        }
    }

    /// Emit from synchronous code. Returns false if the event was dropped.
    pub fn try_emit(&self, event: AuditEvent) -> bool {
        let kind = event.event_type();
        match self.tx.try_send(AuditEventEnvelope::now(event)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(event_type = kind, "Audit channel full, event dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(event_type = kind, "Audit writer is gone, event dropped");
                false
            }
        }
    }
}
