//! Audit events.
//!
//! After each successful write the server publishes an [`AuditEvent`] to an
//! optional [`Notifier`]. Delivery is fire-and-forget; sinks implement
//! [`AuditListener`] and register with a [`Publisher`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unix seconds
    pub ts: i64,
    /// Ids written by the request
    pub metrics: Vec<String>,
    pub ip_address: String,
}

impl AuditEvent {
    pub fn now(metrics: Vec<String>, ip_address: impl Into<String>) -> Self {
        let ts = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self {
            ts,
            metrics,
            ip_address: ip_address.into(),
        }
    }
}

pub trait AuditListener: Send + Sync {
    fn handle(&self, event: &AuditEvent);
}

pub trait Notifier: Send + Sync {
    fn publish(&self, event: AuditEvent);
}

/// Fans events out to every registered listener.
#[derive(Default)]
pub struct Publisher {
    listeners: Vec<Arc<dyn AuditListener>>,
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Arc<dyn AuditListener>) {
        self.listeners.push(listener);
    }

    pub fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }
}

impl Notifier for Publisher {
    fn publish(&self, event: AuditEvent) {
        for listener in &self.listeners {
            listener.handle(&event);
        }
    }
}
