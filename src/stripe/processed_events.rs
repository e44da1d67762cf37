// Record of webhook event ids that have already been dispatched

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Answers "has this event id been processed before". Stripe delivers at
/// least once, so the webhook path consults this before dispatching.
#[async_trait]
pub trait ProcessedEvents: Send + Sync {
    async fn is_processed(&self, event_id: &str) -> bool;
    async fn mark_processed(&self, event_id: &str);
}

/// Remembers nothing; every delivery is dispatched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDedup;

#[async_trait]
impl ProcessedEvents for NoDedup {
    async fn is_processed(&self, _event_id: &str) -> bool {
        false
    }

    async fn mark_processed(&self, _event_id: &str) {}
}

/// In-process event id set. Entries expire after the TTL and are lost on
/// restart.
pub struct InMemoryProcessedEvents {
    seen: RwLock<HashMap<String, Instant>>,
    ttl: Duration,
}

impl InMemoryProcessedEvents {
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.seen.read().await.len()
    }
}

#[async_trait]
impl ProcessedEvents for InMemoryProcessedEvents {
    async fn is_processed(&self, event_id: &str) -> bool {
        let seen = self.seen.read().await;
        seen.get(event_id)
            .is_some_and(|at| at.elapsed() <= self.ttl)
    }

    async fn mark_processed(&self, event_id: &str) {
        let mut seen = self.seen.write().await;

        // Clean up expired ids opportunistically
        let before = seen.len();
        let ttl = self.ttl;
        seen.retain(|_, at| at.elapsed() <= ttl);
        let removed = before - seen.len();
        if removed > 0 {
            debug!(removed = removed, "Expired processed webhook event ids");
        }

        seen.insert(event_id.to_string(), Instant::now());
    }
}
