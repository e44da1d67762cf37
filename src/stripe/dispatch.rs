// Event-type dispatch table for verified webhook events

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::stripe::errors::WebhookError;
use crate::stripe::types::{event_types, EventPayload, WebhookEvent};

/// Handles one event type. Registered with an [`EventDispatcher`] under the
/// type tag it understands.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &WebhookEvent) -> Result<(), WebhookError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    Unhandled,
}

#[derive(Clone, Default)]
pub struct EventDispatcher {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher with the handlers this service ships with.
    pub fn with_default_handlers() -> Self {
        Self::new().register(event_types::PAYMENT_INTENT_SUCCEEDED, PaymentSucceededHandler)
    }

    /// Register `handler` for `event_type`, replacing any previous one.
    pub fn register(
        mut self,
        event_type: impl Into<String>,
        handler: impl EventHandler + 'static,
    ) -> Self {
        self.handlers.insert(event_type.into(), Arc::new(handler));
        self
    }

    #[cfg(test)]
    pub fn handles(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    pub async fn dispatch(&self, event: &WebhookEvent) -> Result<Dispatch, WebhookError> {
        match self.handlers.get(&event.event_type) {
            Some(handler) => {
                handler.handle(event).await?;
                Ok(Dispatch::Handled)
            }
            None => {
                info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    object_id = event.object_id().unwrap_or("-"),
                    "Unhandled event type"
                );
                Ok(Dispatch::Unhandled)
            }
        }
    }
}

/// Logs the payment intent carried by `payment_intent.succeeded`.
pub struct PaymentSucceededHandler;

#[async_trait]
impl EventHandler for PaymentSucceededHandler {
    async fn handle(&self, event: &WebhookEvent) -> Result<(), WebhookError> {
        match &event.payload {
            EventPayload::PaymentIntentSucceeded(intent) => {
                info!(
                    event_id = %event.id,
                    payment_intent_id = %intent.id,
                    amount = intent.amount,
                    currency = %intent.currency,
                    "Payment succeeded"
                );
                Ok(())
            }
            other => {
                warn!(event_id = %event.id, payload = ?other, "Unexpected payload for payment_intent.succeeded");
                Err(WebhookError::ProcessingFailed(format!(
                    "event {} carries no payment intent",
                    event.id
                )))
            }
        }
    }
}
