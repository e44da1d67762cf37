// Stripe provider module

pub mod dispatch;
pub mod errors;
pub mod payment_request;
pub mod processed_events;
pub mod rest;
pub mod types;
pub mod webhook;

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::settings::StripeSettings;
use self::errors::StripeApiError;
use self::rest::StripeRestClient;
use self::types::{CreatePaymentIntentRequest, PaymentIntent};

/// The one outbound capability the intent endpoint needs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentIntents: Send + Sync {
    async fn create_payment_intent(
        &self,
        req: &CreatePaymentIntentRequest,
    ) -> Result<PaymentIntent, StripeApiError>;
}

#[derive(Clone)]
pub struct StripeProvider {
    pub(crate) rest: StripeRestClient,
}

impl StripeProvider {
    // Build reqwest client with rustls and timeout from cfg.
    pub fn new(cfg: &StripeSettings) -> Result<Self, StripeApiError> {
        let timeout = Duration::from_millis(if cfg.timeout_ms > 0 { cfg.timeout_ms } else { 15_000 });
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| StripeApiError::Http(e.to_string()))?;

        let rest = StripeRestClient::new(http, cfg.api_key.clone())
            .with_version(cfg.stripe_version.clone())
            .with_retry(cfg.max_retries, 100, 2_000);

        Ok(Self { rest })
    }
}

#[async_trait]
impl PaymentIntents for StripeProvider {
    async fn create_payment_intent(
        &self,
        req: &CreatePaymentIntentRequest,
    ) -> Result<PaymentIntent, StripeApiError> {
        self.rest.create_payment_intent(req).await
    }
}
