// Stripe REST client
// Form-encoded requests with idempotency header propagation and jittered retries.

use rand::Rng;
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::stripe::errors::{StripeApiError, StripeErrorEnvelope};
use crate::stripe::types::{ensure_usd_cents, CreatePaymentIntentRequest, PaymentIntent};

const STRIPE_API_BASE: &str = "https://api.stripe.com";

#[derive(Clone)]
pub struct StripeRestClient {
    pub(crate) http: Client,
    pub(crate) api_key: String,
    pub(crate) api_base: String,
    pub(crate) stripe_version: Option<String>,
    pub(crate) max_retries: u32,
    pub(crate) base_delay_ms: u64,
    pub(crate) max_delay_ms: u64,
}

impl StripeRestClient {
    pub fn new(http: Client, api_key: String) -> Self {
        Self {
            http,
            api_key,
            api_base: STRIPE_API_BASE.to_string(),
            stripe_version: None,
            max_retries: 2,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }

    pub fn with_version(mut self, ver: impl Into<Option<String>>) -> Self {
        self.stripe_version = ver.into().filter(|v| !v.is_empty());
        self
    }

    pub fn with_retry(mut self, max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.base_delay_ms = base_delay_ms.max(1);
        self.max_delay_ms = max_delay_ms.max(self.base_delay_ms);
        self
    }

    fn apply_common_headers(
        &self,
        req: reqwest::RequestBuilder,
        idempotency_key: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut req = req.bearer_auth(&self.api_key);
        if let Some(k) = idempotency_key {
            req = req.header("Idempotency-Key", k);
        }
        if let Some(v) = &self.stripe_version {
            req = req.header("Stripe-Version", v);
        }
        req
    }

    fn map_error(status: StatusCode, body: &str) -> StripeApiError {
        if let Ok(env) = serde_json::from_str::<StripeErrorEnvelope>(body) {
            env.to_api_error_with_status(Some(status.as_u16()))
        } else {
            StripeApiError::Http(format!("status={} body={}", status.as_u16(), body))
        }
    }

    async fn with_retries<F, Fut, T>(&self, desc: &str, mut op: F) -> Result<T, StripeApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StripeApiError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if !e.is_transient() || attempt >= self.max_retries {
                        return Err(e);
                    }

                    let delay_ms = backoff_delay_ms(attempt, self.base_delay_ms, self.max_delay_ms);
                    warn!(
                        target: "stripe",
                        desc = %desc,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        next_delay_ms = delay_ms,
                        "retrying transient Stripe error"
                    );

                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
            }
        }
    }

    // POST /v1/payment_intents
    // application/x-www-form-urlencoded
    #[instrument(skip(self, req), fields(method="POST", path="/v1/payment_intents", idempotency_key=%req.idempotency_key))]
    pub async fn create_payment_intent(
        &self,
        req: &CreatePaymentIntentRequest,
    ) -> Result<PaymentIntent, StripeApiError> {
        if self.api_key.is_empty() {
            return Err(StripeApiError::Precondition("Stripe secret key is not configured"));
        }
        ensure_usd_cents(req.amount, &req.currency)
            .map_err(|_| StripeApiError::Precondition("USD currency and positive cents required"))?;

        let form = req.form_fields();

        info!(
            target: "stripe",
            method = "POST",
            path = "/v1/payment_intents",
            amount_cents = req.amount,
            currency = %req.currency,
            "stripe request"
        );

        let url = format!("{}/v1/payment_intents", self.api_base);
        let req_builder = || {
            let request = self.http.post(&url).form(&form);
            let request = self.apply_common_headers(request, Some(&req.idempotency_key));
            async move {
                let resp = request
                    .send()
                    .await
                    .map_err(|e| StripeApiError::Http(e.to_string()))?;
                let status = resp.status();
                let text = resp
                    .text()
                    .await
                    .map_err(|e| StripeApiError::Decode(e.to_string()))?;
                if status.is_success() {
                    serde_json::from_str::<PaymentIntent>(&text)
                        .map_err(|e| StripeApiError::Decode(e.to_string()))
                } else {
                    Err(Self::map_error(status, &text))
                }
            }
        };
        self.with_retries("create_payment_intent", req_builder).await
    }
}

/// Exponential backoff with full jitter, capped at `max_delay_ms`.
fn backoff_delay_ms(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    let exp = base_delay_ms.saturating_mul(1u64 << attempt.min(20));
    let cap = exp.min(max_delay_ms.max(base_delay_ms));
    if cap > base_delay_ms {
        rand::thread_rng().gen_range(base_delay_ms..=cap)
    } else {
        base_delay_ms
    }
}
