// HTTP endpoint for Stripe webhook events

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};

use crate::server::AppState;
use crate::stripe::errors::WebhookError;
use crate::stripe::webhook;

/// The body is taken as raw `Bytes`: the signature covers the exact bytes
/// Stripe sent.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match webhook::handle_webhook(
        &body,
        &headers,
        &state.stripe.webhook_secret,
        state.stripe.webhook_tolerance_seconds,
        &state.dispatcher,
        state.processed.as_ref(),
    )
    .await
    {
        Ok(outcome) => {
            info!(outcome = ?outcome, "Webhook processed successfully");
            StatusCode::OK.into_response()
        }
        Err(WebhookError::MissingSecret) => {
            error!("Stripe webhook secret is not configured");
            (StatusCode::INTERNAL_SERVER_ERROR, "Webhook secret not configured.").into_response()
        }
        Err(e) if e.is_verification_failure() => {
            warn!(error = %e, "Stripe webhook signature verification failed");
            StatusCode::BAD_REQUEST.into_response()
        }
        Err(e) => {
            error!(error = %e, "Webhook processing failed");
            e.status_code().into_response()
        }
    }
}
