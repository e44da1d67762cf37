// Intent endpoint: validate the browser's request, create the intent, map its status

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::server::AppState;
use crate::stripe::payment_request::{FieldErrors, PaymentRequest};
use crate::stripe::types::{CreatePaymentIntentRequest, IntentStatus, PaymentIntent, CHECKOUT_CURRENCY};

pub const GENERIC_FAILURE_MESSAGE: &str = "An unexpected error occurred.";

const USE_STRIPE_SDK: &str = "use_stripe_sdk";

/// JSON returned to the checkout page. The browser branches on which keys
/// are present, so every variant serializes flat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum IntentResponse {
    RequiresAction {
        #[serde(rename = "requiresAction")]
        requires_action: bool,
        #[serde(rename = "clientSecret")]
        client_secret: String,
    },
    Succeeded {
        success: bool,
        #[serde(rename = "clientSecret")]
        client_secret: String,
    },
    Failed {
        success: bool,
        message: String,
    },
}

impl IntentResponse {
    pub fn failed(message: impl Into<String>) -> Self {
        IntentResponse::Failed {
            success: false,
            message: message.into(),
        }
    }

    /// Map an intent to what the browser should do next. Every status is
    /// listed so a new variant forces a decision here.
    pub fn from_intent(intent: &PaymentIntent) -> Self {
        let with_secret = |build: fn(String) -> IntentResponse| match &intent.client_secret {
            Some(secret) => build(secret.clone()),
            None => {
                error!(payment_intent_id = %intent.id, status = %intent.status, "PaymentIntent returned without a client secret");
                IntentResponse::failed(GENERIC_FAILURE_MESSAGE)
            }
        };

        match &intent.status {
            IntentStatus::RequiresAction if intent.next_action_type() == Some(USE_STRIPE_SDK) => {
                info!(payment_intent_id = %intent.id, "PaymentIntent requires action (e.g., 3D Secure)");
                with_secret(requires_action)
            }
            IntentStatus::Succeeded => {
                info!(payment_intent_id = %intent.id, "PaymentIntent succeeded");
                with_secret(|client_secret| IntentResponse::Succeeded {
                    success: true,
                    client_secret,
                })
            }
            IntentStatus::RequiresConfirmation => {
                info!(payment_intent_id = %intent.id, "PaymentIntent requires confirmation; returning client secret");
                with_secret(requires_action)
            }
            status @ (IntentStatus::RequiresAction
            | IntentStatus::RequiresPaymentMethod
            | IntentStatus::Processing
            | IntentStatus::RequiresCapture
            | IntentStatus::Canceled
            | IntentStatus::Other(_)) => {
                warn!(
                    payment_intent_id = %intent.id,
                    status = %status,
                    next_action = intent.next_action_type().unwrap_or("-"),
                    "Unhandled PaymentIntent status"
                );
                IntentResponse::failed(format!("Unhandled status: {}", status))
            }
        }
    }
}

fn requires_action(client_secret: String) -> IntentResponse {
    IntentResponse::RequiresAction {
        requires_action: true,
        client_secret,
    }
}

#[instrument(skip_all)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    body: Result<Json<PaymentRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Unreadable PaymentRequest body");
            return (
                StatusCode::BAD_REQUEST,
                Json(FieldErrors::unreadable_body(rejection.body_text())),
            )
                .into_response();
        }
    };

    let valid = match request.into_valid() {
        Ok(valid) => valid,
        Err(field_errors) => {
            warn!(invalid_fields = field_errors.len(), "Invalid PaymentRequest received");
            for (field, messages) in &field_errors.errors {
                for message in messages {
                    warn!(field = %field, "Model error: {}", message);
                }
            }
            return (StatusCode::BAD_REQUEST, Json(field_errors)).into_response();
        }
    };

    let create = CreatePaymentIntentRequest {
        amount: valid.amount,
        currency: CHECKOUT_CURRENCY.to_string(),
        payment_method: valid.payment_method_id,
        idempotency_key: Uuid::new_v4().to_string(),
    };

    // The Stripe call runs detached: a browser that disconnects mid-request
    // drops this handler but not the intent creation.
    let payments = Arc::clone(&state.payments);
    let task = tokio::spawn(async move { payments.create_payment_intent(&create).await });

    let response = match task.await {
        Ok(Ok(intent)) => IntentResponse::from_intent(&intent),
        Ok(Err(e)) => match e.client_message() {
            Some(message) => {
                error!(error = %e, "Stripe error creating PaymentIntent");
                IntentResponse::failed(message)
            }
            None => {
                error!(error = %e, "Unexpected error creating PaymentIntent");
                IntentResponse::failed(GENERIC_FAILURE_MESSAGE)
            }
        },
        Err(join_error) => {
            error!(error = %join_error, "PaymentIntent task did not complete");
            IntentResponse::failed(GENERIC_FAILURE_MESSAGE)
        }
    };

    Json(response).into_response()
}
