// Stripe-specific error types and their HTTP mappings

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StripeErrorType {
    ApiConnectionError,
    ApiError,
    AuthenticationError,
    CardError,
    IdempotencyError,
    InvalidRequestError,
    RateLimitError,
    ValidationError,
    Unknown,
}

impl From<&str> for StripeErrorType {
    fn from(s: &str) -> Self {
        match s {
            "api_connection_error" => StripeErrorType::ApiConnectionError,
            "api_error" => StripeErrorType::ApiError,
            "authentication_error" => StripeErrorType::AuthenticationError,
            "card_error" => StripeErrorType::CardError,
            "idempotency_error" => StripeErrorType::IdempotencyError,
            "invalid_request_error" => StripeErrorType::InvalidRequestError,
            "rate_limit_error" => StripeErrorType::RateLimitError,
            "validation_error" => StripeErrorType::ValidationError,
            _ => StripeErrorType::Unknown,
        }
    }
}

// Stripe REST error envelope: { error: { type, code, decline_code, message, param } }
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeErrorEnvelope {
    pub error: StripeErrorDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeErrorDetails {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decline_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

impl StripeErrorEnvelope {
    pub fn to_api_error_with_status(self, status: Option<u16>) -> StripeApiError {
        StripeApiError::Stripe {
            type_: StripeErrorType::from(self.error.type_.as_str()),
            message: self.error.message,
            code: self.error.code,
            decline_code: self.error.decline_code,
            param: self.error.param,
            status,
        }
    }
}

pub const UNAVAILABLE_MESSAGE: &str = "Payment service is unavailable. Please try again.";
pub const REJECTED_MESSAGE: &str = "The payment was rejected.";

#[derive(Debug, Error)]
pub enum StripeApiError {
    #[error("http error: {0}")]
    Http(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("stripe error: {type_:?} message={message:?} code={code:?} decline_code={decline_code:?} param={param:?}")]
    Stripe {
        type_: StripeErrorType,
        message: Option<String>,
        code: Option<String>,
        decline_code: Option<String>,
        param: Option<String>,
        status: Option<u16>,
    },
    #[error("precondition failed: {0}")]
    Precondition(&'static str),
}

impl StripeApiError {
    /// Whether a retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StripeApiError::Stripe { status, type_, .. } => is_transient(*status, Some(type_)),
            StripeApiError::Http(_) => true,
            StripeApiError::Decode(_) | StripeApiError::Precondition(_) => false,
        }
    }

    /// Message safe to hand back to the browser. `None` means the failure is
    /// internal and only a generic message may be shown.
    pub fn client_message(&self) -> Option<String> {
        match self {
            StripeApiError::Stripe { message, .. } => {
                Some(message.clone().unwrap_or_else(|| REJECTED_MESSAGE.to_string()))
            }
            StripeApiError::Http(_) => Some(UNAVAILABLE_MESSAGE.to_string()),
            StripeApiError::Decode(_) | StripeApiError::Precondition(_) => None,
        }
    }
}

// Helper indicating whether an error is likely transient (api_error or 5xx)
pub fn is_transient(http_status: Option<u16>, type_: Option<&StripeErrorType>) -> bool {
    if let Some(s) = http_status {
        if (500..600).contains(&s) {
            return true;
        }
    }
    if let Some(t) = type_ {
        matches!(
            t,
            StripeErrorType::ApiConnectionError
                | StripeErrorType::ApiError
                | StripeErrorType::RateLimitError
        )
    } else {
        false
    }
}

// Webhook-specific errors
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("timestamp tolerance exceeded: {0}")]
    TimestampTolerance(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("missing webhook secret")]
    MissingSecret,
    #[error("missing signature header")]
    MissingSignature,
    #[error("event processing failed: {0}")]
    ProcessingFailed(String),
}

impl WebhookError {
    /// Signature problems and unreadable bodies are the caller's fault; a
    /// missing secret or a failing handler is ours.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature(_)
            | WebhookError::MissingSignature
            | WebhookError::TimestampTolerance(_)
            | WebhookError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            WebhookError::MissingSecret | WebhookError::ProcessingFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            WebhookError::InvalidSignature(_)
                | WebhookError::MissingSignature
                | WebhookError::TimestampTolerance(_)
        )
    }
}
