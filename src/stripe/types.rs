// Stripe DTOs and the typed views this service reads from them
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Currency used for every intent. Multi-currency checkout is not supported.
pub const CHECKOUT_CURRENCY: &str = "usd";

#[derive(Debug, Error)]
pub enum StripePreconditionError {
    #[error("currency must be USD")]
    NonUsdCurrency,
    #[error("amount must be positive cents")]
    InvalidAmount,
}

// Helper to enforce USD & cents preconditions at the API boundary.
pub fn ensure_usd_cents(amount_cents: i64, currency: &str) -> Result<(), StripePreconditionError> {
    if !currency.eq_ignore_ascii_case("usd") {
        return Err(StripePreconditionError::NonUsdCurrency);
    }
    if amount_cents <= 0 {
        return Err(StripePreconditionError::InvalidAmount);
    }
    Ok(())
}

/// Parameters for `POST /v1/payment_intents`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePaymentIntentRequest {
    pub amount: i64,
    pub currency: String,
    pub payment_method: String,
    /// Sent as the `Idempotency-Key` header so transport retries never double-charge.
    pub idempotency_key: String,
}

impl CreatePaymentIntentRequest {
    pub fn form_fields(&self) -> Vec<(String, String)> {
        vec![
            ("amount".into(), self.amount.to_string()),
            ("currency".into(), self.currency.to_ascii_lowercase()),
            ("payment_method".into(), self.payment_method.clone()),
            ("confirm".into(), "true".into()),
            ("automatic_payment_methods[enabled]".into(), "true".into()),
            ("automatic_payment_methods[allow_redirects]".into(), "never".into()),
        ]
    }
}

/// Every status Stripe documents for a PaymentIntent, plus a catch-all so new
/// upstream values still deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    Other(String),
}

impl IntentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            IntentStatus::RequiresPaymentMethod => "requires_payment_method",
            IntentStatus::RequiresConfirmation => "requires_confirmation",
            IntentStatus::RequiresAction => "requires_action",
            IntentStatus::Processing => "processing",
            IntentStatus::RequiresCapture => "requires_capture",
            IntentStatus::Canceled => "canceled",
            IntentStatus::Succeeded => "succeeded",
            IntentStatus::Other(s) => s,
        }
    }
}

impl From<String> for IntentStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "requires_payment_method" => IntentStatus::RequiresPaymentMethod,
            "requires_confirmation" => IntentStatus::RequiresConfirmation,
            "requires_action" => IntentStatus::RequiresAction,
            "processing" => IntentStatus::Processing,
            "requires_capture" => IntentStatus::RequiresCapture,
            "canceled" => IntentStatus::Canceled,
            "succeeded" => IntentStatus::Succeeded,
            _ => IntentStatus::Other(s),
        }
    }
}

impl From<IntentStatus> for String {
    fn from(status: IntentStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextAction {
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastPaymentError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// PaymentIntent minimal shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: IntentStatus,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<NextAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_payment_error: Option<LastPaymentError>,
}

impl PaymentIntent {
    pub fn next_action_type(&self) -> Option<&str> {
        self.next_action.as_ref().map(|a| a.type_.as_str())
    }
}

// Charge minimal shape, as carried by charge.refunded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub amount_refunded: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_intent: Option<String>,
}

// Checkout session minimal shape, as carried by checkout.session.completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_total: Option<i64>,
}

// Webhook event types

pub mod event_types {
    pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
    pub const PAYMENT_INTENT_PAYMENT_FAILED: &str = "payment_intent.payment_failed";
    pub const CHARGE_REFUNDED: &str = "charge.refunded";
    pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
}

/// Stripe webhook event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub livemode: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// Event payload decoded according to its type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    PaymentIntentSucceeded(PaymentIntent),
    PaymentIntentPaymentFailed(PaymentIntent),
    ChargeRefunded(Charge),
    CheckoutSessionCompleted(CheckoutSession),
    Unknown {
        event_type: String,
        object: serde_json::Value,
    },
}

/// A verified webhook event with its payload decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub created: Option<i64>,
    pub livemode: bool,
    pub payload: EventPayload,
}

impl WebhookEvent {
    /// Decode the envelope's `data.object` into the shape its type tag names.
    pub fn from_envelope(evt: StripeEvent) -> Result<Self, serde_json::Error> {
        use event_types::*;

        let object = evt.data.object;
        let payload = match evt.event_type.as_str() {
            PAYMENT_INTENT_SUCCEEDED => {
                EventPayload::PaymentIntentSucceeded(serde_json::from_value(object)?)
            }
            PAYMENT_INTENT_PAYMENT_FAILED => {
                EventPayload::PaymentIntentPaymentFailed(serde_json::from_value(object)?)
            }
            CHARGE_REFUNDED => EventPayload::ChargeRefunded(serde_json::from_value(object)?),
            CHECKOUT_SESSION_COMPLETED => {
                EventPayload::CheckoutSessionCompleted(serde_json::from_value(object)?)
            }
            other => EventPayload::Unknown {
                event_type: other.to_string(),
                object,
            },
        };

        Ok(Self {
            id: evt.id,
            event_type: evt.event_type,
            created: evt.created,
            livemode: evt.livemode.unwrap_or(false),
            payload,
        })
    }

    /// Id of the object the event is about, when the payload carries one.
    pub fn object_id(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::PaymentIntentSucceeded(pi)
            | EventPayload::PaymentIntentPaymentFailed(pi) => Some(&pi.id),
            EventPayload::ChargeRefunded(charge) => Some(&charge.id),
            EventPayload::CheckoutSessionCompleted(session) => Some(&session.id),
            EventPayload::Unknown { object, .. } => object.get("id").and_then(|v| v.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(event_type: &str, object: serde_json::Value) -> StripeEvent {
        serde_json::from_value(json!({
            "id": "evt_1",
            "type": event_type,
            "created": 1_700_000_000,
            "livemode": false,
            "data": { "object": object }
        }))
        .unwrap()
    }

    #[test]
    fn test_intent_status_parses_known_and_unknown_values() {
        let intent: PaymentIntent = serde_json::from_value(json!({
            "id": "pi_1",
            "status": "requires_action",
            "next_action": { "type": "use_stripe_sdk", "use_stripe_sdk": {} }
        }))
        .unwrap();
        assert_eq!(intent.status, IntentStatus::RequiresAction);
        assert_eq!(intent.next_action_type(), Some("use_stripe_sdk"));

        let future: IntentStatus = serde_json::from_value(json!("requires_reauth")).unwrap();
        assert_eq!(future, IntentStatus::Other("requires_reauth".to_string()));
        assert_eq!(future.to_string(), "requires_reauth");
    }

    #[test]
    fn test_form_fields_enable_automatic_methods() {
        let req = CreatePaymentIntentRequest {
            amount: 2000,
            currency: "USD".to_string(),
            payment_method: "pm_card_visa".to_string(),
            idempotency_key: "key".to_string(),
        };
        let fields = req.form_fields();
        assert!(fields.contains(&("currency".to_string(), "usd".to_string())));
        assert!(fields.contains(&("confirm".to_string(), "true".to_string())));
        assert!(fields.contains(&(
            "automatic_payment_methods[enabled]".to_string(),
            "true".to_string()
        )));
    }

    #[test]
    fn test_ensure_usd_cents() {
        assert!(ensure_usd_cents(2000, "usd").is_ok());
        assert!(matches!(
            ensure_usd_cents(2000, "eur"),
            Err(StripePreconditionError::NonUsdCurrency)
        ));
        assert!(matches!(
            ensure_usd_cents(0, "usd"),
            Err(StripePreconditionError::InvalidAmount)
        ));
    }

    #[test]
    fn test_succeeded_event_decodes_payment_intent() {
        let evt = envelope(
            event_types::PAYMENT_INTENT_SUCCEEDED,
            json!({ "id": "pi_123", "status": "succeeded", "amount": 2000, "currency": "usd" }),
        );
        let decoded = WebhookEvent::from_envelope(evt).unwrap();
        assert_eq!(decoded.object_id(), Some("pi_123"));
        match decoded.payload {
            EventPayload::PaymentIntentSucceeded(pi) => {
                assert_eq!(pi.amount, 2000);
                assert_eq!(pi.status, IntentStatus::Succeeded);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_unrecognized_event_keeps_raw_object() {
        let evt = envelope("invoice.created", json!({ "id": "in_1", "total": 10 }));
        let decoded = WebhookEvent::from_envelope(evt).unwrap();
        assert_eq!(decoded.object_id(), Some("in_1"));
        assert!(matches!(
            decoded.payload,
            EventPayload::Unknown { ref event_type, .. } if event_type == "invoice.created"
        ));
    }

    #[test]
    fn test_recognized_event_with_wrong_shape_fails() {
        let evt = envelope(event_types::CHARGE_REFUNDED, json!({ "amount": 5 }));
        assert!(WebhookEvent::from_envelope(evt).is_err());
    }
}
