// Stripe webhook handling with signature verification and event processing

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, instrument};

use crate::stripe::dispatch::{Dispatch, EventDispatcher};
use crate::stripe::errors::WebhookError;
use crate::stripe::processed_events::ProcessedEvents;
use crate::stripe::types::{StripeEvent, WebhookEvent};

type HmacSha256 = Hmac<Sha256>;

// Lowercase so it doubles as a static `HeaderName`; lookups are case-insensitive.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Handled,
    Unhandled,
    Duplicate,
}

/// Main webhook handler - verifies signature, skips duplicates and dispatches
#[instrument(skip_all, fields(event_id = tracing::field::Empty, event_type = tracing::field::Empty))]
pub async fn handle_webhook(
    payload: &[u8],
    headers: &http::HeaderMap,
    webhook_secret: &str,
    tolerance_seconds: i64,
    dispatcher: &EventDispatcher,
    processed: &dyn ProcessedEvents,
) -> Result<WebhookOutcome, WebhookError> {
    let event = construct_event(payload, headers, webhook_secret, tolerance_seconds)?;

    info!(
        object_id = event.object_id().unwrap_or("-"),
        livemode = event.livemode,
        "Stripe event verified"
    );

    if processed.is_processed(&event.id).await {
        info!("Skipping duplicate event delivery");
        return Ok(WebhookOutcome::Duplicate);
    }

    let outcome = match dispatcher.dispatch(&event).await? {
        Dispatch::Handled => WebhookOutcome::Handled,
        Dispatch::Unhandled => WebhookOutcome::Unhandled,
    };
    processed.mark_processed(&event.id).await;

    Ok(outcome)
}

/// Verify the signature on `payload` and decode it into a typed event.
pub fn construct_event(
    payload: &[u8],
    headers: &http::HeaderMap,
    webhook_secret: &str,
    tolerance_seconds: i64,
) -> Result<WebhookEvent, WebhookError> {
    if webhook_secret.is_empty() {
        return Err(WebhookError::MissingSecret);
    }

    let signature_header = headers
        .get(SIGNATURE_HEADER)
        .ok_or(WebhookError::MissingSignature)?
        .to_str()
        .map_err(|e| WebhookError::InvalidSignature(format!("Invalid header encoding: {}", e)))?;

    verify_signature(
        payload,
        signature_header,
        webhook_secret,
        tolerance_seconds,
        unix_now()?,
    )?;

    let envelope: StripeEvent = serde_json::from_slice(payload)
        .map_err(|e| WebhookError::MalformedPayload(format!("JSON parse error: {}", e)))?;

    tracing::Span::current()
        .record("event_id", tracing::field::display(&envelope.id))
        .record("event_type", tracing::field::display(&envelope.event_type));

    let event_id = envelope.id.clone();
    let event_type = envelope.event_type.clone();
    let object_id = envelope
        .data
        .object
        .get("id")
        .and_then(|id| id.as_str())
        .map(str::to_owned);

    WebhookEvent::from_envelope(envelope).map_err(|e| {
        error!(
            event_id = %event_id,
            event_type = %event_type,
            object_id = object_id.as_deref().unwrap_or("-"),
            error = %e,
            "Failed to decode event payload"
        );
        WebhookError::ProcessingFailed(format!("Failed to decode {} payload: {}", event_type, e))
    })
}

fn unix_now() -> Result<i64, WebhookError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .map_err(|e| WebhookError::ProcessingFailed(format!("System time error: {}", e)))
}

/// Verify a `Stripe-Signature` header (`t=timestamp,v1=signature[,v1=...]`)
/// against the exact payload bytes. `now` is unix seconds; a non-positive
/// tolerance disables the timestamp check.
pub fn verify_signature(
    payload: &[u8],
    signature_header: &str,
    webhook_secret: &str,
    tolerance_seconds: i64,
    now: i64,
) -> Result<(), WebhookError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse().ok(),
            Some(("v1", v)) => signatures.push(v),
            _ => {} // v0 and unknown schemes are ignored
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        WebhookError::InvalidSignature("Missing timestamp in signature header".to_string())
    })?;

    if signatures.is_empty() {
        return Err(WebhookError::InvalidSignature(
            "No v1 signature found".to_string(),
        ));
    }

    if tolerance_seconds > 0 {
        // `t` is attacker-controlled; abs_diff cannot overflow
        let time_diff = now.abs_diff(timestamp);
        if time_diff > tolerance_seconds.unsigned_abs() {
            return Err(WebhookError::TimestampTolerance(format!(
                "Timestamp {} differs from current time {} by {} seconds (tolerance: {})",
                timestamp, now, time_diff, tolerance_seconds
            )));
        }
    }

    let mac = signed_payload_mac(webhook_secret, timestamp, payload)?;

    // verify_slice compares in constant time
    let signature_valid = signatures.iter().any(|sig| {
        hex::decode(sig)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if !signature_valid {
        return Err(WebhookError::InvalidSignature(format!(
            "No matching v1 signature among {} candidate(s)",
            signatures.len()
        )));
    }

    debug!(timestamp = timestamp, "Webhook signature verified successfully");

    Ok(())
}

/// Hex HMAC-SHA256 of `timestamp.payload`, the value Stripe puts in `v1`.
#[cfg(test)]
pub fn compute_signature(
    webhook_secret: &str,
    timestamp: i64,
    payload: &[u8],
) -> Result<String, WebhookError> {
    let mac = signed_payload_mac(webhook_secret, timestamp, payload)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn signed_payload_mac(
    webhook_secret: &str,
    timestamp: i64,
    payload: &[u8],
) -> Result<HmacSha256, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
        .map_err(|e| WebhookError::ProcessingFailed(format!("HMAC init error: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stripe::dispatch::EventHandler;
    use crate::stripe::processed_events::{InMemoryProcessedEvents, NoDedup};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tracing_test::traced_test;

    const SECRET: &str = "whsec_test_secret";
    const SUCCEEDED: &[u8] = br#"{"id":"evt_test","type":"payment_intent.succeeded","data":{"object":{"id":"pi_123","status":"succeeded","amount":2000,"currency":"usd"}}}"#;

    fn signed_headers(payload: &[u8], timestamp: i64) -> http::HeaderMap {
        let signature = compute_signature(SECRET, timestamp, payload).unwrap();
        let mut headers = http::HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            format!("t={},v1={}", timestamp, signature).parse().unwrap(),
        );
        headers
    }

    fn now() -> i64 {
        unix_now().unwrap()
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHandler for Counting {
        async fn handle(&self, _event: &WebhookEvent) -> Result<(), WebhookError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_verify_signature_valid() {
        let timestamp = 1_234_567_890;
        let signature = compute_signature(SECRET, timestamp, SUCCEEDED).unwrap();
        let header = format!("t={},v1={}", timestamp, signature);

        assert!(verify_signature(SUCCEEDED, &header, SECRET, 300, timestamp + 10).is_ok());
    }

    #[test]
    fn test_verify_signature_accepts_any_matching_v1() {
        let timestamp = 1_234_567_890;
        let signature = compute_signature(SECRET, timestamp, SUCCEEDED).unwrap();
        let header = format!("t={},v0=abc,v1={},v1={}", timestamp, "00".repeat(32), signature);

        assert!(verify_signature(SUCCEEDED, &header, SECRET, 300, timestamp).is_ok());
    }

    #[test]
    fn test_tampering_with_any_byte_fails_verification() {
        let timestamp = 1_234_567_890;
        let signature = compute_signature(SECRET, timestamp, SUCCEEDED).unwrap();
        let header = format!("t={},v1={}", timestamp, signature);

        for i in 0..SUCCEEDED.len() {
            let mut tampered = SUCCEEDED.to_vec();
            tampered[i] ^= 0x01;
            let result = verify_signature(&tampered, &header, SECRET, 300, timestamp);
            assert!(
                matches!(result, Err(WebhookError::InvalidSignature(_))),
                "byte {} tampered but verification passed",
                i
            );
        }
    }

    #[test]
    fn test_signature_covers_non_utf8_bytes() {
        let timestamp = 1_234_567_890;
        let payload = [0xff, 0xfe, b'{', b'}'];
        let lossy_twin = [0xfe, 0xff, b'{', b'}'];
        let signature = compute_signature(SECRET, timestamp, &payload).unwrap();
        let header = format!("t={},v1={}", timestamp, signature);

        assert!(verify_signature(&payload, &header, SECRET, 0, timestamp).is_ok());
        assert!(verify_signature(&lossy_twin, &header, SECRET, 0, timestamp).is_err());
    }

    #[test]
    fn test_verify_signature_wrong_secret() {
        let timestamp = 1_234_567_890;
        let signature = compute_signature("whsec_other", timestamp, SUCCEEDED).unwrap();
        let header = format!("t={},v1={}", timestamp, signature);

        let result = verify_signature(SUCCEEDED, &header, SECRET, 300, timestamp);
        assert!(matches!(result, Err(WebhookError::InvalidSignature(_))));
    }

    #[test]
    fn test_verify_signature_malformed_header() {
        for header in ["", "garbage", "t=abc,v1=00", "v1=00", "t=1234567890"] {
            let result = verify_signature(SUCCEEDED, header, SECRET, 300, 1_234_567_890);
            assert!(
                matches!(result, Err(WebhookError::InvalidSignature(_))),
                "header {:?} accepted",
                header
            );
        }
    }

    #[test]
    fn test_verify_signature_timestamp_tolerance() {
        let old_timestamp = 1000;
        let signature = compute_signature(SECRET, old_timestamp, SUCCEEDED).unwrap();
        let header = format!("t={},v1={}", old_timestamp, signature);

        let result = verify_signature(SUCCEEDED, &header, SECRET, 300, 1_234_567_890);
        assert!(matches!(result, Err(WebhookError::TimestampTolerance(_))));
    }

    #[test]
    fn test_extreme_timestamps_fail_closed() {
        let header_for = |t: i64| format!("t={},v1={}", t, "00".repeat(32));

        for timestamp in [i64::MIN, i64::MAX] {
            let result = verify_signature(SUCCEEDED, &header_for(timestamp), SECRET, 300, 1_700_000_000);
            assert!(
                matches!(result, Err(WebhookError::TimestampTolerance(_))),
                "t={} not rejected",
                timestamp
            );
        }

        // Stale timestamps are still rejected when the clock itself is extreme
        let result = verify_signature(SUCCEEDED, &header_for(i64::MAX), SECRET, 300, i64::MIN);
        assert!(matches!(result, Err(WebhookError::TimestampTolerance(_))));
    }

    #[test]
    fn test_construct_event_missing_secret_checked_first() {
        let headers = http::HeaderMap::new();
        let result = construct_event(SUCCEEDED, &headers, "", 300);
        assert!(matches!(result, Err(WebhookError::MissingSecret)));
    }

    #[test]
    fn test_construct_event_missing_header() {
        let headers = http::HeaderMap::new();
        let result = construct_event(SUCCEEDED, &headers, SECRET, 300);
        assert!(matches!(result, Err(WebhookError::MissingSignature)));
    }

    #[test]
    fn test_construct_event_malformed_json_after_valid_signature() {
        let payload = b"not json";
        let headers = signed_headers(payload, now());
        let result = construct_event(payload, &headers, SECRET, 300);
        assert!(matches!(result, Err(WebhookError::MalformedPayload(_))));
    }

    #[test]
    #[traced_test]
    fn test_decode_failure_logs_event_and_object_ids() {
        let payload = br#"{"id":"evt_bad","type":"payment_intent.succeeded","data":{"object":{"id":"pi_bad","amount":"lots"}}}"#;
        let headers = signed_headers(payload, now());

        let result = construct_event(payload, &headers, SECRET, 300);
        assert!(matches!(result, Err(WebhookError::ProcessingFailed(_))));
        assert!(logs_contain("Failed to decode event payload"));
        assert!(logs_contain("evt_bad"));
        assert!(logs_contain("pi_bad"));
    }

    #[test]
    fn test_construct_event_wrong_shape_for_known_type() {
        let payload = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"amount":1}}}"#;
        let headers = signed_headers(payload, now());
        let result = construct_event(payload, &headers, SECRET, 300);
        assert!(matches!(result, Err(WebhookError::ProcessingFailed(_))));
    }

    #[tokio::test]
    async fn test_handle_webhook_dispatches_succeeded_event() {
        let headers = signed_headers(SUCCEEDED, now());
        let dispatcher = EventDispatcher::with_default_handlers();

        let outcome = handle_webhook(SUCCEEDED, &headers, SECRET, 300, &dispatcher, &NoDedup)
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Handled);
    }

    #[tokio::test]
    async fn test_handle_webhook_unknown_type_is_unhandled() {
        let payload = br#"{"id":"evt_2","type":"invoice.created","data":{"object":{"id":"in_1"}}}"#;
        let headers = signed_headers(payload, now());
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher = EventDispatcher::with_default_handlers()
            .register("payment_intent.payment_failed", Counting(count.clone()));

        let outcome = handle_webhook(payload, &headers, SECRET, 300, &dispatcher, &NoDedup)
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Unhandled);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handle_webhook_skips_redelivered_event() {
        let headers = signed_headers(SUCCEEDED, now());
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher =
            EventDispatcher::new().register("payment_intent.succeeded", Counting(count.clone()));
        let processed = InMemoryProcessedEvents::new(Duration::from_secs(60));

        let first = handle_webhook(SUCCEEDED, &headers, SECRET, 300, &dispatcher, &processed)
            .await
            .unwrap();
        let second = handle_webhook(SUCCEEDED, &headers, SECRET, 300, &dispatcher, &processed)
            .await
            .unwrap();

        assert_eq!(first, WebhookOutcome::Handled);
        assert_eq!(second, WebhookOutcome::Duplicate);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handle_webhook_rejects_bad_signature_without_dispatch() {
        let mut headers = signed_headers(SUCCEEDED, now());
        headers.insert(
            SIGNATURE_HEADER,
            format!("t={},v1={}", now(), "ab".repeat(32)).parse().unwrap(),
        );
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher =
            EventDispatcher::new().register("payment_intent.succeeded", Counting(count.clone()));

        let err = handle_webhook(SUCCEEDED, &headers, SECRET, 300, &dispatcher, &NoDedup)
            .await
            .unwrap_err();
        assert!(err.is_verification_failure());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
