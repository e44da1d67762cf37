pub mod payment;
pub mod views;
pub mod webhook;

use anyhow::Result;
use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::settings::{Config, StripeSettings};
use crate::stripe::dispatch::EventDispatcher;
use crate::stripe::processed_events::{InMemoryProcessedEvents, NoDedup, ProcessedEvents};
use crate::stripe::{PaymentIntents, StripeProvider};

/// Shared, read-only request state. The only interior mutability lives
/// behind `processed`.
#[derive(Clone)]
pub struct AppState {
    pub stripe: Arc<StripeSettings>,
    pub payments: Arc<dyn PaymentIntents>,
    pub dispatcher: Arc<EventDispatcher>,
    pub processed: Arc<dyn ProcessedEvents>,
}

impl AppState {
    pub fn try_new(cfg: &Config) -> Result<Self> {
        let provider = StripeProvider::new(&cfg.stripe)?;
        let processed: Arc<dyn ProcessedEvents> = if cfg.stripe.event_dedup_ttl.is_zero() {
            Arc::new(NoDedup)
        } else {
            Arc::new(InMemoryProcessedEvents::new(cfg.stripe.event_dedup_ttl))
        };

        Ok(Self {
            stripe: Arc::new(cfg.stripe.clone()),
            payments: Arc::new(provider),
            dispatcher: Arc::new(EventDispatcher::with_default_handlers()),
            processed,
        })
    }
}

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/Payment/Checkout", get(views::checkout))
        .route("/Payment/Success", get(views::success))
        .route(
            "/Payment/CreatePaymentIntent",
            post(payment::create_payment_intent),
        )
        .route("/api/stripe/webhook", post(webhook::stripe_webhook))
        .route("/health", get(health_check))
        .fallback(not_found)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start(cfg: &Config, state: AppState) -> Result<()> {
    let app = router(state, cfg.request_timeout);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server_port));
    let listener = TcpListener::bind(addr).await?;

    info!(addr = %addr, "Starting checkout HTTP server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received ctrl+C signal");
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "NOT_FOUND")
}
