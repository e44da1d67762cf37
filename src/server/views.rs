// Server-rendered checkout and confirmation pages

use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::error;

use crate::server::AppState;

#[derive(Template)]
#[template(path = "checkout.html")]
pub struct CheckoutTemplate<'a> {
    pub publishable_key: &'a str,
}

#[derive(Template)]
#[template(path = "success.html")]
pub struct SuccessTemplate;

pub async fn checkout(State(state): State<AppState>) -> Response {
    if state.stripe.publishable_key.is_empty() {
        error!("Stripe publishable key is missing");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Stripe publishable key is missing.",
        )
            .into_response();
    }

    render(CheckoutTemplate {
        publishable_key: &state.stripe.publishable_key,
    })
}

pub async fn success() -> Response {
    render(SuccessTemplate)
}

fn render(template: impl Template) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render template");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
