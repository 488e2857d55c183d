//! Axum routes for the portal (host side).
//!
//! The ESP32 serves the same endpoints through the ESP-IDF HTTP server; both
//! wrap the logic in [`crate::handlers`].

use axum::{
    extract::{Form, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::debug;
use usbid_agent::PortalBridge;
use usbid_protocol::{ConnectForm, ScanEntry};

use crate::assets::SETUP_HTML;
use crate::handlers::{PortalError, PortalHandlers};

/// Create the portal router.
///
/// The fallback makes this a captive portal: every unknown path (including
/// the OS connectivity probes) lands on the setup page.
pub fn create_router(bridge: PortalBridge) -> Router {
    Router::new()
        .route("/", get(setup_page))
        .route("/scan", get(scan))
        .route("/connect", post(connect))
        .route("/success", get(success))
        .route("/redirect", get(redirect))
        .fallback(setup_page)
        .with_state(bridge)
}

/// `GET /` (and captive fallback).
async fn setup_page() -> Html<&'static str> {
    Html(SETUP_HTML)
}

/// `GET /scan`
async fn scan(State(bridge): State<PortalBridge>) -> Json<Vec<ScanEntry>> {
    Json(PortalHandlers::scan_list(&bridge))
}

/// `POST /connect`
async fn connect(
    State(bridge): State<PortalBridge>,
    Form(form): Form<ConnectForm>,
) -> Response {
    debug!("connect request for '{}'", form.ssid);
    match PortalHandlers::connect(&bridge, form) {
        Ok(ack) => (StatusCode::OK, ack).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

/// `GET /success` — polled by the page while credentials are verified.
async fn success(State(bridge): State<PortalBridge>) -> Response {
    if PortalHandlers::connection_established(&bridge) {
        (StatusCode::OK, "connected").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not connected").into_response()
    }
}

#[derive(Debug, Deserialize)]
struct RedirectQuery {
    url: Option<String>,
}

/// `GET /redirect?url=...`
async fn redirect(Query(query): Query<RedirectQuery>) -> Response {
    match PortalHandlers::redirect_target(query.url.as_deref()) {
        Ok(url) => (StatusCode::FOUND, [(header::LOCATION, url.to_string())], "").into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}
