//! # usbid-portal
//!
//! Captive portal for Wi-Fi provisioning.
//!
//! This crate provides:
//! - Framework-agnostic handler logic over the agent's [`PortalBridge`]
//! - An Axum router exposing the portal routes on the host
//! - The embedded setup page
//!
//! ## Architecture
//!
//! Handler logic is plain functions so it can be shared: the Axum routes
//! here wrap it on Linux, and the ESP-IDF HTTP server wraps the same
//! functions on the device.
//!
//! ## Routes
//!
//! - `GET /` — setup page (network list + credential form)
//! - `GET /scan` — JSON array of nearby networks
//! - `POST /connect` — credential form submission
//! - `GET /success` — verification poll for the page
//! - `GET /redirect?url=` — post-setup redirect helper
//! - anything else — captive-portal fallback to the setup page

pub mod assets;
pub mod handlers;
#[cfg(feature = "axum")]
pub mod routes;

pub use handlers::{PortalError, PortalHandlers};
#[cfg(feature = "axum")]
pub use routes::create_router;
