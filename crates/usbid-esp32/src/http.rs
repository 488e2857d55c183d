//! HTTP on the device: the outbound report transport and the portal server.
//!
//! Reports go out over `EspHttpConnection` with the global CA store so an
//! HTTPS endpoint verifies out of the box. The portal server wraps the
//! framework-agnostic handlers from `usbid-portal` with ESP-IDF's HTTP
//! server; captive behavior comes from answering the common OS probe paths
//! with the setup page.

use std::time::Duration;

use embedded_svc::http::client::Client;
use embedded_svc::io::{Read, Write};
use esp_idf_svc::http::client::{Configuration as HttpConfiguration, EspHttpConnection};
use esp_idf_svc::http::server::{Configuration as ServerConfiguration, EspHttpServer, Method};
use log::info;

use usbid_agent::platform::{HttpResponse, ReportTransport, TransportError};
use usbid_agent::PortalBridge;
use usbid_portal::assets::SETUP_HTML;
use usbid_portal::handlers::PortalHandlers;

/// Report request timeout.
const TIMEOUT_MS: u64 = 15_000;
/// Cap on response bodies; directives are tiny.
const MAX_RESPONSE: usize = 8 * 1024;
/// Cap on portal form bodies.
const MAX_FORM_BODY: usize = 1024;

/// Connectivity probe paths that must land on the setup page for the
/// captive portal to pop up on phones and laptops.
const PROBE_PATHS: &[&str] = &[
    "/generate_204",
    "/gen_204",
    "/hotspot-detect.html",
    "/connecttest.txt",
    "/ncsi.txt",
    "/fwlink",
];

/// Outbound report transport over the ESP-IDF HTTP client.
pub struct EspTransport;

impl EspTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EspTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportTransport for EspTransport {
    fn post_json(&mut self, url: &str, body: &str) -> Result<HttpResponse, TransportError> {
        let config = HttpConfiguration {
            timeout: Some(Duration::from_millis(TIMEOUT_MS)),
            use_global_ca_store: true,
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let connection =
            EspHttpConnection::new(&config).map_err(|e| TransportError::Request(e.to_string()))?;
        let mut client = Client::wrap(connection);

        let mut request = client
            .post(url, &[("Content-Type", "application/json")])
            .map_err(|e| TransportError::Request(e.to_string()))?;
        request
            .write_all(body.as_bytes())
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let mut response = request
            .submit()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        let mut bytes: Vec<u8> = Vec::new();
        let mut buf = [0u8; 512];
        loop {
            let n = response
                .read(&mut buf)
                .map_err(|e| TransportError::Request(e.to_string()))?;
            if n == 0 {
                break;
            }
            bytes.extend_from_slice(&buf[..n]);
            if bytes.len() > MAX_RESPONSE {
                return Err(TransportError::Request("response too large".to_string()));
            }
        }

        let body = String::from_utf8_lossy(&bytes).into_owned();
        Ok(HttpResponse { status, body })
    }
}

/// Bring up the portal server on port 80.
///
/// The returned server must be kept alive; dropping it unregisters every
/// handler.
pub fn start_portal_server(bridge: PortalBridge) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = ServerConfiguration {
        stack_size: 16 * 1024,
        ..Default::default()
    };
    let mut server = EspHttpServer::new(&conf)?;

    server.fn_handler::<anyhow::Error, _>("/", Method::Get, move |req| {
        req.into_ok_response()?.write_all(SETUP_HTML.as_bytes())?;
        Ok(())
    })?;

    for path in PROBE_PATHS {
        server.fn_handler::<anyhow::Error, _>(path, Method::Get, move |req| {
            req.into_ok_response()?.write_all(SETUP_HTML.as_bytes())?;
            Ok(())
        })?;
    }

    {
        let bridge = bridge.clone();
        server.fn_handler::<anyhow::Error, _>("/scan", Method::Get, move |req| {
            let body = PortalHandlers::scan_json(&bridge)?;
            req.into_response(200, Some("OK"), &[("Content-Type", "application/json")])?
                .write_all(body.as_bytes())?;
            Ok(())
        })?;
    }

    {
        let bridge = bridge.clone();
        server.fn_handler::<anyhow::Error, _>("/connect", Method::Post, move |mut req| {
            let len = req.content_len().unwrap_or(0) as usize;
            if len > MAX_FORM_BODY {
                req.into_status_response(413)?.write_all(b"form too large")?;
                return Ok(());
            }
            let mut body = vec![0u8; len];
            if len > 0 {
                req.read_exact(&mut body)?;
            }
            let form = PortalHandlers::parse_connect_form(&String::from_utf8_lossy(&body));
            match PortalHandlers::connect(&bridge, form) {
                Ok(ack) => {
                    req.into_ok_response()?.write_all(ack.as_bytes())?;
                }
                Err(e) => {
                    req.into_status_response(400)?
                        .write_all(e.to_string().as_bytes())?;
                }
            }
            Ok(())
        })?;
    }

    {
        let bridge = bridge.clone();
        server.fn_handler::<anyhow::Error, _>("/success", Method::Get, move |req| {
            if PortalHandlers::connection_established(&bridge) {
                req.into_ok_response()?.write_all(b"connected")?;
            } else {
                req.into_status_response(503)?.write_all(b"not connected")?;
            }
            Ok(())
        })?;
    }

    server.fn_handler::<anyhow::Error, _>("/redirect", Method::Get, move |req| {
        let uri = req.uri().to_string();
        let url = query_param(&uri, "url");
        match PortalHandlers::redirect_target(url.as_deref()) {
            Ok(target) => {
                req.into_response(302, None, &[("Location", target)])?;
            }
            Err(e) => {
                req.into_status_response(400)?
                    .write_all(e.to_string().as_bytes())?;
            }
        }
        Ok(())
    })?;

    info!("portal server up on port 80");
    Ok(server)
}

fn query_param(uri: &str, key: &str) -> Option<String> {
    let query = uri.split_once('?')?.1;
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        let name = parts.next()?;
        let value = parts.next().unwrap_or_default();
        if name == key {
            return Some(value.replace('+', " "));
        }
    }

    None
}
