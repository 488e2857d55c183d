//! Report delivery.
//!
//! One report cycle is up to three POST attempts with a fixed spacing. The
//! cycle itself holds no clock; the supervisor asks it what to do at each
//! tick, so a retry wait never blocks the loop.

use tracing::{debug, warn};
use usbid_core::DeviceRecord;
use usbid_protocol::{
    apply_directives, decode_directives, encode_report, ApplyOutcome, CodecError, DeviceReport,
};

use crate::platform::{ReportTransport, TransportError};

/// Attempts per cycle.
pub const REPORT_ATTEMPTS: u8 = 3;
/// Fixed spacing between attempts.
pub const RETRY_SPACING_MS: u64 = 1_000;

/// Why a single attempt did not produce applied directives.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("server returned status {0}")]
    Status(u16),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// An in-flight report cycle.
#[derive(Debug)]
pub struct ReportCycle {
    attempts_left: u8,
    next_attempt_at: u64,
}

/// Result of servicing a cycle at one tick.
#[derive(Debug)]
pub enum CycleStep {
    /// Nothing due yet.
    Waiting,
    /// A response was accepted and applied.
    Delivered(ApplyOutcome),
    /// This attempt failed; the cycle will retry.
    Retrying,
    /// All attempts exhausted.
    GaveUp,
}

impl ReportCycle {
    /// Start a cycle whose first attempt is due immediately.
    pub fn new(now_ms: u64) -> Self {
        Self {
            attempts_left: REPORT_ATTEMPTS,
            next_attempt_at: now_ms,
        }
    }

    /// Service the cycle: run at most one attempt when due.
    pub fn step<T: ReportTransport>(
        &mut self,
        now_ms: u64,
        transport: &mut T,
        record: &mut DeviceRecord,
        mac: &str,
        default_url: &str,
    ) -> CycleStep {
        if now_ms < self.next_attempt_at || self.attempts_left == 0 {
            return CycleStep::Waiting;
        }

        self.attempts_left -= 1;
        match attempt_report(transport, record, mac, now_ms, default_url) {
            Ok(outcome) => {
                debug!("report accepted, changed={}", outcome.record_changed);
                CycleStep::Delivered(outcome)
            }
            Err(e) => {
                warn!("report attempt failed: {e}");
                if self.attempts_left == 0 {
                    CycleStep::GaveUp
                } else {
                    self.next_attempt_at = now_ms + RETRY_SPACING_MS;
                    CycleStep::Retrying
                }
            }
        }
    }
}

/// One POST + apply pass.
///
/// The record is only touched after the response passes the whitelist
/// decode; any failure leaves every previous value in place.
fn attempt_report<T: ReportTransport>(
    transport: &mut T,
    record: &mut DeviceRecord,
    mac: &str,
    now_ms: u64,
    default_url: &str,
) -> Result<ApplyOutcome, SyncError> {
    let report = DeviceReport::from_record(record, mac, now_ms);
    let body = encode_report(&report)?;
    let url = record.effective_server_url(default_url).to_string();

    let response = transport.post_json(&url, &body)?;
    if response.status != 200 {
        return Err(SyncError::Status(response.status));
    }

    let directives = decode_directives(&response.body)?;
    Ok(apply_directives(record, &directives))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::HttpResponse;

    /// Transport mock: scripted responses, captured requests.
    struct ScriptedTransport {
        responses: Vec<Result<HttpResponse, TransportError>>,
        requests: Vec<(String, String)>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<HttpResponse, TransportError>>) -> Self {
            Self {
                responses,
                requests: Vec::new(),
            }
        }
    }

    impl ReportTransport for ScriptedTransport {
        fn post_json(&mut self, url: &str, body: &str) -> Result<HttpResponse, TransportError> {
            self.requests.push((url.to_string(), body.to_string()));
            if self.responses.is_empty() {
                Err(TransportError::Request("no response scripted".into()))
            } else {
                self.responses.remove(0)
            }
        }
    }

    fn ok(body: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status: 200,
            body: body.to_string(),
        })
    }

    const MAC: &str = "5C:CF:7F:0A:1B:2C";
    const DEFAULT_URL: &str = "http://192.168.1.100/api/device";

    #[test]
    fn test_delivery_applies_directives() {
        let mut transport =
            ScriptedTransport::new(vec![ok(r#"{"text":"Claimed","status":"OK"}"#)]);
        let mut record = DeviceRecord::first_boot("USBID-0A1B2C");
        let mut cycle = ReportCycle::new(0);

        match cycle.step(0, &mut transport, &mut record, MAC, DEFAULT_URL) {
            CycleStep::Delivered(outcome) => assert!(outcome.record_changed),
            other => panic!("expected Delivered, got {other:?}"),
        }

        assert_eq!(record.text.as_str(), "Claimed");
        assert!(record.initialized);
        // The hello marker was on the wire for the first contact.
        assert!(transport.requests[0].1.contains("\"hello\""));
        assert_eq!(transport.requests[0].0, DEFAULT_URL);
    }

    #[test]
    fn test_retry_spacing_then_success() {
        let mut transport = ScriptedTransport::new(vec![
            Err(TransportError::Request("connect refused".into())),
            ok("{}"),
        ]);
        let mut record = DeviceRecord::first_boot("b");
        let mut cycle = ReportCycle::new(0);

        assert!(matches!(
            cycle.step(0, &mut transport, &mut record, MAC, DEFAULT_URL),
            CycleStep::Retrying
        ));
        // Not due again until the fixed spacing elapses.
        assert!(matches!(
            cycle.step(500, &mut transport, &mut record, MAC, DEFAULT_URL),
            CycleStep::Waiting
        ));
        assert!(matches!(
            cycle.step(1_000, &mut transport, &mut record, MAC, DEFAULT_URL),
            CycleStep::Delivered(_)
        ));
    }

    #[test]
    fn test_gives_up_after_three_attempts() {
        let mut transport = ScriptedTransport::new(vec![
            Err(TransportError::Request("down".into())),
            Err(TransportError::Request("down".into())),
            Err(TransportError::Request("down".into())),
        ]);
        let mut record = DeviceRecord::first_boot("b");
        record.mark_initialized();
        let before = record.clone();
        let mut cycle = ReportCycle::new(0);

        assert!(matches!(
            cycle.step(0, &mut transport, &mut record, MAC, DEFAULT_URL),
            CycleStep::Retrying
        ));
        assert!(matches!(
            cycle.step(1_000, &mut transport, &mut record, MAC, DEFAULT_URL),
            CycleStep::Retrying
        ));
        assert!(matches!(
            cycle.step(2_000, &mut transport, &mut record, MAC, DEFAULT_URL),
            CycleStep::GaveUp
        ));

        // Failure keeps previous values.
        assert_eq!(record, before);
        assert_eq!(transport.requests.len(), 3);
    }

    #[test]
    fn test_non_200_is_a_failed_attempt() {
        let mut transport = ScriptedTransport::new(vec![
            Ok(HttpResponse {
                status: 503,
                body: "busy".into(),
            }),
            ok("{}"),
        ]);
        let mut record = DeviceRecord::first_boot("b");
        let mut cycle = ReportCycle::new(0);

        assert!(matches!(
            cycle.step(0, &mut transport, &mut record, MAC, DEFAULT_URL),
            CycleStep::Retrying
        ));
    }

    #[test]
    fn test_malformed_body_keeps_previous_values() {
        let mut transport = ScriptedTransport::new(vec![
            Ok(HttpResponse {
                status: 200,
                body: "<html>oops</html>".into(),
            }),
        ]);
        let mut record = DeviceRecord::first_boot("b");
        record.set_text("before");
        let mut cycle = ReportCycle::new(0);

        assert!(matches!(
            cycle.step(0, &mut transport, &mut record, MAC, DEFAULT_URL),
            CycleStep::Retrying
        ));
        assert_eq!(record.text.as_str(), "before");
    }

    #[test]
    fn test_server_url_override_used() {
        let mut transport = ScriptedTransport::new(vec![ok("{}"), ok("{}")]);
        let mut record = DeviceRecord::first_boot("b");
        record.set_server_url("https://id.example.net/api/device");

        let mut cycle = ReportCycle::new(0);
        cycle.step(0, &mut transport, &mut record, MAC, DEFAULT_URL);
        assert_eq!(
            transport.requests[0].0,
            "https://id.example.net/api/device"
        );
    }
}
