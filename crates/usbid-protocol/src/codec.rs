//! JSON codec for the report/directive exchange.
//!
//! Kept separate from the message types so transports (EspHttpConnection on
//! the device, the in-process router on the simulator) deal in plain
//! strings and the parse errors stay typed.

use thiserror::Error;

use crate::messages::{DeviceReport, ServerDirectives};

/// Errors that can occur while encoding/decoding protocol messages.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Report serialization failed.
    #[error("failed to encode report: {0}")]
    Encode(serde_json::Error),

    /// The server response body was not valid directive JSON.
    #[error("malformed server response: {0}")]
    MalformedResponse(serde_json::Error),
}

/// Encode a report for the POST body.
pub fn encode_report(report: &DeviceReport) -> Result<String, CodecError> {
    serde_json::to_string(report).map_err(CodecError::Encode)
}

/// Decode a response body into directives.
///
/// A malformed body yields an error and the caller keeps every previous
/// record value.
pub fn decode_directives(body: &str) -> Result<ServerDirectives, CodecError> {
    serde_json::from_str(body).map_err(CodecError::MalformedResponse)
}
