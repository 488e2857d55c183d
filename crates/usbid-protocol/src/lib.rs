//! # usbid-protocol
//!
//! Wire protocol between the device and the identity server, plus the
//! captive-portal message shapes.
//!
//! The device POSTs a [`DeviceReport`] as JSON and applies a whitelisted
//! subset of the JSON response ([`ServerDirectives`]) to its records.
//! Everything else in a response is ignored.

pub mod apply;
pub mod codec;
pub mod messages;

pub use apply::{apply_directives, ApplyOutcome};
pub use codec::{decode_directives, encode_report, CodecError};
pub use messages::{ConnectForm, DeviceReport, ScanEntry, ServerDirectives, WifiDirective};
