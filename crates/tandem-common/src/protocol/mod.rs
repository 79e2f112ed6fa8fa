//! Tandem Protocol Definitions
//!
//! Core wire-level types shared by the inbound and outbound surfaces:
//!
//! - **[`TandemError`]**: the error taxonomy with stable envelope codes and
//!   the HTTP status mapping
//! - **envelope helpers**: the `{data}` / `{error, message, ...}` response
//!   envelope and its decoder
//!
//! Requests are plain JSON objects POSTed to `/<method>`; there is no
//! request-side framing beyond HTTP itself, so the protocol module is all
//! about the response shape and error classification.

pub mod envelope;
pub mod error;

pub use envelope::{decode_envelope, error_envelope, success_envelope, MAX_REQUEST_SIZE};
pub use error::{Result, TandemError, TransportClass};
