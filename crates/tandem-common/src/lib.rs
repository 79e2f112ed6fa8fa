//! Tandem Common Types
//!
//! Shared foundation for the Tandem RPC endpoint: the response envelope and
//! error taxonomy, the endpoint configuration surface, and the JWT RS256
//! verifier.
//!
//! # Overview
//!
//! Tandem is a bidirectional RPC endpoint over HTTP/2: one process serves
//! named methods against JSON bodies and invokes methods on peer endpoints,
//! with a resilience pipeline (timeout, circuit breaker, retry, per-method
//! bulkhead) wrapping every request. This crate holds everything both sides
//! agree on:
//!
//! - [`protocol`] - response envelope, error codes, HTTP status mapping
//! - [`config`] - endpoint options with eager validation
//! - [`auth`] - stateless RS256 bearer-token verification
//!
//! # Example
//!
//! ```
//! use tandem_common::protocol::{success_envelope, TandemError};
//! use serde_json::json;
//!
//! let ok = success_envelope(json!({"result": 8}));
//! assert_eq!(ok["data"]["result"], 8);
//!
//! let err = TandemError::MethodNotFound {
//!     method: "ghost".into(),
//!     available: vec!["echo".into()],
//! };
//! assert_eq!(err.code(), "METHOD_NOT_FOUND");
//! ```

pub mod auth;
pub mod config;
pub mod protocol;

pub use config::EndpointConfig;
pub use protocol::{Result, TandemError};
