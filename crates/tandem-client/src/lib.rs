//! Tandem Outbound Client
//!
//! The client half of a Tandem endpoint: invoke named methods on peer
//! endpoints over HTTP/2 with the full resilience pipeline around every
//! call.
//!
//! # Pipeline
//!
//! 1. Input validation (URL, method name, params object)
//! 2. Circuit-breaker gate per target URL: an open circuit fails fast with
//!    `CIRCUIT_OPEN` and performs no I/O
//! 3. Retry loop with exponential backoff and jitter
//! 4. Each attempt: its own HTTP/2 session bounded by the connection
//!    timeout, `POST /<method>` bounded by the request timeout
//! 5. Envelope decode: `{data}` returns the value, `{error, message}` and
//!    HTTP error statuses surface as classified errors
//!
//! # Example
//!
//! ```no_run
//! use tandem_client::{CallOptions, TandemClient};
//! use tandem_common::EndpointConfig;
//! use serde_json::json;
//!
//! # async fn run() -> tandem_common::Result<()> {
//! let client = TandemClient::new(EndpointConfig::default())?;
//! let result = client
//!     .call("http://127.0.0.1:3000", "add", json!({"a": 5, "b": 3}), &CallOptions::default())
//!     .await?;
//! assert_eq!(result["result"], 8);
//! # Ok(())
//! # }
//! ```

mod client;

pub use client::{CallOptions, TandemClient};
