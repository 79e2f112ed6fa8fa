//! Tandem Server
//!
//! The server half of a Tandem endpoint: an HTTP/2 listener dispatching
//! `POST /<method>` requests against registered handlers, with JWT RS256
//! authentication, per-method bulkhead admission, response envelopes, and a
//! `/health-check` report.
//!
//! # Architecture
//!
//! - [`Endpoint`] - the process-wide object owning the method registry, the
//!   resilience registries, metrics, and the listening server; also exposes
//!   the outbound [`call`](Endpoint::call) surface through an embedded
//!   client sharing the same breaker state
//! - `dispatcher` - the inbound request lifecycle
//! - `http_server` - accept loop with graceful shutdown
//! - `health` - the `/health-check` report
//!
//! # Example
//!
//! ```no_run
//! use tandem_server::{handler, Endpoint};
//! use tandem_common::EndpointConfig;
//! use serde_json::json;
//!
//! # async fn run() -> tandem_common::Result<()> {
//! let endpoint = Endpoint::new(EndpointConfig::default())?;
//! endpoint.add_method("echo", handler(|params| async move { Ok(params) }))?;
//! let addr = endpoint.start().await?;
//! println!("listening on {}", addr);
//! # Ok(())
//! # }
//! ```

mod dispatcher;
mod endpoint;
mod health;
mod http_server;

pub use endpoint::{
    handler, Endpoint, HandlerFuture, MethodHandler, DEFAULT_STOP_TIMEOUT, NO_SIGNAL_HANDLERS_ENV,
};
