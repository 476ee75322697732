//! HTTP transport types and the transport seam.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. The core
//! crate assembles `HttpRequest` values and interprets `HttpResponse` values
//! without ever touching the network — a [`Transport`] implementation
//! supplied by the embedding application executes the actual I/O. This keeps
//! the core deterministic and easy to test: unit tests script responses,
//! integration tests plug in a ureq-backed transport.
//!
//! All fields use owned types (`String`, `Vec`) so values can be moved
//! freely across the transport boundary without lifetime concerns.
//!
//! The client never inspects HTTP status codes: Solve360 signals failure
//! in-band through the `response.errors` mapping, so a transport should hand
//! back 4xx/5xx responses as data rather than turning them into errors.
//! [`Error::Transport`] is reserved for round-trips that did not complete.

use crate::error::Error;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

/// An HTTP request described as plain data.
///
/// Assembled by [`RecordClient`](crate::RecordClient) operations and handed
/// to a [`Transport`] for execution.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Absolute URL (base URL joined with the resource path).
    pub path: String,
    pub headers: Vec<(String, String)>,
    /// Query parameters, not yet percent-encoded.
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
    /// Basic-auth credentials `(username, token)`, supplied on every call.
    pub basic_auth: Option<(String, String)>,
}

/// An HTTP response described as plain data.
///
/// Constructed by the [`Transport`] after executing an [`HttpRequest`]. The
/// body is expected to decode as JSON; see the module docs for why `status`
/// is carried but not interpreted.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// The boundary a concrete HTTP implementation plugs into.
///
/// Exactly one `execute` call is made per client operation; retries,
/// timeouts, and connection management are the implementation's business.
pub trait Transport {
    /// Execute the round-trip, returning the response as data.
    ///
    /// Implementations should return [`Error::Transport`] only when the
    /// round-trip itself failed (DNS, socket, TLS); an HTTP error status
    /// with a decodable body belongs in the `HttpResponse`.
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, Error>;
}
