//! Error types for the Solve360 API client.
//!
//! # Design
//! The Solve360 API reports failures in-band: a write or fetch the server
//! rejects comes back as a normal HTTP response whose body carries a
//! `response.errors` mapping. `Validation` captures that case with the
//! joined field messages. `MalformedResponse` is reserved for bodies the
//! client cannot interpret at all — absent optional substructures are *not*
//! malformed, they normalize to empty collections.

use std::fmt;

/// Errors returned by [`RecordClient`](crate::RecordClient) operations and
/// [`Transport`](crate::Transport) implementations.
#[derive(Debug)]
pub enum Error {
    /// The server rejected the operation with field-level errors.
    ///
    /// `message` joins every `field: message` pair from the response's
    /// `errors` mapping, one per line, in document order. The record the
    /// operation was called with is left exactly as it was before the call.
    Validation {
        /// Joined `field: message` lines.
        message: String,
    },

    /// The response body was not JSON, or the envelope lacked a required
    /// part (`response`, the singular `item`, or the id of a created item).
    MalformedResponse {
        /// What was missing or undecodable.
        detail: String,
    },

    /// The transport failed to complete the HTTP round-trip.
    Transport {
        /// Transport-reported cause.
        detail: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation { message } => {
                write!(f, "request rejected by CRM: {message}")
            }
            Error::MalformedResponse { detail } => {
                write!(f, "malformed response: {detail}")
            }
            Error::Transport { detail } => {
                write!(f, "transport failure: {detail}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Shorthand used by the normalizer and client internals.
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Error::MalformedResponse {
            detail: detail.into(),
        }
    }
}
