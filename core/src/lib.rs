//! Synchronous data-access core for the Solve360 CRM API.
//!
//! # Overview
//! Models CRM items (contacts, companies, project blogs) as typed
//! [`Record`] values, translates between human field labels and API field
//! codes, serializes write requests as XML, and normalizes the quirky JSON
//! response envelopes. All I/O goes through the [`Transport`] trait, so the
//! core stays deterministic and testable.
//!
//! # Design
//! - `RecordClient` carries no mutable state; one transport call per
//!   operation, reconciling record state only after the server acknowledged
//!   the change.
//! - Request assembly (`request`) and response normalization (`response`)
//!   are pure functions over plain data.
//! - Failures are in-band: the CRM reports validation errors through a
//!   `response.errors` mapping, never through HTTP status codes.
//! - Record types are defined once (name, resource segment, field mapping)
//!   and shared via `Arc` across every record of that type.
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use solve360_core::{Config, FieldMapping, RecordAttrs, RecordClient, RecordType};
//! # use solve360_core::{Error, HttpRequest, HttpResponse, Transport};
//! # struct Ureq;
//! # impl Transport for Ureq {
//! #     fn execute(&self, _: HttpRequest) -> Result<HttpResponse, Error> { unimplemented!() }
//! # }
//!
//! # fn main() -> Result<(), solve360_core::Error> {
//! let config = Config::new("https://secure.solve360.com", "me@example.com", "token", 1);
//! let client = RecordClient::new(config, Ureq);
//! let contacts = RecordType::new(
//!     "Contact",
//!     FieldMapping::new([("First Name", "firstname"), ("Last Name", "lastname")]),
//! );
//!
//! let mut record = client.create(
//!     &contacts,
//!     RecordAttrs {
//!         fields: BTreeMap::from([("First Name".to_string(), "Steve".to_string())]),
//!         ..RecordAttrs::default()
//!     },
//! )?;
//! client.add_note(&mut record, "met at the conference")?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod fields;
pub mod http;
pub mod record;
mod request;
mod response;

pub use client::RecordClient;
pub use config::Config;
pub use error::Error;
pub use fields::FieldMapping;
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport};
pub use record::{
    resource_name, Activity, ActivityDraft, ActivityKind, CategoryRef, Record, RecordAttrs,
    RecordType, RelatedItem,
};
