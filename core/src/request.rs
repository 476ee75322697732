//! Request assembly: pure builders that turn client intent into
//! [`HttpRequest`] values.
//!
//! # Design
//! Builders never perform I/O and never fail; each one is a total mapping
//! from typed inputs to a request description the transport can execute.
//! The save body grammar is small and fixed, so the XML is assembled
//! directly instead of going through an XML writer.

use crate::config::Config;
use crate::http::{HttpMethod, HttpRequest};
use crate::record::{ActivityDraft, Record, RecordType};

fn headers() -> Vec<(String, String)> {
    vec![
        ("Content-Type".to_string(), "application/xml".to_string()),
        ("Accept".to_string(), "application/json".to_string()),
    ]
}

fn auth(config: &Config) -> Option<(String, String)> {
    Some((config.username.clone(), config.token.clone()))
}

/// Escapes the five XML-significant characters for element content.
pub(crate) fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Serializes a record into the `<request>` body sent on create and update.
///
/// Fields appear in mapping order with escaped values; staged related items
/// and categories appear only when non-empty; `<ownership>` is always
/// emitted, empty when the record carries none.
pub(crate) fn save_body(record: &Record) -> String {
    let mut xml = String::from("<request>");
    for (code, value) in record.api_fields() {
        xml.push_str(&format!("<{code}>{}</{code}>", escape(&value)));
    }
    if !record.pending_related_items().is_empty() {
        xml.push_str("<relateditems><add>");
        for item in record.pending_related_items() {
            xml.push_str(&format!("<relatedto><id>{}</id></relatedto>", item.id));
        }
        xml.push_str("</add></relateditems>");
    }
    if !record.pending_categories().is_empty() {
        xml.push_str("<categories><add>");
        for category in record.pending_categories() {
            xml.push_str(&format!("<category>{}</category>", category.id));
        }
        xml.push_str("</add></categories>");
    }
    match record.ownership() {
        Some(ownership) => xml.push_str(&format!("<ownership>{ownership}</ownership>")),
        None => xml.push_str("<ownership></ownership>"),
    }
    xml.push_str("</request>");
    xml
}

/// Query parameters for an activity creation call: the effective parent,
/// an optional file reference, and one `data[key]` entry per field. A
/// record that was never saved has no id; the parent is sent empty and the
/// server rejects the call through its errors mapping.
pub(crate) fn activity_params(parent: Option<u64>, draft: &ActivityDraft) -> Vec<(String, String)> {
    let parent = parent.map(|p| p.to_string()).unwrap_or_default();
    let mut params = vec![("parent".to_string(), parent)];
    if let Some(file) = &draft.file {
        params.push(("file".to_string(), file.clone()));
    }
    for (key, value) in &draft.fields {
        params.push((format!("data[{key}]"), value.clone()));
    }
    params
}

pub(crate) fn build_find_request(config: &Config, kind: &RecordType, id: u64) -> HttpRequest {
    HttpRequest {
        method: HttpMethod::Get,
        path: format!("{}/{}/{id}", config.base_url, kind.resource()),
        headers: headers(),
        query: Vec::new(),
        body: None,
        basic_auth: auth(config),
    }
}

/// Collection fetch. `layout=1` asks the server for fully labeled fields;
/// filters ride along as extra query parameters.
pub(crate) fn build_list_request(
    config: &Config,
    kind: &RecordType,
    filters: &[(String, String)],
) -> HttpRequest {
    let mut query = vec![("layout".to_string(), "1".to_string())];
    query.extend(filters.iter().cloned());
    HttpRequest {
        method: HttpMethod::Get,
        path: format!("{}/{}", config.base_url, kind.resource()),
        headers: headers(),
        query,
        body: None,
        basic_auth: auth(config),
    }
}

/// POST to the collection for a new record, PUT to the item for an
/// existing one; either way the body is [`save_body`].
pub(crate) fn build_save_request(config: &Config, record: &Record) -> HttpRequest {
    let resource = record.record_type().resource();
    let (method, path) = match record.id() {
        None => (HttpMethod::Post, format!("{}/{resource}", config.base_url)),
        Some(id) => (HttpMethod::Put, format!("{}/{resource}/{id}", config.base_url)),
    };
    HttpRequest {
        method,
        path,
        headers: headers(),
        query: Vec::new(),
        body: Some(save_body(record)),
        basic_auth: auth(config),
    }
}

/// Activity creation posts its payload as query parameters, not a body.
pub(crate) fn build_activity_request(
    config: &Config,
    kind: &RecordType,
    segment: &str,
    parent: Option<u64>,
    draft: &ActivityDraft,
) -> HttpRequest {
    HttpRequest {
        method: HttpMethod::Post,
        path: format!("{}/{}/{segment}", config.base_url, kind.resource()),
        headers: headers(),
        query: activity_params(parent, draft),
        body: None,
        basic_auth: auth(config),
    }
}

/// The API routes deletion of every activity kind through the `task`
/// segment.
pub(crate) fn build_delete_activity_request(
    config: &Config,
    kind: &RecordType,
    activity_id: u64,
) -> HttpRequest {
    HttpRequest {
        method: HttpMethod::Delete,
        path: format!("{}/{}/task/{activity_id}", config.base_url, kind.resource()),
        headers: headers(),
        query: Vec::new(),
        body: None,
        basic_auth: auth(config),
    }
}
