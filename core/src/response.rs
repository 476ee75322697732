//! Response interpretation: decoding, error detection, and normalization
//! of CRM envelopes into typed records.
//!
//! # Design
//! Everything here is a pure function over decoded JSON. The envelope
//! quirks all live in this module so the rest of the crate sees clean
//! shapes: id-keyed maps for collections and activities, a bare object
//! where a one-element array would be expected, field payloads carrying
//! `__content__` and `label`, and numbers that arrive as strings.
//!
//! Absent `relateditems`/`categories`/`activities` substructure means
//! "nothing to report" and normalizes to empty collections. A missing
//! envelope, a missing item, or a malformed `fields`/`errors` mapping is a
//! hard [`Error::MalformedResponse`].

use std::collections::BTreeMap;
use std::sync::Arc;

use log::warn;
use serde_json::{Map as JsonMap, Value};

use crate::error::Error;
use crate::fields::scalar_string;
use crate::record::{Activity, CategoryRef, ItemScalars, Record, RecordType, RelatedItem};

/// Decodes a transport body as JSON.
pub(crate) fn decode(body: &str) -> Result<Value, Error> {
    serde_json::from_str(body)
        .map_err(|err| Error::malformed(format!("body is not valid JSON: {err}")))
}

/// Fails with [`Error::Validation`] when the document carries a non-empty
/// `response.errors` mapping, joining the entries into one message. The
/// `response` envelope itself is required even when no errors are present;
/// a document without one is [`Error::MalformedResponse`].
pub(crate) fn check_errors(document: &Value) -> Result<(), Error> {
    let errors = match envelope(document)?.get("errors") {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(Error::malformed(format!(
                "errors mapping has unexpected shape: {other}"
            )));
        }
    };
    if errors.is_empty() {
        return Ok(());
    }
    let message = errors
        .iter()
        .map(|(field, detail)| {
            let detail = scalar_string(detail).unwrap_or_else(|| detail.to_string());
            format!("{field}: {detail}")
        })
        .collect::<Vec<_>>()
        .join("\n");
    Err(Error::Validation { message })
}

/// The server-assigned id of a just-created item.
pub(crate) fn created_id(document: &Value) -> Result<u64, Error> {
    document
        .pointer("/response/item/id")
        .and_then(scalar_u64)
        .ok_or_else(|| Error::malformed("created item id missing from response"))
}

/// The server-assigned id of a just-created activity.
pub(crate) fn activity_id(document: &Value) -> Result<u64, Error> {
    document
        .pointer("/response/id")
        .and_then(scalar_u64)
        .ok_or_else(|| Error::malformed("activity id missing from response"))
}

/// Builds a record from a singular fetch envelope:
/// `{response: {item: {...}, relateditems: ..., categories: ..., activities: ...}}`.
pub(crate) fn record_from_singular(
    kind: &Arc<RecordType>,
    document: &Value,
) -> Result<Record, Error> {
    let response = envelope(document)?;
    let item = response
        .get("item")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::malformed("item missing from response"))?;

    let fields = match item.get("fields") {
        Some(Value::Object(raw)) => {
            let mut raw = raw.clone();
            kind.mapping().from_api(&mut raw)
        }
        _ => return Err(Error::malformed("item fields missing or not a mapping")),
    };

    let mut related_items = Vec::new();
    for entry in one_or_many(response.get("relateditems").and_then(|v| v.get("relatedto"))) {
        match reference_parts(entry) {
            Some((id, name)) => related_items.push(RelatedItem { id, name }),
            None => warn!("dropping related item without a usable id: {entry}"),
        }
    }

    let mut categories = Vec::new();
    for entry in one_or_many(response.get("categories").and_then(|v| v.get("category"))) {
        match reference_parts(entry) {
            Some((id, name)) => categories.push(CategoryRef { id, name }),
            None => warn!("dropping category without a usable id: {entry}"),
        }
    }

    // Activities arrive as a map keyed by id; document order is the
    // server's most-recent-first ordering, so it must be preserved.
    let mut activities = Vec::new();
    if let Some(Value::Object(entries)) = response.get("activities") {
        for (key, entry) in entries {
            match activity_from_entry(entry) {
                Some(activity) => activities.push(activity),
                None => warn!("dropping activity {key} without a usable id"),
            }
        }
    }

    Ok(Record::loaded(
        Arc::clone(kind),
        item_scalars(item),
        fields,
        related_items,
        categories,
        activities,
    ))
}

/// Builds records from a collection envelope: `{response: {status, count,
/// <id>: {...}, ...}}`. Scalar bookkeeping entries are skipped; each
/// object entry is a flat item whose field payloads sit beside its
/// scalars.
pub(crate) fn records_from_collection(
    kind: &Arc<RecordType>,
    document: &Value,
) -> Result<Vec<Record>, Error> {
    let response = envelope(document)?;
    let mut records = Vec::new();
    for (key, entry) in response {
        if key == "errors" {
            // An empty errors mapping is bookkeeping, not a record.
            continue;
        }
        let Some(raw) = entry.as_object() else {
            continue;
        };
        let mut raw = raw.clone();
        let fields = kind.mapping().from_api(&mut raw);
        records.push(Record::loaded(
            Arc::clone(kind),
            item_scalars(&raw),
            fields,
            Vec::new(),
            Vec::new(),
            Vec::new(),
        ));
    }
    Ok(records)
}

fn envelope(document: &Value) -> Result<&JsonMap<String, Value>, Error> {
    document
        .get("response")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::malformed("response envelope missing"))
}

/// The API returns a bare object instead of a one-element array when a
/// collection has exactly one entry.
fn one_or_many(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single) => vec![single],
    }
}

/// Extracts `(id, name)` from a related-item or category entry, accepting
/// either an object with an `id` member or a bare scalar id.
fn reference_parts(entry: &Value) -> Option<(u64, Option<String>)> {
    if let Some(id) = scalar_u64(entry) {
        return Some((id, None));
    }
    let id = entry.get("id").and_then(scalar_u64)?;
    Some((id, entry.get("name").and_then(scalar_string)))
}

fn activity_from_entry(entry: &Value) -> Option<Activity> {
    let map = entry.as_object()?;
    let id = map.get("id").and_then(scalar_u64)?;
    let parent = map.get("parent").and_then(scalar_u64);
    let mut fields = BTreeMap::new();
    for (key, value) in map {
        if key == "id" || key == "parent" {
            continue;
        }
        if let Some(text) = scalar_string(value) {
            fields.insert(key.clone(), text);
        }
    }
    Some(Activity { id, parent, fields })
}

fn item_scalars(item: &JsonMap<String, Value>) -> ItemScalars {
    ItemScalars {
        id: item.get("id").and_then(scalar_u64),
        name: item.get("name").and_then(scalar_string),
        type_id: item.get("typeid").and_then(scalar_u64),
        created: item.get("created").and_then(scalar_string),
        updated: item.get("updated").and_then(scalar_string),
        viewed: item.get("viewed").and_then(scalar_string),
        ownership: item.get("ownership").and_then(scalar_u64),
        flagged: item.get("flagged").and_then(scalar_bool),
    }
}

/// Ids arrive either as JSON numbers or as decimal strings.
pub(crate) fn scalar_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_u64().map(|n| n != 0),
        Value::String(s) => match s.trim() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
