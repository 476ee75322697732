//! In-memory Solve360 look-alike for exercising the client end to end.
//!
//! Speaks the real service's dialect: XML `<request>` bodies in, JSON
//! envelopes out, basic auth on every route, and failures reported in-band
//! through a `response.errors` mapping. The envelope quirks the client has
//! to tolerate are reproduced deliberately — string-encoded ids, a bare
//! object where a one-element array would be, and activities as an
//! id-keyed map in most-recent-first order.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{delete, get},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::debug;
use serde_json::{json, Map as JsonMap, Value};
use tokio::{net::TcpListener, sync::RwLock};

/// Basic-auth username every route expects.
pub const TEST_USER: &str = "test@example.com";
/// Basic-auth password every route expects.
pub const TEST_TOKEN: &str = "testtoken";

/// Field codes the mock decorates with a `label`, standing in for
/// account-defined custom fields.
const CUSTOM_LABELS: &[(&str, &str)] = &[
    ("custom20345", "Shoe Size"),
    ("custom20346", "Favorite Color"),
];

#[derive(Clone, Debug, Default)]
struct StoredItem {
    /// API field code → value, in first-seen order.
    fields: Vec<(String, String)>,
    ownership: Option<u64>,
    related_ids: Vec<u64>,
    category_ids: Vec<u64>,
    /// Most recent first, matching retrieval order.
    activity_ids: Vec<u64>,
}

#[derive(Clone, Debug)]
struct StoredActivity {
    id: u64,
    parent: u64,
    kind: String,
    data: Vec<(String, String)>,
}

#[derive(Default)]
struct Store {
    next_id: u64,
    /// resource segment → id → item.
    items: HashMap<String, HashMap<u64, StoredItem>>,
    activities: HashMap<u64, StoredActivity>,
}

impl Store {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn item_name(&self, id: u64) -> Option<String> {
        self.items
            .values()
            .find_map(|items| items.get(&id))
            .map(display_name)
    }
}

type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/{resource}", get(list_records).post(create_record))
        .route(
            "/{resource}/{seg}",
            get(get_record).put(update_record).post(create_activity),
        )
        .route("/{resource}/{kind}/{id}", delete(delete_activity))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn create_record(
    State(db): State<Db>,
    Path(resource): Path<String>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let Some(parsed) = parse_request(&body) else {
        return (StatusCode::OK, errors_body("request", "malformed request document"));
    };
    if parsed.fields.is_empty() {
        return (StatusCode::OK, errors_body("data", "at least one field is required"));
    }

    let mut store = db.write().await;
    let id = store.allocate_id();
    store.items.entry(resource.clone()).or_default().insert(
        id,
        StoredItem {
            fields: parsed.fields,
            ownership: parsed.ownership,
            related_ids: parsed.related_ids,
            category_ids: parsed.category_ids,
            activity_ids: Vec::new(),
        },
    );
    debug!("created {resource} {id}");
    (
        StatusCode::OK,
        Json(json!({"response": {"status": "success", "item": {"id": id.to_string()}}})),
    )
}

async fn update_record(
    State(db): State<Db>,
    Path((resource, seg)): Path<(String, String)>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let Ok(id) = seg.parse::<u64>() else {
        return (StatusCode::OK, errors_body("item", "not found"));
    };
    let Some(parsed) = parse_request(&body) else {
        return (StatusCode::OK, errors_body("request", "malformed request document"));
    };

    let mut store = db.write().await;
    let Some(item) = store.items.get_mut(&resource).and_then(|items| items.get_mut(&id)) else {
        return (StatusCode::OK, errors_body("item", "not found"));
    };
    for (code, value) in parsed.fields {
        if let Some(slot) = item.fields.iter_mut().find(|(c, _)| *c == code) {
            slot.1 = value;
        } else {
            item.fields.push((code, value));
        }
    }
    if parsed.ownership.is_some() {
        item.ownership = parsed.ownership;
    }
    item.related_ids.extend(parsed.related_ids);
    item.category_ids.extend(parsed.category_ids);
    debug!("updated {resource} {id}");
    (
        StatusCode::OK,
        Json(json!({"response": {"status": "success", "item": {"id": id.to_string()}}})),
    )
}

async fn get_record(
    State(db): State<Db>,
    Path((resource, seg)): Path<(String, String)>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let Ok(id) = seg.parse::<u64>() else {
        return (StatusCode::OK, errors_body("item", "not found"));
    };

    let store = db.read().await;
    let Some(item) = store.items.get(&resource).and_then(|items| items.get(&id)) else {
        return (StatusCode::OK, errors_body("item", "not found"));
    };

    let mut envelope = JsonMap::new();
    envelope.insert("status".to_string(), json!("success"));
    envelope.insert("item".to_string(), Value::Object(item_payload(id, item)));

    if !item.related_ids.is_empty() {
        let entries = item
            .related_ids
            .iter()
            .map(|related_id| {
                let mut entry = JsonMap::new();
                entry.insert("id".to_string(), json!(related_id.to_string()));
                if let Some(name) = store.item_name(*related_id) {
                    entry.insert("name".to_string(), json!(name));
                }
                Value::Object(entry)
            })
            .collect();
        envelope.insert(
            "relateditems".to_string(),
            json!({"relatedto": bare_when_single(entries)}),
        );
    }

    if !item.category_ids.is_empty() {
        let entries = item
            .category_ids
            .iter()
            .map(|category_id| json!({"id": category_id.to_string()}))
            .collect();
        envelope.insert(
            "categories".to_string(),
            json!({"category": bare_when_single(entries)}),
        );
    }

    let mut activities = JsonMap::new();
    for activity_id in &item.activity_ids {
        if let Some(activity) = store.activities.get(activity_id) {
            let mut entry = JsonMap::new();
            entry.insert("id".to_string(), json!(activity.id.to_string()));
            entry.insert("parent".to_string(), json!(activity.parent.to_string()));
            for (key, value) in &activity.data {
                entry.insert(key.clone(), json!(value));
            }
            activities.insert(activity.id.to_string(), Value::Object(entry));
        }
    }
    if !activities.is_empty() {
        envelope.insert("activities".to_string(), Value::Object(activities));
    }

    (StatusCode::OK, Json(json!({"response": envelope})))
}

async fn list_records(
    State(db): State<Db>,
    Path(resource): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }

    let store = db.read().await;
    let empty = HashMap::new();
    let items = store.items.get(&resource).unwrap_or(&empty);
    let filter = filter_from(&params);

    let mut ids: Vec<u64> = items.keys().copied().collect();
    ids.sort_unstable();
    let matched: Vec<u64> = ids
        .into_iter()
        .filter(|id| matches_filter(&items[id], &filter))
        .collect();

    let mut envelope = JsonMap::new();
    envelope.insert("status".to_string(), json!("success"));
    envelope.insert("count".to_string(), json!(matched.len()));
    for id in matched {
        envelope.insert(
            id.to_string(),
            Value::Object(collection_entry(id, &items[&id])),
        );
    }
    (StatusCode::OK, Json(json!({"response": envelope})))
}

async fn create_activity(
    State(db): State<Db>,
    Path((resource, seg)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    if !matches!(seg.as_str(), "note" | "task" | "event" | "call") {
        return (StatusCode::OK, errors_body("activity", "unknown activity type"));
    }
    let parent = params
        .iter()
        .find(|(key, _)| key == "parent")
        .and_then(|(_, value)| value.parse::<u64>().ok());
    let Some(parent) = parent else {
        return (StatusCode::OK, errors_body("parent", "is required"));
    };

    let mut store = db.write().await;
    let parent_known = store
        .items
        .values()
        .any(|items| items.contains_key(&parent));
    if !parent_known {
        return (StatusCode::OK, errors_body("parent", "not found"));
    }

    let data: Vec<(String, String)> = params
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix("data[")
                .and_then(|rest| rest.strip_suffix(']'))
                .map(|name| (name.to_string(), value.clone()))
        })
        .collect();

    let id = store.allocate_id();
    store.activities.insert(
        id,
        StoredActivity {
            id,
            parent,
            kind: seg.clone(),
            data,
        },
    );
    if let Some(item) = store
        .items
        .values_mut()
        .find_map(|items| items.get_mut(&parent))
    {
        item.activity_ids.insert(0, id);
    }
    debug!("created {seg} activity {id} on {resource} {parent}");
    (
        StatusCode::OK,
        Json(json!({"response": {"status": "success", "id": id}})),
    )
}

/// The real service ignores the activity-kind segment on deletion; so does
/// the mock.
async fn delete_activity(
    State(db): State<Db>,
    Path((resource, _kind, seg)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let Ok(id) = seg.parse::<u64>() else {
        return (StatusCode::OK, errors_body("activity", "not found"));
    };

    let mut store = db.write().await;
    let Some(activity) = store.activities.remove(&id) else {
        return (StatusCode::OK, errors_body("activity", "not found"));
    };
    if let Some(item) = store
        .items
        .values_mut()
        .find_map(|items| items.get_mut(&activity.parent))
    {
        item.activity_ids.retain(|activity_id| *activity_id != id);
    }
    debug!("deleted {} activity {id} from {resource}", activity.kind);
    (StatusCode::OK, Json(json!({"response": {"status": "success"}})))
}

fn authorized(headers: &HeaderMap) -> bool {
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = STANDARD.decode(encoded) else {
        return false;
    };
    decoded == format!("{TEST_USER}:{TEST_TOKEN}").into_bytes()
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        errors_body("authentication", "invalid credentials"),
    )
}

fn errors_body(field: &str, message: &str) -> Json<Value> {
    let mut errors = JsonMap::new();
    errors.insert(field.to_string(), Value::String(message.to_string()));
    Json(json!({"response": {"errors": errors}}))
}

/// One element stays a bare object, several become an array — the quirk
/// clients have to coerce.
fn bare_when_single(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    }
}

fn item_payload(id: u64, item: &StoredItem) -> JsonMap<String, Value> {
    let mut payload = JsonMap::new();
    payload.insert("id".to_string(), json!(id.to_string()));
    payload.insert("name".to_string(), json!(display_name(item)));
    if let Some(ownership) = item.ownership {
        payload.insert("ownership".to_string(), json!(ownership.to_string()));
    }
    let mut fields = JsonMap::new();
    for (code, value) in &item.fields {
        fields.insert(code.clone(), Value::Object(field_payload(code, value)));
    }
    payload.insert("fields".to_string(), Value::Object(fields));
    payload
}

fn collection_entry(id: u64, item: &StoredItem) -> JsonMap<String, Value> {
    let mut entry = JsonMap::new();
    entry.insert("id".to_string(), json!(id.to_string()));
    entry.insert("name".to_string(), json!(display_name(item)));
    for (code, value) in &item.fields {
        entry.insert(code.clone(), Value::Object(field_payload(code, value)));
    }
    entry
}

fn field_payload(code: &str, value: &str) -> JsonMap<String, Value> {
    let mut payload = JsonMap::new();
    if let Some(label) = custom_label(code) {
        payload.insert("label".to_string(), json!(label));
    }
    payload.insert("__content__".to_string(), json!(value));
    payload
}

fn custom_label(code: &str) -> Option<&'static str> {
    CUSTOM_LABELS
        .iter()
        .find(|(custom, _)| *custom == code)
        .map(|(_, label)| *label)
}

fn display_name(item: &StoredItem) -> String {
    let pick = |code: &str| {
        item.fields
            .iter()
            .find(|(c, _)| c == code)
            .map(|(_, value)| value.as_str())
            .unwrap_or("")
    };
    let full = format!("{} {}", pick("firstname"), pick("lastname"));
    let full = full.trim();
    if !full.is_empty() {
        return full.to_string();
    }
    pick("name").to_string()
}

fn filter_from(params: &[(String, String)]) -> Option<(String, String)> {
    let mode = params.iter().find(|(key, _)| key == "filtermode")?.1.clone();
    let value = params
        .iter()
        .find(|(key, _)| key == "filtervalue")
        .map(|(_, value)| value.clone())
        .unwrap_or_default();
    Some((mode, value))
}

fn matches_filter(item: &StoredItem, filter: &Option<(String, String)>) -> bool {
    let Some((mode, value)) = filter else {
        return true;
    };
    let fragment = match mode.as_str() {
        "byemail" => "email",
        "byphone" => "phone",
        _ => return true,
    };
    item.fields
        .iter()
        .any(|(code, field_value)| code.contains(fragment) && field_value == value)
}

struct ParsedRequest {
    fields: Vec<(String, String)>,
    ownership: Option<u64>,
    related_ids: Vec<u64>,
    category_ids: Vec<u64>,
}

/// Parses the flat `<request>` dialect: field elements plus the optional
/// `relateditems`/`categories` add-blocks and the `ownership` element.
fn parse_request(body: &str) -> Option<ParsedRequest> {
    let inner = body
        .trim()
        .strip_prefix("<request>")?
        .strip_suffix("</request>")?;

    let mut parsed = ParsedRequest {
        fields: Vec::new(),
        ownership: None,
        related_ids: Vec::new(),
        category_ids: Vec::new(),
    };
    for (tag, content) in top_level_elements(inner)? {
        match tag.as_str() {
            "ownership" => parsed.ownership = content.trim().parse().ok(),
            "relateditems" => parsed.related_ids = numbers_between(&content, "<id>", "</id>"),
            "categories" => {
                parsed.category_ids = numbers_between(&content, "<category>", "</category>");
            }
            _ => parsed.fields.push((tag, unescape(&content))),
        }
    }
    Some(parsed)
}

fn top_level_elements(mut rest: &str) -> Option<Vec<(String, String)>> {
    let mut elements = Vec::new();
    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let end = after.find('>')?;
        let tag = &after[..end];
        let content_start = start + 1 + end + 1;
        let close = format!("</{tag}>");
        let close_pos = rest[content_start..].find(&close)?;
        let content = &rest[content_start..content_start + close_pos];
        elements.push((tag.to_string(), content.to_string()));
        rest = &rest[content_start + close_pos + close.len()..];
    }
    Some(elements)
}

fn numbers_between(content: &str, open: &str, close: &str) -> Vec<u64> {
    let mut out = Vec::new();
    let mut rest = content;
    while let Some(pos) = rest.find(open) {
        rest = &rest[pos + open.len()..];
        let Some(end) = rest.find(close) else {
            break;
        };
        if let Ok(id) = rest[..end].trim().parse() {
            out.push(id);
        }
        rest = &rest[end + close.len()..];
    }
    out
}

/// `&amp;` goes last so escaped entity names do not unescape twice.
fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
