//! CRM item model: record types, records, and their activity/relation data.
//!
//! # Design
//! A [`RecordType`] is the immutable definition of one kind of CRM item
//! (contact, company, …): its name, the resource path segment derived from
//! that name, and the field mapping. Definitions are built once and shared
//! via `Arc`; nothing mutates them after construction.
//!
//! A [`Record`] keeps its fields private because two invariants live here:
//! the id is written exactly once (by a successful create), and staged
//! related items/categories move into the confirmed collections only when
//! the client reports a successful save. All mutation goes through the
//! accessor methods below or the client operations.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::fields::FieldMapping;

/// Derives the API resource segment for a record-type name: snake_case the
/// CamelCase name, then pluralize. `Contact` → `contacts`, `Company` →
/// `companies`, `ProjectBlog` → `project_blogs`. Deterministic from the
/// name alone.
pub fn resource_name(type_name: &str) -> String {
    pluralize(&underscore(type_name))
}

fn underscore(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let after_lower =
                i > 0 && (chars[i - 1].is_ascii_lowercase() || chars[i - 1].is_ascii_digit());
            let acronym_end = i > 0
                && chars[i - 1].is_ascii_uppercase()
                && i + 1 < chars.len()
                && chars[i + 1].is_ascii_lowercase();
            if after_lower || acronym_end {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn pluralize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix('y') {
        if stem
            .chars()
            .last()
            .is_some_and(|c| !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
        {
            return format!("{stem}ies");
        }
    }
    if word.ends_with('s')
        || word.ends_with('x')
        || word.ends_with('z')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        return format!("{word}es");
    }
    format!("{word}s")
}

/// Immutable definition of one CRM record type.
#[derive(Debug)]
pub struct RecordType {
    name: String,
    resource: String,
    mapping: FieldMapping,
}

impl RecordType {
    /// Defines a record type, deriving its resource segment from `name`.
    /// Returns an `Arc` because every [`Record`] of this type holds a
    /// reference to its definition.
    pub fn new(name: impl Into<String>, mapping: FieldMapping) -> Arc<Self> {
        let name = name.into();
        let resource = resource_name(&name);
        Arc::new(Self {
            name,
            resource,
            mapping,
        })
    }

    /// The type name, e.g. `Contact`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The derived resource path segment, e.g. `contacts`.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The field mapping for this type.
    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }
}

/// Reference to a related CRM item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedItem {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl RelatedItem {
    pub fn new(id: u64) -> Self {
        Self { id, name: None }
    }
}

/// Reference to a CRM category tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl CategoryRef {
    pub fn new(id: u64) -> Self {
        Self { id, name: None }
    }
}

/// A note, task, event, or call attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<u64>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// Activity types the API accepts as creation path segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Note,
    Task,
    Event,
    Call,
}

impl ActivityKind {
    /// The URL path segment for this kind.
    pub fn segment(self) -> &'static str {
        match self {
            ActivityKind::Note => "note",
            ActivityKind::Task => "task",
            ActivityKind::Event => "event",
            ActivityKind::Call => "call",
        }
    }
}

/// Caller-supplied attributes for a new activity.
///
/// `parent` overrides the owning record's id when set; `file` attaches a
/// file reference; everything else goes through `fields` as the activity's
/// `data` payload.
#[derive(Debug, Clone, Default)]
pub struct ActivityDraft {
    pub parent: Option<u64>,
    pub file: Option<String>,
    pub fields: BTreeMap<String, String>,
}

/// Caller-supplied attributes for constructing a new [`Record`].
///
/// The closed set of attributes a caller may seed; an attribute outside
/// this set cannot be expressed. Server-assigned attributes (timestamps,
/// type id) have no place here.
#[derive(Debug, Clone, Default)]
pub struct RecordAttrs {
    pub name: Option<String>,
    pub ownership: Option<u64>,
    pub flagged: Option<bool>,
    /// Human field label → value.
    pub fields: BTreeMap<String, String>,
}

/// Scalar item attributes parsed out of a response envelope.
#[derive(Debug, Clone, Default)]
pub(crate) struct ItemScalars {
    pub(crate) id: Option<u64>,
    pub(crate) name: Option<String>,
    pub(crate) type_id: Option<u64>,
    pub(crate) created: Option<String>,
    pub(crate) updated: Option<String>,
    pub(crate) viewed: Option<String>,
    pub(crate) ownership: Option<u64>,
    pub(crate) flagged: Option<bool>,
}

/// One CRM item: authoritative attributes plus staged-but-unconfirmed
/// additions.
///
/// Authority lives on the server; a `Record` is a local cache that the
/// client reconciles after every mutating call. A record with no id is new
/// and will be created on its first save.
#[derive(Debug, Clone)]
pub struct Record {
    kind: Arc<RecordType>,
    id: Option<u64>,
    name: Option<String>,
    type_id: Option<u64>,
    created: Option<String>,
    updated: Option<String>,
    viewed: Option<String>,
    ownership: Option<u64>,
    flagged: Option<bool>,
    fields: BTreeMap<String, String>,
    related_items: Vec<RelatedItem>,
    pending_related_items: Vec<RelatedItem>,
    categories: Vec<CategoryRef>,
    pending_categories: Vec<CategoryRef>,
    activities: Vec<Activity>,
}

impl Record {
    /// Constructs a new, unsaved record of the given type.
    pub fn new(kind: Arc<RecordType>, attrs: RecordAttrs) -> Self {
        Self {
            kind,
            id: None,
            name: attrs.name,
            type_id: None,
            created: None,
            updated: None,
            viewed: None,
            ownership: attrs.ownership,
            flagged: attrs.flagged,
            fields: attrs.fields,
            related_items: Vec::new(),
            pending_related_items: Vec::new(),
            categories: Vec::new(),
            pending_categories: Vec::new(),
            activities: Vec::new(),
        }
    }

    /// Constructs a record reflecting server state. Only the response
    /// normalizer builds records this way.
    pub(crate) fn loaded(
        kind: Arc<RecordType>,
        scalars: ItemScalars,
        fields: BTreeMap<String, String>,
        related_items: Vec<RelatedItem>,
        categories: Vec<CategoryRef>,
        activities: Vec<Activity>,
    ) -> Self {
        Self {
            kind,
            id: scalars.id,
            name: scalars.name,
            type_id: scalars.type_id,
            created: scalars.created,
            updated: scalars.updated,
            viewed: scalars.viewed,
            ownership: scalars.ownership,
            flagged: scalars.flagged,
            fields,
            related_items,
            pending_related_items: Vec::new(),
            categories,
            pending_categories: Vec::new(),
            activities,
        }
    }

    /// The record's type definition.
    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.kind
    }

    /// Server identity, absent until the first successful save.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// A record is new until a successful create assigns its id.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn type_id(&self) -> Option<u64> {
        self.type_id
    }

    pub fn created(&self) -> Option<&str> {
        self.created.as_deref()
    }

    pub fn updated(&self) -> Option<&str> {
        self.updated.as_deref()
    }

    pub fn viewed(&self) -> Option<&str> {
        self.viewed.as_deref()
    }

    pub fn ownership(&self) -> Option<u64> {
        self.ownership
    }

    pub fn set_ownership(&mut self, ownership: u64) {
        self.ownership = Some(ownership);
    }

    pub fn flagged(&self) -> Option<bool> {
        self.flagged
    }

    pub fn set_flagged(&mut self, flagged: bool) {
        self.flagged = Some(flagged);
    }

    /// Authoritative fields, human label → value.
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Mutable access to the fields for editing before a save.
    pub fn fields_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.fields
    }

    /// Looks up one field by its human label.
    pub fn field(&self, label: &str) -> Option<&str> {
        self.fields.get(label).map(String::as_str)
    }

    /// Sets one field by its human label.
    pub fn set_field(&mut self, label: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(label.into(), value.into());
    }

    /// The record's fields translated to API-coded pairs, in mapping order.
    pub fn api_fields(&self) -> Vec<(String, String)> {
        self.kind.mapping().to_api(&self.fields)
    }

    /// Related items confirmed by the server.
    pub fn related_items(&self) -> &[RelatedItem] {
        &self.related_items
    }

    /// Related items staged locally, sent with the next save.
    pub fn pending_related_items(&self) -> &[RelatedItem] {
        &self.pending_related_items
    }

    /// Stages a related item to be added on the next successful save.
    pub fn stage_related_item(&mut self, item: RelatedItem) {
        self.pending_related_items.push(item);
    }

    /// Categories confirmed by the server.
    pub fn categories(&self) -> &[CategoryRef] {
        &self.categories
    }

    /// Categories staged locally, sent with the next save.
    pub fn pending_categories(&self) -> &[CategoryRef] {
        &self.pending_categories
    }

    /// Stages a category to be added on the next successful save.
    pub fn stage_category(&mut self, category: CategoryRef) {
        self.pending_categories.push(category);
    }

    /// Activities, most recent first.
    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    /// JSON summary of the record's current state.
    pub fn attributes(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "type_id": self.type_id,
            "created_at": self.created,
            "updated_at": self.updated,
            "viewed_at": self.viewed,
            "owner_id": self.ownership,
            "flagged": self.flagged,
            "fields": self.fields,
            "related_items": self.related_items,
            "categories": self.categories,
            "activities": self.activities,
        })
    }

    /// Records the server-assigned identity after a successful create. The
    /// client only calls this on a record it just created, so the id is
    /// written at most once.
    pub(crate) fn assign_id(&mut self, id: u64) {
        self.id = Some(id);
    }

    /// Moves every staged addition into its confirmed collection. Called
    /// only after the server acknowledged a save.
    pub(crate) fn confirm_pending(&mut self) {
        self.related_items.append(&mut self.pending_related_items);
        self.categories.append(&mut self.pending_categories);
    }

    /// Prepends an activity, matching server-side retrieval order (most
    /// recent first).
    pub(crate) fn prepend_activity(&mut self, activity: Activity) {
        self.activities.insert(0, activity);
    }

    /// Removes the first activity with the given id; a no-op when absent.
    pub(crate) fn remove_activity(&mut self, id: u64) {
        if let Some(pos) = self.activities.iter().position(|a| a.id == id) {
            self.activities.remove(pos);
        }
    }
}
