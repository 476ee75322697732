//! The client tying request builders, the transport, and response
//! normalization into CRM operations.
//!
//! # Design
//! `RecordClient` holds the configuration and a [`Transport`]; it carries
//! no mutable state between calls. Each operation assembles one request,
//! executes it through the transport, checks the in-band errors mapping,
//! and only then reconciles the affected [`Record`] — so a failed call
//! leaves the record exactly as it was.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;
use serde_json::Value;

use crate::config::Config;
use crate::error::Error;
use crate::http::{HttpRequest, Transport};
use crate::record::{Activity, ActivityDraft, ActivityKind, Record, RecordAttrs, RecordType};
use crate::{request, response};

/// Synchronous client for one CRM account.
///
/// Every operation makes exactly one transport call. Retries, timeouts,
/// and connection reuse belong to the [`Transport`] implementation.
pub struct RecordClient<T: Transport> {
    config: Config,
    transport: T,
}

impl<T: Transport> RecordClient<T> {
    pub fn new(config: Config, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Constructs a record from `attrs` and saves it immediately.
    pub fn create(&self, kind: &Arc<RecordType>, attrs: RecordAttrs) -> Result<Record, Error> {
        let mut record = Record::new(Arc::clone(kind), attrs);
        self.save(&mut record)?;
        Ok(record)
    }

    /// Fetches one record by id, with its related items, categories, and
    /// activities.
    pub fn find(&self, kind: &Arc<RecordType>, id: u64) -> Result<Record, Error> {
        debug!("fetching {} {id}", kind.resource());
        let document = self.call(request::build_find_request(&self.config, kind, id))?;
        response::check_errors(&document)?;
        response::record_from_singular(kind, &document)
    }

    /// Fetches every record of a type.
    pub fn find_all(&self, kind: &Arc<RecordType>) -> Result<Vec<Record>, Error> {
        self.list(kind, &[])
    }

    /// Fetches the records matching a server-side filter mode and value.
    pub fn search(
        &self,
        kind: &Arc<RecordType>,
        mode: &str,
        value: &str,
    ) -> Result<Vec<Record>, Error> {
        self.list(
            kind,
            &[
                ("filtermode".to_string(), mode.to_string()),
                ("filtervalue".to_string(), value.to_string()),
            ],
        )
    }

    pub fn find_by_email(&self, kind: &Arc<RecordType>, email: &str) -> Result<Vec<Record>, Error> {
        self.search(kind, "byemail", email)
    }

    pub fn find_by_phone(&self, kind: &Arc<RecordType>, phone: &str) -> Result<Vec<Record>, Error> {
        self.search(kind, "byphone", phone)
    }

    fn list(
        &self,
        kind: &Arc<RecordType>,
        filters: &[(String, String)],
    ) -> Result<Vec<Record>, Error> {
        debug!("listing {} ({} filter(s))", kind.resource(), filters.len());
        let document = self.call(request::build_list_request(&self.config, kind, filters))?;
        response::check_errors(&document)?;
        response::records_from_collection(kind, &document)
    }

    /// Saves a record: create when it has no id, update otherwise.
    ///
    /// A record without ownership is stamped with the configured default
    /// before the request goes out, and the stamp stays even when the save
    /// fails. On success a created record receives the server-assigned id
    /// and staged related items/categories move into the confirmed
    /// collections; on failure the record keeps its pre-call state.
    pub fn save(&self, record: &mut Record) -> Result<(), Error> {
        if record.ownership().is_none() {
            record.set_ownership(self.config.default_ownership);
        }
        let creating = record.is_new();
        debug!(
            "saving {} record (create: {creating})",
            record.record_type().resource()
        );
        let document = self.call(request::build_save_request(&self.config, record))?;
        response::check_errors(&document)?;
        if creating {
            record.assign_id(response::created_id(&document)?);
        }
        record.confirm_pending();
        Ok(())
    }

    /// Creates an activity scoped to the record (`parent` defaults to the
    /// record's id) and prepends it to the record's activity list, mirroring
    /// the order a fresh fetch would return.
    pub fn add_activity(
        &self,
        record: &mut Record,
        kind: ActivityKind,
        draft: ActivityDraft,
    ) -> Result<Activity, Error> {
        let parent = draft.parent.or(record.id());
        debug!(
            "adding {} activity to {} {parent:?}",
            kind.segment(),
            record.record_type().resource()
        );
        let document = self.call(request::build_activity_request(
            &self.config,
            record.record_type(),
            kind.segment(),
            parent,
            &draft,
        ))?;
        response::check_errors(&document)?;
        let activity = Activity {
            id: response::activity_id(&document)?,
            parent,
            fields: draft.fields,
        };
        record.prepend_activity(activity.clone());
        Ok(activity)
    }

    /// Convenience for the most common activity: a note with details text.
    pub fn add_note(&self, record: &mut Record, note: &str) -> Result<Activity, Error> {
        let draft = ActivityDraft {
            parent: None,
            file: None,
            fields: BTreeMap::from([("details".to_string(), note.to_string())]),
        };
        self.add_activity(record, ActivityKind::Note, draft)
    }

    /// Deletes an activity remotely, then drops it from the record's local
    /// list. The record is untouched when the remote call fails.
    pub fn delete_activity(&self, record: &mut Record, activity_id: u64) -> Result<(), Error> {
        debug!(
            "deleting activity {activity_id} from {}",
            record.record_type().resource()
        );
        let document = self.call(request::build_delete_activity_request(
            &self.config,
            record.record_type(),
            activity_id,
        ))?;
        response::check_errors(&document)?;
        record.remove_activity(activity_id);
        Ok(())
    }

    fn call(&self, request: HttpRequest) -> Result<Value, Error> {
        let response = self.transport.execute(request)?;
        response::decode(&response.body)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;
    use crate::fields::FieldMapping;
    use crate::http::{HttpMethod, HttpResponse};
    use crate::record::{CategoryRef, ItemScalars, RelatedItem};

    /// Transport double that replays scripted bodies and records every
    /// request it executes.
    struct ScriptedTransport {
        responses: RefCell<VecDeque<HttpResponse>>,
        seen: RefCell<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(bodies: &[&str]) -> Self {
            let responses = bodies
                .iter()
                .map(|body| HttpResponse {
                    status: 200,
                    headers: Vec::new(),
                    body: (*body).to_string(),
                })
                .collect();
            Self {
                responses: RefCell::new(responses),
                seen: RefCell::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.seen.borrow().clone()
        }
    }

    impl Transport for &ScriptedTransport {
        fn execute(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
            self.seen.borrow_mut().push(request);
            self.responses
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| Error::Transport {
                    detail: "no scripted response left".to_string(),
                })
        }
    }

    fn config() -> Config {
        Config::new("http://localhost:3000", "user@example.com", "t0k3n", 5)
    }

    fn contact_type() -> Arc<RecordType> {
        RecordType::new(
            "Contact",
            FieldMapping::new([("First Name", "firstname"), ("Last Name", "lastname")]),
        )
    }

    fn saved_contact(id: u64) -> Record {
        Record::loaded(
            contact_type(),
            ItemScalars {
                id: Some(id),
                ownership: Some(9),
                ..ItemScalars::default()
            },
            BTreeMap::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        )
    }

    const SAVE_OK: &str = r#"{"response": {"status": "success"}}"#;
    const CREATE_OK: &str = r#"{"response": {"status": "success", "item": {"id": "42"}}}"#;
    const ERRORS: &str =
        r#"{"response": {"errors": {"name": "cannot be blank", "phone": "is invalid"}}}"#;

    #[test]
    fn create_posts_xml_and_assigns_identity() {
        let transport = ScriptedTransport::new(&[CREATE_OK]);
        let client = RecordClient::new(config(), &transport);
        let attrs = RecordAttrs {
            fields: BTreeMap::from([("First Name".to_string(), "Steve".to_string())]),
            ..RecordAttrs::default()
        };

        let record = client.create(&contact_type(), attrs).unwrap();
        assert_eq!(record.id(), Some(42));
        assert!(!record.is_new());

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert_eq!(requests[0].path, "http://localhost:3000/contacts");
        let body = requests[0].body.as_deref().unwrap();
        assert!(body.contains("<firstname>Steve</firstname>"));
        assert!(body.contains("<ownership>5</ownership>"));
        assert_eq!(
            requests[0].basic_auth,
            Some(("user@example.com".to_string(), "t0k3n".to_string()))
        );
        assert!(requests[0]
            .headers
            .contains(&("Content-Type".to_string(), "application/xml".to_string())));
    }

    #[test]
    fn save_routes_existing_records_to_update() {
        let transport = ScriptedTransport::new(&[SAVE_OK]);
        let client = RecordClient::new(config(), &transport);
        let mut record = saved_contact(42);

        client.save(&mut record).unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].method, HttpMethod::Put);
        assert_eq!(requests[0].path, "http://localhost:3000/contacts/42");
    }

    #[test]
    fn save_failure_reports_joined_errors_and_keeps_state() {
        let transport = ScriptedTransport::new(&[ERRORS]);
        let client = RecordClient::new(config(), &transport);
        let mut record = Record::loaded(
            contact_type(),
            ItemScalars {
                id: Some(1),
                ownership: Some(9),
                ..ItemScalars::default()
            },
            BTreeMap::new(),
            vec![RelatedItem::new(1)],
            Vec::new(),
            Vec::new(),
        );
        record.stage_related_item(RelatedItem::new(2));

        let err = client.save(&mut record).unwrap_err();
        match err {
            Error::Validation { message } => {
                assert_eq!(message, "name: cannot be blank\nphone: is invalid");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(record.related_items(), &[RelatedItem::new(1)]);
        assert_eq!(record.pending_related_items(), &[RelatedItem::new(2)]);
    }

    #[test]
    fn save_success_merges_pending_additions() {
        let transport = ScriptedTransport::new(&[SAVE_OK]);
        let client = RecordClient::new(config(), &transport);
        let mut record = saved_contact(1);
        record.stage_related_item(RelatedItem::new(2));
        record.stage_category(CategoryRef::new(7));

        client.save(&mut record).unwrap();

        let ids: Vec<u64> = record.related_items().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2]);
        assert!(record.pending_related_items().is_empty());
        assert_eq!(record.categories(), &[CategoryRef::new(7)]);
        assert!(record.pending_categories().is_empty());
    }

    #[test]
    fn save_stamps_default_ownership_even_when_the_call_fails() {
        let transport = ScriptedTransport::new(&[ERRORS]);
        let client = RecordClient::new(config(), &transport);
        let mut record = Record::new(contact_type(), RecordAttrs::default());

        assert!(client.save(&mut record).is_err());
        assert_eq!(record.ownership(), Some(5));
        let body = transport.requests()[0].body.clone().unwrap();
        assert!(body.contains("<ownership>5</ownership>"));
    }

    #[test]
    fn save_keeps_explicit_ownership() {
        let transport = ScriptedTransport::new(&[CREATE_OK]);
        let client = RecordClient::new(config(), &transport);
        let mut record = Record::new(
            contact_type(),
            RecordAttrs {
                ownership: Some(77),
                ..RecordAttrs::default()
            },
        );

        client.save(&mut record).unwrap();
        assert_eq!(record.ownership(), Some(77));
        assert!(transport.requests()[0]
            .body
            .as_deref()
            .unwrap()
            .contains("<ownership>77</ownership>"));
    }

    #[test]
    fn create_without_returned_id_is_malformed_and_record_stays_new() {
        let transport = ScriptedTransport::new(&[SAVE_OK]);
        let client = RecordClient::new(config(), &transport);
        let mut record = Record::new(contact_type(), RecordAttrs::default());
        record.stage_category(CategoryRef::new(3));

        let err = client.save(&mut record).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
        assert!(record.is_new());
        assert_eq!(record.pending_categories(), &[CategoryRef::new(3)]);
    }

    #[test]
    fn save_rejects_a_body_without_the_envelope() {
        let transport = ScriptedTransport::new(&["{}"]);
        let client = RecordClient::new(config(), &transport);
        let mut record = saved_contact(1);
        record.stage_related_item(RelatedItem::new(77));

        let err = client.save(&mut record).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
        assert!(record.related_items().is_empty());
        assert_eq!(record.pending_related_items(), &[RelatedItem::new(77)]);
    }

    #[test]
    fn find_normalizes_the_singular_envelope() {
        let body = r#"{"response": {
            "item": {"id": 12, "name": "Steve", "fields": {"firstname": {"__content__": "Steve"}}},
            "relateditems": {"relatedto": {"id": 7, "name": "Acme"}}
        }}"#;
        let transport = ScriptedTransport::new(&[body]);
        let client = RecordClient::new(config(), &transport);

        let record = client.find(&contact_type(), 12).unwrap();
        assert_eq!(record.id(), Some(12));
        assert_eq!(record.field("First Name"), Some("Steve"));
        assert_eq!(record.related_items().len(), 1);

        let requests = transport.requests();
        assert_eq!(requests[0].method, HttpMethod::Get);
        assert_eq!(requests[0].path, "http://localhost:3000/contacts/12");
        assert!(requests[0].query.is_empty());
    }

    #[test]
    fn find_surfaces_the_errors_envelope() {
        let transport = ScriptedTransport::new(&[ERRORS]);
        let client = RecordClient::new(config(), &transport);
        let err = client.find(&contact_type(), 999).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn find_all_requests_full_layout() {
        let body = r#"{"response": {"status": "success", "count": 0}}"#;
        let transport = ScriptedTransport::new(&[body]);
        let client = RecordClient::new(config(), &transport);

        let records = client.find_all(&contact_type()).unwrap();
        assert!(records.is_empty());
        assert_eq!(
            transport.requests()[0].query,
            vec![("layout".to_string(), "1".to_string())]
        );
    }

    #[test]
    fn search_adds_filter_parameters() {
        let body = r#"{"response": {"status": "success", "count": 0}}"#;
        let transport = ScriptedTransport::new(&[body]);
        let client = RecordClient::new(config(), &transport);

        client
            .find_by_email(&contact_type(), "steve@example.com")
            .unwrap();
        assert_eq!(
            transport.requests()[0].query,
            vec![
                ("layout".to_string(), "1".to_string()),
                ("filtermode".to_string(), "byemail".to_string()),
                ("filtervalue".to_string(), "steve@example.com".to_string()),
            ]
        );
    }

    #[test]
    fn activities_prepend_in_most_recent_first_order() {
        let transport = ScriptedTransport::new(&[
            r#"{"response": {"status": "success", "id": 10}}"#,
            r#"{"response": {"status": "success", "id": 11}}"#,
            SAVE_OK,
        ]);
        let client = RecordClient::new(config(), &transport);
        let mut record = saved_contact(1);

        let first = client
            .add_note(&mut record, "called about the invoice")
            .unwrap();
        assert_eq!(first.id, 10);
        assert_eq!(first.parent, Some(1));

        let draft = ActivityDraft {
            parent: None,
            file: None,
            fields: BTreeMap::from([("title".to_string(), "follow up".to_string())]),
        };
        client
            .add_activity(&mut record, ActivityKind::Task, draft)
            .unwrap();

        let ids: Vec<u64> = record.activities().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![11, 10]);

        client.delete_activity(&mut record, 10).unwrap();
        let ids: Vec<u64> = record.activities().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![11]);

        let requests = transport.requests();
        assert_eq!(requests[0].path, "http://localhost:3000/contacts/note");
        assert!(requests[0]
            .query
            .contains(&("data[details]".to_string(), "called about the invoice".to_string())));
        assert_eq!(requests[1].path, "http://localhost:3000/contacts/task");
        assert_eq!(requests[2].method, HttpMethod::Delete);
        assert_eq!(requests[2].path, "http://localhost:3000/contacts/task/10");
    }

    #[test]
    fn add_activity_failure_leaves_the_record_untouched() {
        let transport = ScriptedTransport::new(&[ERRORS]);
        let client = RecordClient::new(config(), &transport);
        let mut record = saved_contact(1);

        let err = client
            .add_note(&mut record, "will not stick")
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(record.activities().is_empty());
    }

    #[test]
    fn add_activity_honors_parent_override() {
        let transport =
            ScriptedTransport::new(&[r#"{"response": {"status": "success", "id": 3}}"#]);
        let client = RecordClient::new(config(), &transport);
        let mut record = saved_contact(1);

        let draft = ActivityDraft {
            parent: Some(555),
            file: Some("contract.pdf".to_string()),
            fields: BTreeMap::new(),
        };
        let activity = client
            .add_activity(&mut record, ActivityKind::Event, draft)
            .unwrap();
        assert_eq!(activity.parent, Some(555));

        let query = &transport.requests()[0].query;
        assert!(query.contains(&("parent".to_string(), "555".to_string())));
        assert!(query.contains(&("file".to_string(), "contract.pdf".to_string())));
    }

    #[test]
    fn delete_activity_failure_keeps_the_local_list() {
        let transport = ScriptedTransport::new(&[
            r#"{"response": {"status": "success", "id": 10}}"#,
            ERRORS,
        ]);
        let client = RecordClient::new(config(), &transport);
        let mut record = saved_contact(1);
        client.add_note(&mut record, "keep me").unwrap();

        assert!(client.delete_activity(&mut record, 10).is_err());
        assert_eq!(record.activities().len(), 1);
    }

    #[test]
    fn delete_activity_rejects_a_body_without_the_envelope() {
        let transport = ScriptedTransport::new(&[
            r#"{"response": {"status": "success", "id": 10}}"#,
            "{}",
        ]);
        let client = RecordClient::new(config(), &transport);
        let mut record = saved_contact(1);
        client.add_note(&mut record, "keep me").unwrap();

        let err = client.delete_activity(&mut record, 10).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
        assert_eq!(record.activities().len(), 1);
    }

    #[test]
    fn transport_failures_propagate() {
        let transport = ScriptedTransport::new(&[]);
        let client = RecordClient::new(config(), &transport);
        let err = client.find(&contact_type(), 1).unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }

    #[test]
    fn non_json_bodies_are_malformed() {
        let transport = ScriptedTransport::new(&["<html>502</html>"]);
        let client = RecordClient::new(config(), &transport);
        let err = client.find(&contact_type(), 1).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }
}
