use leadsync_core::db::open_db_in_memory;
use leadsync_core::identity::is_valid_email;
use leadsync_core::{
    EmailFormatError, IdentityService, Lead, LeadError, LeadService, SqliteRecordStore,
};
use rusqlite::Connection;

struct StubIdentity {
    avatar: Option<String>,
}

impl StubIdentity {
    fn without_avatar() -> Self {
        Self { avatar: None }
    }

    fn with_avatar(url: &str) -> Self {
        Self {
            avatar: Some(url.to_string()),
        }
    }
}

impl IdentityService for StubIdentity {
    fn validate_email_syntax(&self, address: &str) -> Result<(), EmailFormatError> {
        if is_valid_email(address) {
            Ok(())
        } else {
            Err(EmailFormatError {
                address: address.to_string(),
            })
        }
    }

    fn lookup_avatar(&self, _address: &str) -> Option<String> {
        self.avatar.clone()
    }
}

fn service(
    conn: &Connection,
    identity: StubIdentity,
) -> LeadService<SqliteRecordStore<'_>, StubIdentity> {
    LeadService::new(SqliteRecordStore::try_new(conn).unwrap(), identity)
}

fn text(value: &str) -> Option<String> {
    Some(value.to_string())
}

fn lead_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM leads;", [], |row| row.get(0))
        .unwrap()
}

fn contact_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM contacts;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn first_and_last_name_form_lead_name() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn, StubIdentity::without_avatar());

    let mut lead = Lead::new();
    lead.first_name = text("Jane");
    lead.last_name = text("Doe");
    service.insert_lead(&mut lead).unwrap();

    assert_eq!(lead.lead_name.as_deref(), Some("Jane Doe"));
    assert_eq!(lead.title.as_deref(), Some("Jane Doe"));
}

#[test]
fn organization_fills_lead_name_and_title() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn, StubIdentity::without_avatar());

    let mut lead = Lead::new();
    lead.organization_name = text("Acme");
    service.insert_lead(&mut lead).unwrap();

    assert_eq!(lead.lead_name.as_deref(), Some("Acme"));
    assert_eq!(lead.title.as_deref(), Some("Acme"));
}

#[test]
fn email_local_part_fills_lead_name() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn, StubIdentity::without_avatar());

    let mut lead = Lead::new();
    lead.email = text("bob@example.com");
    service.insert_lead(&mut lead).unwrap();

    assert_eq!(lead.lead_name.as_deref(), Some("bob"));
}

#[test]
fn lead_without_identity_fails_and_persists_nothing() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn, StubIdentity::without_avatar());

    let mut lead = Lead::new();
    lead.phone = text("555");
    let err = service.insert_lead(&mut lead).unwrap_err();

    assert!(matches!(err, LeadError::MissingIdentity));
    assert_eq!(
        err.to_string(),
        "A Lead requires either a person's name or an organization's name"
    );
    assert!(lead.is_new());
    assert_eq!(lead_count(&conn), 0);
    assert_eq!(contact_count(&conn), 0);
}

#[test]
fn import_bypass_allows_lead_without_identity() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn, StubIdentity::without_avatar());

    let mut lead = Lead::new();
    lead.flags.ignore_mandatory = true;
    service.insert_lead(&mut lead).unwrap();

    assert!(!lead.is_new());
    assert_eq!(lead.lead_name, None);
    assert_eq!(lead.title, None);
    assert_eq!(contact_count(&conn), 1);
}

#[test]
fn owner_email_conflict_blocks_otherwise_valid_lead() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn, StubIdentity::without_avatar());

    let mut lead = Lead::new();
    lead.first_name = text("Jane");
    lead.organization_name = text("Acme");
    lead.email = text("owner@example.com");
    lead.lead_owner = text("owner@example.com");
    let err = service.insert_lead(&mut lead).unwrap_err();

    assert!(matches!(err, LeadError::OwnerEmailConflict));
    assert_eq!(lead_count(&conn), 0);
}

#[test]
fn malformed_email_fails_unless_validation_is_bypassed() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn, StubIdentity::without_avatar());

    let mut lead = Lead::new();
    lead.first_name = text("Jane");
    lead.email = text("jane-at-example");
    let err = service.insert_lead(&mut lead).unwrap_err();
    match err {
        LeadError::InvalidEmailFormat(inner) => assert_eq!(inner.address, "jane-at-example"),
        other => panic!("unexpected error: {other}"),
    }

    lead.flags.ignore_email_validation = true;
    service.insert_lead(&mut lead).unwrap();
    assert_eq!(lead.email.as_deref(), Some("jane-at-example"));
}

#[test]
fn avatar_is_filled_on_insert_but_explicit_image_survives_update() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn, StubIdentity::with_avatar("https://avatars.test/bob"));

    let mut lead = Lead::new();
    lead.email = text("bob@example.com");
    service.insert_lead(&mut lead).unwrap();
    assert_eq!(lead.image.as_deref(), Some("https://avatars.test/bob"));

    lead.image = text("https://cdn.test/custom.png");
    lead.job_title = text("CTO");
    service.update_lead(&mut lead).unwrap();
    assert_eq!(lead.image.as_deref(), Some("https://cdn.test/custom.png"));
}

#[test]
fn missing_avatar_leaves_image_empty() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn, StubIdentity::without_avatar());

    let mut lead = Lead::new();
    lead.email = text("bob@example.com");
    service.insert_lead(&mut lead).unwrap();

    assert_eq!(lead.image, None);
}

#[test]
fn empty_image_is_looked_up_again_on_update() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn, StubIdentity::with_avatar("https://avatars.test/a"));

    let mut lead = Lead::new();
    lead.email = text("a@example.com");
    service.insert_lead(&mut lead).unwrap();

    lead.image = None;
    service.update_lead(&mut lead).unwrap();
    assert_eq!(lead.image.as_deref(), Some("https://avatars.test/a"));
}

#[test]
fn updates_recompute_derived_names() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn, StubIdentity::without_avatar());

    let mut lead = Lead::new();
    lead.first_name = text("Jane");
    service.insert_lead(&mut lead).unwrap();

    lead.salutation = text("Dr");
    lead.last_name = text("Doe");
    lead.organization_name = text("Acme");
    service.update_lead(&mut lead).unwrap();

    let stored = service.get_lead(lead.name.unwrap()).unwrap().unwrap();
    assert_eq!(stored.lead_name.as_deref(), Some("Dr Jane Doe"));
    assert_eq!(stored.title.as_deref(), Some("Acme"));
}

#[test]
fn insert_rejects_already_inserted_lead_and_update_rejects_new_lead() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn, StubIdentity::without_avatar());

    let mut fresh = Lead::new();
    fresh.first_name = text("Jane");
    assert!(matches!(
        service.update_lead(&mut fresh),
        Err(LeadError::MissingLeadId)
    ));

    let id = service.save_lead(&mut fresh).unwrap();
    assert!(matches!(
        service.insert_lead(&mut fresh),
        Err(LeadError::AlreadyInserted(existing)) if existing == id
    ));
}
