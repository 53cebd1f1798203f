use leadsync_core::db::open_db_in_memory;
use leadsync_core::{
    Contact, ContactId, ContactPhone, DynamicLinkId, EmailFormatError, IdentityService, Lead,
    LeadError, LeadId, LeadListQuery, LeadService, RecordStore, RepoError, RepoResult,
    SqliteRecordStore, StorePermissions, LEAD_LINK_DOCTYPE,
};
use rusqlite::Connection;
use std::cell::Cell;

struct NoAvatar;

impl IdentityService for NoAvatar {
    fn validate_email_syntax(&self, _address: &str) -> Result<(), EmailFormatError> {
        Ok(())
    }

    fn lookup_avatar(&self, _address: &str) -> Option<String> {
        None
    }
}

/// Delegating store that counts contact writes and can fail lead inserts.
struct RecordingStore<'conn> {
    inner: SqliteRecordStore<'conn>,
    contact_saves: Cell<u32>,
    contact_inserts: Cell<u32>,
    fail_lead_insert: bool,
}

impl<'conn> RecordingStore<'conn> {
    fn new(conn: &'conn Connection) -> Self {
        Self {
            inner: SqliteRecordStore::try_new(conn).unwrap(),
            contact_saves: Cell::new(0),
            contact_inserts: Cell::new(0),
            fail_lead_insert: false,
        }
    }
}

impl RecordStore for RecordingStore<'_> {
    fn insert_lead(&self, lead: &mut Lead) -> RepoResult<LeadId> {
        if self.fail_lead_insert {
            return Err(RepoError::InvalidData("injected lead insert failure".to_string()));
        }
        self.inner.insert_lead(lead)
    }

    fn update_lead(&self, lead: &mut Lead) -> RepoResult<()> {
        self.inner.update_lead(lead)
    }

    fn get_lead(&self, id: LeadId) -> RepoResult<Option<Lead>> {
        self.inner.get_lead(id)
    }

    fn list_leads(&self, query: &LeadListQuery) -> RepoResult<Vec<Lead>> {
        self.inner.list_leads(query)
    }

    fn insert_contact(
        &self,
        contact: &mut Contact,
        ignore_permissions: bool,
    ) -> RepoResult<ContactId> {
        self.contact_inserts.set(self.contact_inserts.get() + 1);
        self.inner.insert_contact(contact, ignore_permissions)
    }

    fn save_contact(&self, contact: &mut Contact) -> RepoResult<()> {
        self.contact_saves.set(self.contact_saves.get() + 1);
        self.inner.save_contact(contact)
    }

    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>> {
        self.inner.get_contact(id)
    }

    fn find_dynamic_link(
        &self,
        link_doctype: &str,
        link_name: &str,
    ) -> RepoResult<Option<DynamicLinkId>> {
        self.inner.find_dynamic_link(link_doctype, link_name)
    }

    fn dynamic_link_parent(&self, link: DynamicLinkId) -> RepoResult<ContactId> {
        self.inner.dynamic_link_parent(link)
    }

    fn atomically<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        E: From<RepoError>,
        F: FnOnce() -> Result<T, E>,
    {
        self.inner.atomically(operation)
    }
}

fn text(value: &str) -> Option<String> {
    Some(value.to_string())
}

fn linked_contact<S: RecordStore>(store: &S, lead_id: LeadId) -> Contact {
    let link = store
        .find_dynamic_link(LEAD_LINK_DOCTYPE, &lead_id.to_string())
        .unwrap()
        .expect("lead should have a contact link");
    let contact_id = store.dynamic_link_parent(link).unwrap();
    store.get_contact(contact_id).unwrap().unwrap()
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[test]
fn insert_creates_exactly_one_linked_contact() {
    let conn = open_db_in_memory().unwrap();
    let service = LeadService::new(SqliteRecordStore::try_new(&conn).unwrap(), NoAvatar);

    let mut lead = Lead::new();
    lead.salutation = text("Ms");
    lead.first_name = text("Jane");
    lead.last_name = text("Doe");
    lead.gender = text("Female");
    lead.job_title = text("CTO");
    lead.organization_name = text("Acme");
    lead.email = text("x@y.com");
    lead.phone = text("1");
    let lead_id = service.insert_lead(&mut lead).unwrap();

    assert_eq!(count(&conn, "contacts"), 1);
    assert_eq!(count(&conn, "dynamic_links"), 1);

    let contact = linked_contact(service.store(), lead_id);
    assert_eq!(contact.first_name.as_deref(), Some("Jane"));
    assert_eq!(contact.last_name.as_deref(), Some("Doe"));
    assert_eq!(contact.salutation.as_deref(), Some("Ms"));
    assert_eq!(contact.gender.as_deref(), Some("Female"));
    assert_eq!(contact.designation.as_deref(), Some("CTO"));
    assert_eq!(contact.company_name.as_deref(), Some("Acme"));
    assert_eq!(contact.image, "");
    assert_eq!(contact.full_name.as_deref(), Some("Jane Doe"));

    assert_eq!(contact.email_ids.len(), 1);
    assert_eq!(contact.email_ids[0].email_id, "x@y.com");
    assert!(contact.email_ids[0].is_primary);
    assert_eq!(contact.phone_nos, vec![ContactPhone::primary_phone("1")]);

    assert_eq!(contact.links.len(), 1);
    assert_eq!(contact.links[0].link_doctype, "CRM Lead");
    assert_eq!(contact.links[0].link_name, lead_id.to_string());
    assert_eq!(contact.links[0].link_title.as_deref(), Some("Ms Jane Doe"));
}

#[test]
fn mobile_update_replaces_phone_entry_from_creation() {
    let conn = open_db_in_memory().unwrap();
    let service = LeadService::new(SqliteRecordStore::try_new(&conn).unwrap(), NoAvatar);

    let mut lead = Lead::new();
    lead.email = text("x@y.com");
    lead.phone = text("1");
    let lead_id = service.insert_lead(&mut lead).unwrap();

    lead.mobile_no = text("2");
    service.update_lead(&mut lead).unwrap();

    let contact = linked_contact(service.store(), lead_id);
    assert_eq!(contact.phone_nos, vec![ContactPhone::primary_mobile("2")]);
    assert_eq!(contact.mobile_no.as_deref(), Some("2"));
    assert_eq!(contact.phone, None);
    assert_eq!(contact.email_ids.len(), 1);
    assert_eq!(count(&conn, "contacts"), 1);
}

#[test]
fn phone_update_appends_instead_of_replacing() {
    let conn = open_db_in_memory().unwrap();
    let service = LeadService::new(SqliteRecordStore::try_new(&conn).unwrap(), NoAvatar);

    let mut lead = Lead::new();
    lead.first_name = text("Jane");
    lead.phone = text("1");
    lead.mobile_no = text("9");
    let lead_id = service.insert_lead(&mut lead).unwrap();

    lead.phone = text("3");
    service.update_lead(&mut lead).unwrap();

    let contact = linked_contact(service.store(), lead_id);
    assert_eq!(
        contact.phone_nos,
        vec![
            ContactPhone::primary_phone("1"),
            ContactPhone::primary_mobile("9"),
            ContactPhone::primary_phone("3"),
        ]
    );
    assert_eq!(contact.phone.as_deref(), Some("3"));
    assert_eq!(contact.mobile_no.as_deref(), Some("9"));
}

#[test]
fn email_update_replaces_whole_email_collection() {
    let conn = open_db_in_memory().unwrap();
    let service = LeadService::new(SqliteRecordStore::try_new(&conn).unwrap(), NoAvatar);

    let mut lead = Lead::new();
    lead.first_name = text("Jane");
    lead.email = text("old@example.com");
    let lead_id = service.insert_lead(&mut lead).unwrap();

    lead.email = text("new@example.com");
    service.update_lead(&mut lead).unwrap();

    let contact = linked_contact(service.store(), lead_id);
    assert_eq!(contact.email_ids.len(), 1);
    assert_eq!(contact.email_ids[0].email_id, "new@example.com");
    assert!(contact.email_ids[0].is_primary);
    assert_eq!(contact.email_id.as_deref(), Some("new@example.com"));
}

#[test]
fn name_change_pushes_identity_fields_in_one_write() {
    let conn = open_db_in_memory().unwrap();
    let store = RecordingStore::new(&conn);
    let service = LeadService::new(store, NoAvatar);

    let mut lead = Lead::new();
    lead.first_name = text("Jane");
    lead.email = text("jane@example.com");
    let lead_id = service.insert_lead(&mut lead).unwrap();
    let saves_after_insert = service.store().contact_saves.get();

    lead.first_name = text("Janet");
    lead.last_name = text("Roe");
    lead.salutation = text("Dr");
    lead.mobile_no = text("77");
    service.update_lead(&mut lead).unwrap();

    assert_eq!(service.store().contact_saves.get(), saves_after_insert + 1);
    let contact = linked_contact(service.store(), lead_id);
    assert_eq!(contact.first_name.as_deref(), Some("Janet"));
    assert_eq!(contact.last_name.as_deref(), Some("Roe"));
    assert_eq!(contact.salutation.as_deref(), Some("Dr"));
    assert_eq!(contact.links.len(), 1);
}

#[test]
fn unchanged_save_skips_contact_update() {
    let conn = open_db_in_memory().unwrap();
    let service = LeadService::new(RecordingStore::new(&conn), NoAvatar);

    let mut lead = Lead::new();
    lead.first_name = text("Jane");
    lead.phone = text("1");
    service.insert_lead(&mut lead).unwrap();
    assert_eq!(service.store().contact_inserts.get(), 1);
    let saves_after_insert = service.store().contact_saves.get();

    service.update_lead(&mut lead).unwrap();
    lead.job_title = text("Buyer");
    service.update_lead(&mut lead).unwrap();

    assert_eq!(service.store().contact_saves.get(), saves_after_insert);
    assert_eq!(service.store().contact_inserts.get(), 1);
}

#[test]
fn lead_without_link_gets_contact_on_next_update() {
    let conn = open_db_in_memory().unwrap();
    let service = LeadService::new(SqliteRecordStore::try_new(&conn).unwrap(), NoAvatar);

    let mut lead = Lead::new();
    lead.first_name = text("Jane");
    lead.email = text("jane@example.com");
    let lead_id = service.insert_lead(&mut lead).unwrap();

    conn.execute("DELETE FROM contacts;", []).unwrap();
    assert_eq!(count(&conn, "dynamic_links"), 0);

    lead.job_title = text("CTO");
    service.update_lead(&mut lead).unwrap();

    let contact = linked_contact(service.store(), lead_id);
    assert_eq!(contact.first_name.as_deref(), Some("Jane"));
    assert_eq!(contact.designation.as_deref(), Some("CTO"));
    assert_eq!(count(&conn, "contacts"), 1);
}

#[test]
fn failed_lead_insert_rolls_back_created_contact() {
    let conn = open_db_in_memory().unwrap();
    let mut store = RecordingStore::new(&conn);
    store.fail_lead_insert = true;
    let service = LeadService::new(store, NoAvatar);

    let mut lead = Lead::new();
    lead.first_name = text("Jane");
    let err = service.insert_lead(&mut lead).unwrap_err();

    assert!(matches!(err, LeadError::Repo(RepoError::InvalidData(_))));
    assert_eq!(service.store().contact_inserts.get(), 1);
    assert_eq!(count(&conn, "contacts"), 0);
    assert_eq!(count(&conn, "leads"), 0);
    assert!(lead.is_new());
}

#[test]
fn contact_creation_bypasses_store_permissions_but_sync_does_not() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteRecordStore::with_permissions(
        &conn,
        StorePermissions {
            allow_contact_writes: false,
        },
    )
    .unwrap();
    let service = LeadService::new(store, NoAvatar);

    let mut lead = Lead::new();
    lead.first_name = text("Jane");
    let lead_id = service.insert_lead(&mut lead).unwrap();
    assert_eq!(count(&conn, "contacts"), 1);

    lead.first_name = text("Janet");
    let err = service.update_lead(&mut lead).unwrap_err();
    assert!(matches!(
        err,
        LeadError::Repo(RepoError::PermissionDenied("Contact"))
    ));

    let stored = service.get_lead(lead_id).unwrap().unwrap();
    assert_eq!(stored.first_name.as_deref(), Some("Jane"));
}

#[test]
fn first_name_falls_back_to_lead_name_for_contact() {
    let conn = open_db_in_memory().unwrap();
    let service = LeadService::new(SqliteRecordStore::try_new(&conn).unwrap(), NoAvatar);

    let mut lead = Lead::new();
    lead.organization_name = text("Acme");
    let lead_id = service.insert_lead(&mut lead).unwrap();

    let contact = linked_contact(service.store(), lead_id);
    assert_eq!(contact.first_name.as_deref(), Some("Acme"));
    assert_eq!(contact.links[0].link_title.as_deref(), Some("Acme"));
}
