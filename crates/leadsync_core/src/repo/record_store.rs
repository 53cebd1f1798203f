//! Record store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide typed persistence for leads, contacts and dynamic links.
//! - Run the contact write hook that derives primary fields.
//! - Scope multi-statement writes in savepoints so callers get
//!   all-or-nothing semantics.
//!
//! # Invariants
//! - Contact child collections are replaced wholesale on every write and
//!   keep their order through the `idx` column.
//! - Contact writes without a permission bypass require
//!   `StorePermissions::allow_contact_writes`.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::config::PermissionsConfig;
use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::contact::{
    Contact, ContactEmail, ContactId, ContactPhone, DynamicLink, DynamicLinkId,
};
use crate::model::lead::{sort_options, Lead, LeadId, LeadStatus};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const LEADS_DEFAULT_LIMIT: u32 = 20;
const LEADS_LIMIT_MAX: u32 = 100;
const SAVEPOINT_NAME: &str = "leadsync_write";

const LEAD_SELECT_SQL: &str = "SELECT
    name,
    salutation,
    first_name,
    middle_name,
    last_name,
    lead_name,
    organization_name,
    title,
    email,
    lead_owner,
    image,
    phone,
    mobile_no,
    job_title,
    gender,
    status,
    creation,
    modified
FROM leads";

const REQUIRED_TABLES: &[&str] = &[
    "leads",
    "contacts",
    "contact_emails",
    "contact_phones",
    "dynamic_links",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence error for lead/contact operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    LeadNotFound(LeadId),
    ContactNotFound(ContactId),
    DynamicLinkNotFound(DynamicLinkId),
    /// Write rejected by store permissions.
    PermissionDenied(&'static str),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::LeadNotFound(id) => write!(f, "lead not found: {id}"),
            Self::ContactNotFound(id) => write!(f, "contact not found: {id}"),
            Self::DynamicLinkNotFound(id) => write!(f, "dynamic link not found: {id}"),
            Self::PermissionDenied(doctype) => {
                write!(f, "not permitted to write {doctype} records")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Write permissions enforced by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorePermissions {
    pub allow_contact_writes: bool,
}

impl Default for StorePermissions {
    fn default() -> Self {
        Self {
            allow_contact_writes: true,
        }
    }
}

impl From<&PermissionsConfig> for StorePermissions {
    fn from(value: &PermissionsConfig) -> Self {
        Self {
            allow_contact_writes: value.allow_contact_writes,
        }
    }
}

/// Query options for listing leads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadListQuery {
    /// One of the `sort_options()` values. Defaults to `modified`.
    pub sort_by: Option<String>,
    /// Defaults to descending when `sort_by` is unset.
    pub descending: Option<bool>,
    /// Defaults to 20 and clamps to 100.
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Normalizes list limit according to the lead list contract.
pub fn normalize_lead_limit(limit: Option<u32>) -> u32 {
    match limit {
        None | Some(0) => LEADS_DEFAULT_LIMIT,
        Some(value) => value.min(LEADS_LIMIT_MAX),
    }
}

/// Typed persistence contract consumed by lead validation and services.
pub trait RecordStore {
    /// Inserts a new lead, assigning `name` and timestamps.
    fn insert_lead(&self, lead: &mut Lead) -> RepoResult<LeadId>;
    /// Overwrites an existing lead and refreshes `updated_at`.
    fn update_lead(&self, lead: &mut Lead) -> RepoResult<()>;
    fn get_lead(&self, id: LeadId) -> RepoResult<Option<Lead>>;
    fn list_leads(&self, query: &LeadListQuery) -> RepoResult<Vec<Lead>>;

    /// Inserts a new contact. `ignore_permissions` marks a trusted write and
    /// stays on the contact for later saves of the same instance.
    fn insert_contact(
        &self,
        contact: &mut Contact,
        ignore_permissions: bool,
    ) -> RepoResult<ContactId>;
    /// Persists an existing contact including all child collections.
    fn save_contact(&self, contact: &mut Contact) -> RepoResult<()>;
    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>>;

    /// Returns the dynamic link pointing at (`link_doctype`, `link_name`).
    fn find_dynamic_link(
        &self,
        link_doctype: &str,
        link_name: &str,
    ) -> RepoResult<Option<DynamicLinkId>>;
    /// Returns the contact owning a dynamic link.
    fn dynamic_link_parent(&self, link: DynamicLinkId) -> RepoResult<ContactId>;

    /// Replaces `contact` with its stored state, keeping in-memory flags.
    fn reload_contact(&self, contact: &mut Contact) -> RepoResult<()> {
        let id = contact.name.ok_or_else(|| {
            RepoError::InvalidData("cannot reload a contact that was never inserted".to_string())
        })?;
        let flags = contact.flags;
        *contact = self
            .get_contact(id)?
            .ok_or(RepoError::ContactNotFound(id))?;
        contact.flags = flags;
        Ok(())
    }

    /// Runs `operation` so that all of its writes apply together or not at all.
    fn atomically<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        E: From<RepoError>,
        F: FnOnce() -> Result<T, E>,
    {
        operation()
    }
}

/// SQLite-backed record store.
pub struct SqliteRecordStore<'conn> {
    conn: &'conn Connection,
    permissions: StorePermissions,
}

impl<'conn> SqliteRecordStore<'conn> {
    /// Constructs a store from a migrated connection with default permissions.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        Self::with_permissions(conn, StorePermissions::default())
    }

    pub fn with_permissions(
        conn: &'conn Connection,
        permissions: StorePermissions,
    ) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn, permissions })
    }

    fn write_contact(&self, contact: &mut Contact, insert: bool) -> RepoResult<ContactId> {
        if !contact.flags.ignore_permissions && !self.permissions.allow_contact_writes {
            return Err(RepoError::PermissionDenied("Contact"));
        }

        contact.apply_derived_fields();
        for link in &mut contact.links {
            link.name.get_or_insert_with(Uuid::new_v4);
        }

        let id = if insert {
            let id = Uuid::new_v4();
            self.conn.execute(
                "INSERT INTO contacts (
                    name, salutation, first_name, middle_name, last_name, full_name,
                    gender, designation, company_name, image, email_id, phone, mobile_no
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);",
                params![
                    id.to_string(),
                    contact.salutation,
                    contact.first_name,
                    contact.middle_name,
                    contact.last_name,
                    contact.full_name,
                    contact.gender,
                    contact.designation,
                    contact.company_name,
                    contact.image,
                    contact.email_id,
                    contact.phone,
                    contact.mobile_no,
                ],
            )?;
            id
        } else {
            let id = contact.name.ok_or_else(|| {
                RepoError::InvalidData("cannot save a contact that was never inserted".to_string())
            })?;
            let changed = self.conn.execute(
                "UPDATE contacts
                 SET
                    salutation = ?2,
                    first_name = ?3,
                    middle_name = ?4,
                    last_name = ?5,
                    full_name = ?6,
                    gender = ?7,
                    designation = ?8,
                    company_name = ?9,
                    image = ?10,
                    email_id = ?11,
                    phone = ?12,
                    mobile_no = ?13,
                    modified = (strftime('%s', 'now') * 1000)
                 WHERE name = ?1;",
                params![
                    id.to_string(),
                    contact.salutation,
                    contact.first_name,
                    contact.middle_name,
                    contact.last_name,
                    contact.full_name,
                    contact.gender,
                    contact.designation,
                    contact.company_name,
                    contact.image,
                    contact.email_id,
                    contact.phone,
                    contact.mobile_no,
                ],
            )?;
            if changed == 0 {
                return Err(RepoError::ContactNotFound(id));
            }
            id
        };

        self.replace_contact_children(id, contact)?;
        Ok(id)
    }

    fn replace_contact_children(&self, id: ContactId, contact: &Contact) -> RepoResult<()> {
        let parent = id.to_string();
        for table in ["contact_emails", "contact_phones", "dynamic_links"] {
            self.conn
                .execute(&format!("DELETE FROM {table} WHERE parent = ?1;"), [&parent])?;
        }

        for (idx, email) in contact.email_ids.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO contact_emails (parent, idx, email_id, is_primary)
                 VALUES (?1, ?2, ?3, ?4);",
                params![parent, idx as i64, email.email_id, bool_to_int(email.is_primary)],
            )?;
        }

        for (idx, phone) in contact.phone_nos.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO contact_phones (parent, idx, phone, is_primary_phone, is_primary_mobile_no)
                 VALUES (?1, ?2, ?3, ?4, ?5);",
                params![
                    parent,
                    idx as i64,
                    phone.phone,
                    bool_to_int(phone.is_primary_phone),
                    bool_to_int(phone.is_primary_mobile_no),
                ],
            )?;
        }

        for (idx, link) in contact.links.iter().enumerate() {
            let link_id = link.name.map(|value| value.to_string());
            self.conn.execute(
                "INSERT INTO dynamic_links (name, parent, idx, link_doctype, link_name, link_title)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                params![
                    link_id,
                    parent,
                    idx as i64,
                    link.link_doctype,
                    link.link_name,
                    link.link_title,
                ],
            )?;
        }

        Ok(())
    }

    fn load_contact_children(&self, contact: &mut Contact, parent: &str) -> RepoResult<()> {
        let mut stmt = self.conn.prepare(
            "SELECT email_id, is_primary FROM contact_emails WHERE parent = ?1 ORDER BY idx ASC;",
        )?;
        let mut rows = stmt.query([parent])?;
        while let Some(row) = rows.next()? {
            contact.email_ids.push(ContactEmail {
                email_id: row.get("email_id")?,
                is_primary: int_to_bool(row.get("is_primary")?, "contact_emails.is_primary")?,
            });
        }

        let mut stmt = self.conn.prepare(
            "SELECT phone, is_primary_phone, is_primary_mobile_no
             FROM contact_phones WHERE parent = ?1 ORDER BY idx ASC;",
        )?;
        let mut rows = stmt.query([parent])?;
        while let Some(row) = rows.next()? {
            contact.phone_nos.push(ContactPhone {
                phone: row.get("phone")?,
                is_primary_phone: int_to_bool(
                    row.get("is_primary_phone")?,
                    "contact_phones.is_primary_phone",
                )?,
                is_primary_mobile_no: int_to_bool(
                    row.get("is_primary_mobile_no")?,
                    "contact_phones.is_primary_mobile_no",
                )?,
            });
        }

        let mut stmt = self.conn.prepare(
            "SELECT name, link_doctype, link_name, link_title
             FROM dynamic_links WHERE parent = ?1 ORDER BY idx ASC;",
        )?;
        let mut rows = stmt.query([parent])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get("name")?;
            contact.links.push(DynamicLink {
                name: Some(parse_uuid(&name, "dynamic_links.name")?),
                link_doctype: row.get("link_doctype")?,
                link_name: row.get("link_name")?,
                link_title: row.get("link_title")?,
            });
        }

        Ok(())
    }
}

impl RecordStore for SqliteRecordStore<'_> {
    fn insert_lead(&self, lead: &mut Lead) -> RepoResult<LeadId> {
        let id = Uuid::new_v4();
        let (creation, modified) = self.conn.query_row(
            "INSERT INTO leads (
                name, salutation, first_name, middle_name, last_name, lead_name,
                organization_name, title, email, lead_owner, image, phone, mobile_no,
                job_title, gender, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            RETURNING creation, modified;",
            params![
                id.to_string(),
                lead.salutation,
                lead.first_name,
                lead.middle_name,
                lead.last_name,
                lead.lead_name,
                lead.organization_name,
                lead.title,
                lead.email,
                lead.lead_owner,
                lead.image,
                lead.phone,
                lead.mobile_no,
                lead.job_title,
                lead.gender,
                lead.status.as_str(),
            ],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;

        lead.name = Some(id);
        lead.created_at = creation;
        lead.updated_at = modified;
        Ok(id)
    }

    fn update_lead(&self, lead: &mut Lead) -> RepoResult<()> {
        let id = lead.name.ok_or_else(|| {
            RepoError::InvalidData("cannot update a lead that was never inserted".to_string())
        })?;

        let modified = self
            .conn
            .query_row(
                "UPDATE leads
                 SET
                    salutation = ?2,
                    first_name = ?3,
                    middle_name = ?4,
                    last_name = ?5,
                    lead_name = ?6,
                    organization_name = ?7,
                    title = ?8,
                    email = ?9,
                    lead_owner = ?10,
                    image = ?11,
                    phone = ?12,
                    mobile_no = ?13,
                    job_title = ?14,
                    gender = ?15,
                    status = ?16,
                    modified = (strftime('%s', 'now') * 1000)
                 WHERE name = ?1
                 RETURNING modified;",
                params![
                    id.to_string(),
                    lead.salutation,
                    lead.first_name,
                    lead.middle_name,
                    lead.last_name,
                    lead.lead_name,
                    lead.organization_name,
                    lead.title,
                    lead.email,
                    lead.lead_owner,
                    lead.image,
                    lead.phone,
                    lead.mobile_no,
                    lead.job_title,
                    lead.gender,
                    lead.status.as_str(),
                ],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .ok_or(RepoError::LeadNotFound(id))?;

        lead.updated_at = modified;
        Ok(())
    }

    fn get_lead(&self, id: LeadId) -> RepoResult<Option<Lead>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{LEAD_SELECT_SQL} WHERE name = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_lead_row(row)?));
        }
        Ok(None)
    }

    fn list_leads(&self, query: &LeadListQuery) -> RepoResult<Vec<Lead>> {
        let sort_by = match query.sort_by.as_deref() {
            Some(field) => sort_options()
                .iter()
                .find(|option| option.value == field)
                .map(|option| option.value)
                .ok_or_else(|| RepoError::InvalidData(format!("unsupported sort field `{field}`")))?,
            None => "modified",
        };
        let direction = if query.descending.unwrap_or(query.sort_by.is_none()) {
            "DESC"
        } else {
            "ASC"
        };

        let mut sql = format!("{LEAD_SELECT_SQL} ORDER BY {sort_by} {direction}, name ASC LIMIT ?");
        let mut bind_values = vec![Value::Integer(i64::from(normalize_lead_limit(query.limit)))];
        if query.offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut leads = Vec::new();
        while let Some(row) = rows.next()? {
            leads.push(parse_lead_row(row)?);
        }
        Ok(leads)
    }

    fn insert_contact(
        &self,
        contact: &mut Contact,
        ignore_permissions: bool,
    ) -> RepoResult<ContactId> {
        if ignore_permissions {
            contact.flags.ignore_permissions = true;
        }
        let id = self.atomically(|| self.write_contact(contact, true))?;
        contact.name = Some(id);
        Ok(id)
    }

    fn save_contact(&self, contact: &mut Contact) -> RepoResult<()> {
        self.atomically(|| self.write_contact(contact, false))?;
        Ok(())
    }

    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>> {
        let parent = id.to_string();
        let contact = self
            .conn
            .query_row(
                "SELECT
                    name, salutation, first_name, middle_name, last_name, full_name, gender,
                    designation, company_name, image, email_id, phone, mobile_no
                 FROM contacts
                 WHERE name = ?1;",
                [&parent],
                |row| {
                    Ok(Contact {
                        name: Some(id),
                        salutation: row.get("salutation")?,
                        first_name: row.get("first_name")?,
                        middle_name: row.get("middle_name")?,
                        last_name: row.get("last_name")?,
                        full_name: row.get("full_name")?,
                        gender: row.get("gender")?,
                        designation: row.get("designation")?,
                        company_name: row.get("company_name")?,
                        image: row.get("image")?,
                        email_id: row.get("email_id")?,
                        phone: row.get("phone")?,
                        mobile_no: row.get("mobile_no")?,
                        ..Contact::default()
                    })
                },
            )
            .optional()?;

        match contact {
            Some(mut contact) => {
                self.load_contact_children(&mut contact, &parent)?;
                Ok(Some(contact))
            }
            None => Ok(None),
        }
    }

    fn find_dynamic_link(
        &self,
        link_doctype: &str,
        link_name: &str,
    ) -> RepoResult<Option<DynamicLinkId>> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM dynamic_links
                 WHERE link_doctype = ?1 AND link_name = ?2
                 ORDER BY rowid ASC
                 LIMIT 1;",
                params![link_doctype, link_name],
                |row| row.get(0),
            )
            .optional()?;

        found
            .map(|value| parse_uuid(&value, "dynamic_links.name"))
            .transpose()
    }

    fn dynamic_link_parent(&self, link: DynamicLinkId) -> RepoResult<ContactId> {
        let parent: String = self
            .conn
            .query_row(
                "SELECT parent FROM dynamic_links WHERE name = ?1;",
                [link.to_string()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(RepoError::DynamicLinkNotFound(link))?;
        parse_uuid(&parent, "dynamic_links.parent")
    }

    fn atomically<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        E: From<RepoError>,
        F: FnOnce() -> Result<T, E>,
    {
        // Savepoints nest inside an outer transaction owned by the caller.
        self.conn
            .execute_batch(&format!("SAVEPOINT {SAVEPOINT_NAME};"))
            .map_err(|err| E::from(RepoError::from(err)))?;

        match operation() {
            Ok(value) => {
                self.conn
                    .execute_batch(&format!("RELEASE SAVEPOINT {SAVEPOINT_NAME};"))
                    .map_err(|err| E::from(RepoError::from(err)))?;
                Ok(value)
            }
            Err(err) => {
                let rollback = self.conn.execute_batch(&format!(
                    "ROLLBACK TO SAVEPOINT {SAVEPOINT_NAME}; RELEASE SAVEPOINT {SAVEPOINT_NAME};"
                ));
                if let Err(rollback_err) = rollback {
                    log::error!(
                        "event=store_rollback module=repo status=error error={}",
                        rollback_err
                    );
                }
                Err(err)
            }
        }
    }
}

fn parse_lead_row(row: &Row<'_>) -> RepoResult<Lead> {
    let name: String = row.get("name")?;
    let status_text: String = row.get("status")?;
    let status = LeadStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid lead status `{status_text}` in leads.status"))
    })?;

    Ok(Lead {
        name: Some(parse_uuid(&name, "leads.name")?),
        salutation: row.get("salutation")?,
        first_name: row.get("first_name")?,
        middle_name: row.get("middle_name")?,
        last_name: row.get("last_name")?,
        lead_name: row.get("lead_name")?,
        organization_name: row.get("organization_name")?,
        title: row.get("title")?,
        email: row.get("email")?,
        lead_owner: row.get("lead_owner")?,
        image: row.get("image")?,
        phone: row.get("phone")?,
        mobile_no: row.get("mobile_no")?,
        job_title: row.get("job_title")?,
        gender: row.get("gender")?,
        status,
        created_at: row.get("creation")?,
        updated_at: row.get("modified")?,
        ..Lead::default()
    })
}

fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &table in REQUIRED_TABLES {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }

    Ok(())
}
