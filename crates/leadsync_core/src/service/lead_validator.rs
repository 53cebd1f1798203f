//! Lead validation and contact synchronization.
//!
//! # Responsibility
//! - Derive `lead_name` and `title` from name parts, organization or email.
//! - Validate the lead email and fill the avatar.
//! - Create the lead's contact on first insert and push identity changes to
//!   it on later saves.
//!
//! # Invariants
//! - `email` never equals `lead_owner` after a successful validation.
//! - An explicitly set `image` is never replaced on update.
//! - A linked contact receives at most one write per lead save.
//! - Phone changes append to the contact's numbers; mobile changes replace
//!   them. Both policies are kept as-is.

use crate::identity::{EmailFormatError, IdentityService};
use crate::model::contact::{Contact, ContactEmail, ContactPhone, DynamicLink};
use crate::model::lead::{non_empty, Lead, LeadField, LeadId, LEAD_LINK_DOCTYPE};
use crate::repo::record_store::{RecordStore, RepoError};
use log::{debug, info};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Save-blocking lead failures.
#[derive(Debug)]
pub enum LeadError {
    /// No person name, organization name or email, and no bypass flag.
    MissingIdentity,
    InvalidEmailFormat(EmailFormatError),
    /// Lead email equals the owning user's email.
    OwnerEmailConflict,
    /// Operation needs a persisted lead id but the lead was never inserted.
    MissingLeadId,
    /// Insert requested for a lead that already has an id.
    AlreadyInserted(LeadId),
    Repo(RepoError),
}

impl LeadError {
    /// Stable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingIdentity => "missing_identity",
            Self::InvalidEmailFormat(_) => "invalid_email_format",
            Self::OwnerEmailConflict => "owner_email_conflict",
            Self::MissingLeadId => "missing_lead_id",
            Self::AlreadyInserted(_) => "already_inserted",
            Self::Repo(_) => "repo_error",
        }
    }
}

impl Display for LeadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingIdentity => write!(
                f,
                "A Lead requires either a person's name or an organization's name"
            ),
            Self::InvalidEmailFormat(err) => write!(f, "{err}"),
            Self::OwnerEmailConflict => {
                write!(f, "Lead Owner cannot be same as the Lead Email Address")
            }
            Self::MissingLeadId => write!(f, "lead has not been inserted yet"),
            Self::AlreadyInserted(id) => write!(f, "lead already inserted: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LeadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidEmailFormat(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EmailFormatError> for LeadError {
    fn from(value: EmailFormatError) -> Self {
        Self::InvalidEmailFormat(value)
    }
}

impl From<RepoError> for LeadError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Sets `lead_name` from salutation and name parts when `first_name` is set.
pub fn set_full_name(lead: &mut Lead) {
    if non_empty(&lead.first_name).is_none() {
        return;
    }

    let full_name = [
        &lead.salutation,
        &lead.first_name,
        &lead.middle_name,
        &lead.last_name,
    ]
    .into_iter()
    .filter_map(non_empty)
    .collect::<Vec<_>>()
    .join(" ");
    lead.lead_name = Some(full_name);
}

/// Falls back to organization name, then the email local part, for an
/// unset `lead_name`.
///
/// With `ignore_mandatory` and nothing to derive from, `lead_name` stays unset.
pub fn set_lead_name(lead: &mut Lead) -> Result<(), LeadError> {
    if non_empty(&lead.lead_name).is_some() {
        return Ok(());
    }

    if let Some(organization) = non_empty(&lead.organization_name) {
        lead.lead_name = Some(organization.to_string());
    } else if let Some(email) = non_empty(&lead.email) {
        let local_part = email.split('@').next().unwrap_or(email);
        lead.lead_name = Some(local_part.to_string());
    } else if !lead.flags.ignore_mandatory {
        return Err(LeadError::MissingIdentity);
    }
    Ok(())
}

/// Sets `title` to the organization name, else the lead name.
pub fn set_title(lead: &mut Lead) {
    lead.title = non_empty(&lead.organization_name)
        .or_else(|| non_empty(&lead.lead_name))
        .map(str::to_string);
}

/// Lifecycle operations for one lead save.
pub struct LeadValidator<'a, S, I> {
    store: &'a S,
    identity: &'a I,
}

impl<'a, S: RecordStore, I: IdentityService> LeadValidator<'a, S, I> {
    pub fn new(store: &'a S, identity: &'a I) -> Self {
        Self { store, identity }
    }

    /// Pre-save hook: derive names, validate email, sync the linked contact.
    ///
    /// `previous` is the last persisted state of `lead`; `None` for inserts.
    pub fn validate(&self, lead: &mut Lead, previous: Option<&Lead>) -> Result<(), LeadError> {
        set_full_name(lead);
        set_lead_name(lead)?;
        set_title(lead);
        self.validate_email(lead)?;
        if !lead.is_new() {
            self.validate_contact(lead, previous)?;
        }
        Ok(())
    }

    /// Validates `email` and fills `image` from the avatar lookup.
    pub fn validate_email(&self, lead: &mut Lead) -> Result<(), LeadError> {
        let Some(email) = non_empty(&lead.email) else {
            return Ok(());
        };

        if !lead.flags.ignore_email_validation {
            self.identity.validate_email_syntax(email)?;
        }

        if non_empty(&lead.lead_owner) == Some(email) {
            return Err(LeadError::OwnerEmailConflict);
        }

        if lead.is_new() || non_empty(&lead.image).is_none() {
            let avatar = self.identity.lookup_avatar(email);
            lead.image = avatar;
        }
        Ok(())
    }

    /// Pushes identity changes to the linked contact, or creates and links
    /// one when the lead has none yet.
    pub fn validate_contact(
        &self,
        lead: &mut Lead,
        previous: Option<&Lead>,
    ) -> Result<(), LeadError> {
        let lead_id = lead.name.ok_or(LeadError::MissingLeadId)?;
        let link = self
            .store
            .find_dynamic_link(LEAD_LINK_DOCTYPE, &lead_id.to_string())?;

        let Some(link) = link else {
            info!(
                "event=contact_sync module=service status=relink lead_id={}",
                lead_id
            );
            let mut contact = self.create_contact(lead)?;
            return self.link_to_contact(lead, Some(&mut contact));
        };

        let changed = LeadField::CONTACT_SYNCED
            .iter()
            .any(|field| lead.has_value_changed(previous, *field));
        if !changed {
            debug!(
                "event=contact_sync module=service status=skipped lead_id={}",
                lead_id
            );
            return Ok(());
        }

        let contact_id = self.store.dynamic_link_parent(link)?;
        let mut contact = self
            .store
            .get_contact(contact_id)?
            .ok_or(RepoError::ContactNotFound(contact_id))?;

        contact.first_name = display_first_name(lead);
        contact.last_name = non_empty(&lead.last_name).map(str::to_string);
        contact.salutation = non_empty(&lead.salutation).map(str::to_string);
        contact.image = lead.image.clone().unwrap_or_default();

        if lead.has_value_changed(previous, LeadField::Email) {
            contact.email_ids.clear();
            if let Some(email) = lead.field(LeadField::Email) {
                contact.email_ids.push(ContactEmail::primary(email));
            }
        }
        if lead.has_value_changed(previous, LeadField::Phone) {
            if let Some(phone) = lead.field(LeadField::Phone) {
                contact.phone_nos.push(ContactPhone::primary_phone(phone));
            }
        }
        if lead.has_value_changed(previous, LeadField::MobileNo) {
            contact.phone_nos.clear();
            if let Some(mobile_no) = lead.field(LeadField::MobileNo) {
                contact.phone_nos.push(ContactPhone::primary_mobile(mobile_no));
            }
        }

        self.store.save_contact(&mut contact)?;
        info!(
            "event=contact_sync module=service status=ok lead_id={} contact_id={}",
            lead_id, contact_id
        );
        Ok(())
    }

    /// Creates and persists a contact mirroring the lead's identity fields.
    ///
    /// The write bypasses store permissions and the returned contact is
    /// reloaded so store-derived fields are current.
    pub fn create_contact(&self, lead: &mut Lead) -> Result<Contact, LeadError> {
        if non_empty(&lead.lead_name).is_none() {
            set_full_name(lead);
            set_lead_name(lead)?;
        }

        let mut contact = Contact {
            first_name: display_first_name(lead),
            last_name: non_empty(&lead.last_name).map(str::to_string),
            salutation: non_empty(&lead.salutation).map(str::to_string),
            gender: non_empty(&lead.gender).map(str::to_string),
            designation: non_empty(&lead.job_title).map(str::to_string),
            company_name: non_empty(&lead.organization_name).map(str::to_string),
            image: lead.image.clone().unwrap_or_default(),
            ..Contact::new()
        };

        if let Some(email) = non_empty(&lead.email) {
            contact.email_ids.push(ContactEmail::primary(email));
        }
        if let Some(phone) = non_empty(&lead.phone) {
            contact.phone_nos.push(ContactPhone::primary_phone(phone));
        }
        if let Some(mobile_no) = non_empty(&lead.mobile_no) {
            contact.phone_nos.push(ContactPhone::primary_mobile(mobile_no));
        }

        let contact_id = self.store.insert_contact(&mut contact, true)?;
        self.store.reload_contact(&mut contact)?;
        debug!(
            "event=contact_create module=service status=ok contact_id={} emails={} phones={}",
            contact_id,
            contact.email_ids.len(),
            contact.phone_nos.len()
        );
        Ok(contact)
    }

    /// Appends a back-link to `lead` on `contact` and persists it.
    ///
    /// No-op when there is no pending contact.
    pub fn link_to_contact(
        &self,
        lead: &Lead,
        contact: Option<&mut Contact>,
    ) -> Result<(), LeadError> {
        let Some(contact) = contact else {
            return Ok(());
        };
        let lead_id = lead.name.ok_or(LeadError::MissingLeadId)?;

        contact.links.push(DynamicLink::new(
            LEAD_LINK_DOCTYPE,
            lead_id.to_string(),
            lead.lead_name.clone(),
        ));
        self.store.save_contact(contact)?;
        debug!(
            "event=contact_link module=service status=ok lead_id={} links={}",
            lead_id,
            contact.links.len()
        );
        Ok(())
    }

    /// Pre-insert hook: creates the contact that `after_insert` links.
    pub fn before_insert(&self, lead: &mut Lead) -> Result<Contact, LeadError> {
        self.create_contact(lead)
    }

    /// Post-insert hook: links the pending contact now that the lead has an id.
    pub fn after_insert(
        &self,
        lead: &Lead,
        mut pending: Option<Contact>,
    ) -> Result<Option<Contact>, LeadError> {
        self.link_to_contact(lead, pending.as_mut())?;
        Ok(pending)
    }
}

fn display_first_name(lead: &Lead) -> Option<String> {
    non_empty(&lead.first_name)
        .or_else(|| non_empty(&lead.lead_name))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::{set_full_name, set_lead_name, set_title, LeadError};
    use crate::model::lead::Lead;

    fn text(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    #[test]
    fn full_name_joins_present_parts_in_order() {
        let mut lead = Lead::new();
        lead.salutation = text("Dr");
        lead.first_name = text("Jane");
        lead.middle_name = Some(String::new());
        lead.last_name = text("Doe");

        set_full_name(&mut lead);
        assert_eq!(lead.lead_name.as_deref(), Some("Dr Jane Doe"));
    }

    #[test]
    fn full_name_is_noop_without_first_name() {
        let mut lead = Lead::new();
        lead.last_name = text("Doe");
        lead.lead_name = text("kept");

        set_full_name(&mut lead);
        assert_eq!(lead.lead_name.as_deref(), Some("kept"));
    }

    #[test]
    fn lead_name_prefers_organization_over_email() {
        let mut lead = Lead::new();
        lead.organization_name = text("Acme");
        lead.email = text("bob@example.com");

        set_lead_name(&mut lead).unwrap();
        set_title(&mut lead);
        assert_eq!(lead.lead_name.as_deref(), Some("Acme"));
        assert_eq!(lead.title.as_deref(), Some("Acme"));
    }

    #[test]
    fn lead_name_uses_email_local_part() {
        let mut lead = Lead::new();
        lead.email = text("bob@example.com");

        set_lead_name(&mut lead).unwrap();
        set_title(&mut lead);
        assert_eq!(lead.lead_name.as_deref(), Some("bob"));
        assert_eq!(lead.title.as_deref(), Some("bob"));
    }

    #[test]
    fn lead_name_requires_identity_unless_bypassed() {
        let mut lead = Lead::new();
        assert!(matches!(
            set_lead_name(&mut lead),
            Err(LeadError::MissingIdentity)
        ));

        lead.flags.ignore_mandatory = true;
        set_lead_name(&mut lead).unwrap();
        assert_eq!(lead.lead_name, None);
    }

    #[test]
    fn title_prefers_organization_even_with_person_name() {
        let mut lead = Lead::new();
        lead.first_name = text("Jane");
        lead.organization_name = text("Acme");

        set_full_name(&mut lead);
        set_title(&mut lead);
        assert_eq!(lead.lead_name.as_deref(), Some("Jane"));
        assert_eq!(lead.title.as_deref(), Some("Acme"));
    }
}
