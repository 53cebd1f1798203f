//! Contact domain model.
//!
//! # Responsibility
//! - Hold person identity details shared by leads and other records.
//! - Keep ordered child collections for emails, phone numbers and
//!   back-links to the records that reference the contact.
//!
//! # Invariants
//! - Child collections keep insertion order; storage mirrors it via `idx`.
//! - `full_name`, `email_id`, `phone` and `mobile_no` are derived by the
//!   store hook and are read-only for callers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier assigned to a contact by the record store.
pub type ContactId = Uuid;

/// Stable identifier of one dynamic link row.
pub type DynamicLinkId = Uuid;

/// One email address owned by a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEmail {
    pub email_id: String,
    pub is_primary: bool,
}

impl ContactEmail {
    pub fn primary(email_id: impl Into<String>) -> Self {
        Self {
            email_id: email_id.into(),
            is_primary: true,
        }
    }
}

/// One phone number owned by a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPhone {
    pub phone: String,
    pub is_primary_phone: bool,
    pub is_primary_mobile_no: bool,
}

impl ContactPhone {
    /// Entry tagged as the primary landline/phone number.
    pub fn primary_phone(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            is_primary_phone: true,
            is_primary_mobile_no: false,
        }
    }

    /// Entry tagged as the primary mobile number.
    pub fn primary_mobile(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            is_primary_phone: false,
            is_primary_mobile_no: true,
        }
    }
}

/// Polymorphic back-link from a contact to a record that references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicLink {
    /// Store-assigned row id; kept stable across contact saves.
    #[serde(default)]
    pub name: Option<DynamicLinkId>,
    /// Record type of the linking entity, e.g. `CRM Lead`.
    pub link_doctype: String,
    /// Id of the linking entity.
    pub link_name: String,
    /// Display title captured when the link was created.
    pub link_title: Option<String>,
}

impl DynamicLink {
    pub fn new(
        link_doctype: impl Into<String>,
        link_name: impl Into<String>,
        link_title: Option<String>,
    ) -> Self {
        Self {
            name: None,
            link_doctype: link_doctype.into(),
            link_name: link_name.into(),
            link_title,
        }
    }
}

/// Write switches for one contact write. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContactFlags {
    /// Trusted internal write that skips store permission checks.
    pub ignore_permissions: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Store-assigned id; `None` until inserted.
    pub name: Option<ContactId>,
    pub salutation: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub designation: Option<String>,
    pub company_name: Option<String>,
    /// Avatar URL; empty string when none.
    pub image: String,
    #[serde(default)]
    pub email_ids: Vec<ContactEmail>,
    #[serde(default)]
    pub phone_nos: Vec<ContactPhone>,
    #[serde(default)]
    pub links: Vec<DynamicLink>,
    /// Derived by the store hook.
    pub full_name: Option<String>,
    /// Derived: primary email address.
    pub email_id: Option<String>,
    /// Derived: primary phone number.
    pub phone: Option<String>,
    /// Derived: primary mobile number.
    pub mobile_no: Option<String>,
    #[serde(skip)]
    pub flags: ContactFlags,
}

impl Contact {
    /// Creates an empty, not-yet-persisted contact.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recomputes store-derived fields from identity and child collections.
    ///
    /// Primary selection takes the most recently appended flagged entry,
    /// falling back to the first entry for emails.
    pub fn apply_derived_fields(&mut self) {
        let parts = [&self.first_name, &self.middle_name, &self.last_name];
        let full_name = parts
            .iter()
            .filter_map(|part| part.as_deref())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        self.full_name = if full_name.is_empty() {
            None
        } else {
            Some(full_name)
        };

        self.email_id = self
            .email_ids
            .iter()
            .rev()
            .find(|email| email.is_primary)
            .or_else(|| self.email_ids.first())
            .map(|email| email.email_id.clone());
        self.phone = self
            .phone_nos
            .iter()
            .rev()
            .find(|phone| phone.is_primary_phone)
            .map(|phone| phone.phone.clone());
        self.mobile_no = self
            .phone_nos
            .iter()
            .rev()
            .find(|phone| phone.is_primary_mobile_no)
            .map(|phone| phone.phone.clone());
    }
}
