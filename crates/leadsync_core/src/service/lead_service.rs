//! Lead use-case service.
//!
//! # Responsibility
//! - Run the lead save lifecycle: validate, before-insert, persist,
//!   after-insert.
//! - Keep every save all-or-nothing across lead and contact writes.
//!
//! # Invariants
//! - The caller's `Lead` is only updated after the save commits.
//! - The pending contact created before insert is passed explicitly to the
//!   link step; it is never stored on the lead.

use crate::identity::IdentityService;
use crate::model::lead::{sort_options, Lead, LeadId, SortOption};
use crate::repo::record_store::{LeadListQuery, RecordStore, RepoError, RepoResult};
use crate::service::lead_validator::{LeadError, LeadValidator};
use log::{info, warn};
use std::time::Instant;

/// Lead service facade over a record store and identity service.
pub struct LeadService<S, I> {
    store: S,
    identity: I,
}

impl<S: RecordStore, I: IdentityService> LeadService<S, I> {
    pub fn new(store: S, identity: I) -> Self {
        Self { store, identity }
    }

    /// Borrows the lifecycle operations bound to this service's collaborators.
    pub fn validator(&self) -> LeadValidator<'_, S, I> {
        LeadValidator::new(&self.store, &self.identity)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Inserts a new lead, or updates it when it already has an id.
    pub fn save_lead(&self, lead: &mut Lead) -> Result<LeadId, LeadError> {
        match lead.name {
            Some(id) => self.update_lead(lead).map(|()| id),
            None => self.insert_lead(lead),
        }
    }

    /// Inserts a new lead and creates its linked contact.
    ///
    /// # Errors
    /// - `AlreadyInserted` when `lead` already carries an id.
    /// - Validation failures and store errors; nothing is persisted then.
    pub fn insert_lead(&self, lead: &mut Lead) -> Result<LeadId, LeadError> {
        if let Some(id) = lead.name {
            return Err(LeadError::AlreadyInserted(id));
        }

        let started_at = Instant::now();
        let validator = self.validator();
        let mut draft = lead.clone();

        let result: Result<LeadId, LeadError> = self.store.atomically(|| {
            validator.validate(&mut draft, None)?;
            let pending = validator.before_insert(&mut draft)?;
            let id = self.store.insert_lead(&mut draft)?;
            validator.after_insert(&draft, Some(pending))?;
            Ok(id)
        });

        match result {
            Ok(id) => {
                *lead = draft;
                info!(
                    "event=lead_insert module=service status=ok lead_id={} duration_ms={}",
                    id,
                    started_at.elapsed().as_millis()
                );
                Ok(id)
            }
            Err(err) => {
                warn!(
                    "event=lead_insert module=service status=error error_code={} duration_ms={}",
                    err.code(),
                    started_at.elapsed().as_millis()
                );
                Err(err)
            }
        }
    }

    /// Updates an existing lead and pushes identity changes to its contact.
    ///
    /// Change detection compares against the currently stored lead.
    pub fn update_lead(&self, lead: &mut Lead) -> Result<(), LeadError> {
        let id = lead.name.ok_or(LeadError::MissingLeadId)?;
        let started_at = Instant::now();
        let validator = self.validator();
        let mut draft = lead.clone();

        let result: Result<(), LeadError> = self.store.atomically(|| {
            let previous = self
                .store
                .get_lead(id)?
                .ok_or(RepoError::LeadNotFound(id))?;
            validator.validate(&mut draft, Some(&previous))?;
            self.store.update_lead(&mut draft)?;
            Ok(())
        });

        match result {
            Ok(()) => {
                *lead = draft;
                info!(
                    "event=lead_update module=service status=ok lead_id={} duration_ms={}",
                    id,
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    "event=lead_update module=service status=error lead_id={} error_code={} duration_ms={}",
                    id,
                    err.code(),
                    started_at.elapsed().as_millis()
                );
                Err(err)
            }
        }
    }

    pub fn get_lead(&self, id: LeadId) -> RepoResult<Option<Lead>> {
        self.store.get_lead(id)
    }

    pub fn list_leads(&self, query: &LeadListQuery) -> RepoResult<Vec<Lead>> {
        self.store.list_leads(query)
    }

    /// Sort selector metadata for lead lists.
    pub fn sort_options(&self) -> &'static [SortOption] {
        sort_options()
    }
}
