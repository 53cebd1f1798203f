//! Core domain logic for CRM leads and their linked contacts.
//! This crate is the single source of truth for lead validation and
//! lead-to-contact synchronization rules.

pub mod config;
pub mod db;
pub mod identity;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use identity::{EmailFormatError, GravatarIdentityService, IdentityService};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use model::contact::{
    Contact, ContactEmail, ContactFlags, ContactId, ContactPhone, DynamicLink, DynamicLinkId,
};
pub use model::lead::{
    sort_options, Lead, LeadField, LeadFlags, LeadId, LeadStatus, SortOption, LEAD_LINK_DOCTYPE,
};
pub use repo::record_store::{
    LeadListQuery, RecordStore, RepoError, RepoResult, SqliteRecordStore, StorePermissions,
};
pub use service::lead_service::LeadService;
pub use service::lead_validator::{LeadError, LeadValidator};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
