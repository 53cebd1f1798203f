//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the typed record-store contract consumed by lead services.
//! - Isolate SQLite query details from validation and orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`LeadNotFound`,
//!   `ContactNotFound`, `PermissionDenied`) in addition to DB errors.

pub mod record_store;
