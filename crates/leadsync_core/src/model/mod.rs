//! Domain model for leads and their linked contacts.
//!
//! # Responsibility
//! - Define canonical typed records used by core business logic.
//! - Keep field sets fixed and known; no reflective field access.
//!
//! # Invariants
//! - Every persisted record is identified by a store-assigned UUID.
//! - Request-scoped flags live beside records but are never persisted.

pub mod contact;
pub mod lead;
