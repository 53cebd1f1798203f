//! Core use-case services.
//!
//! # Responsibility
//! - Implement the lead lifecycle hooks and contact synchronization.
//! - Orchestrate record-store calls into transactional save operations.

pub mod lead_service;
pub mod lead_validator;
