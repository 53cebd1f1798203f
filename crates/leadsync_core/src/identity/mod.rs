//! Identity services consumed by lead validation.
//!
//! # Responsibility
//! - Define the email-syntax and avatar-lookup contract used by core.
//! - Provide the Gravatar-backed default implementation.
//!
//! # Invariants
//! - Avatar lookup is best-effort: failures surface as `None`, never as errors.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod gravatar;

pub use gravatar::{gravatar_url, is_valid_email, GravatarIdentityService};

/// Raised when an email address is syntactically malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailFormatError {
    pub address: String,
}

impl Display for EmailFormatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}` is not a valid email address", self.address)
    }
}

impl Error for EmailFormatError {}

/// Email and avatar collaborator used by `LeadValidator`.
pub trait IdentityService {
    /// Fails when `address` is not a syntactically valid email address.
    fn validate_email_syntax(&self, address: &str) -> Result<(), EmailFormatError>;
    /// Returns an avatar URL for `address`, or `None` when unavailable.
    fn lookup_avatar(&self, address: &str) -> Option<String>;
}

impl<T: IdentityService + ?Sized> IdentityService for &T {
    fn validate_email_syntax(&self, address: &str) -> Result<(), EmailFormatError> {
        (**self).validate_email_syntax(address)
    }

    fn lookup_avatar(&self, address: &str) -> Option<String> {
        (**self).lookup_avatar(address)
    }
}
