//! Gravatar-backed identity service.
//!
//! # Responsibility
//! - Validate email syntax with a precompiled pattern.
//! - Build Gravatar avatar URLs and probe them with a HEAD request.
//!
//! # Invariants
//! - Probe failures of any kind are reported as "no avatar".
//! - Email addresses never appear in log output.

use super::{EmailFormatError, IdentityService};
use crate::config::IdentityConfig;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use std::time::Duration;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?i)[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?$",
    )
    .expect("valid email regex")
});

/// Returns whether `address` (surrounding whitespace ignored) is well formed.
pub fn is_valid_email(address: &str) -> bool {
    EMAIL_RE.is_match(address.trim())
}

/// Builds the Gravatar URL for `address`.
///
/// The hash is SHA-256 over the trimmed, lowercased address. `d=404` makes
/// Gravatar answer 404 for unknown addresses instead of a placeholder.
pub fn gravatar_url(base_url: &str, address: &str, size: u32) -> String {
    let normalized = address.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    format!(
        "{}/{}?d=404&s={}",
        base_url.trim_end_matches('/'),
        hex::encode(digest),
        size
    )
}

/// Default `IdentityService` backed by Gravatar.
pub struct GravatarIdentityService {
    base_url: String,
    avatar_size: u32,
    client: Option<Client>,
}

impl GravatarIdentityService {
    /// Creates a service from identity settings.
    ///
    /// When lookup is disabled, or the HTTP client cannot be built, every
    /// avatar lookup returns `None`.
    pub fn new(config: &IdentityConfig) -> Self {
        let client = if config.gravatar_lookup {
            match Client::builder()
                .timeout(Duration::from_millis(config.lookup_timeout_ms))
                .build()
            {
                Ok(client) => Some(client),
                Err(err) => {
                    warn!(
                        "event=identity_init module=identity status=degraded error_code=http_client_failed error={}",
                        err
                    );
                    None
                }
            }
        } else {
            None
        };

        Self {
            base_url: config.gravatar_base_url.clone(),
            avatar_size: config.avatar_size,
            client,
        }
    }

    /// Returns whether avatar lookups hit the network.
    pub fn lookup_enabled(&self) -> bool {
        self.client.is_some()
    }
}

impl IdentityService for GravatarIdentityService {
    fn validate_email_syntax(&self, address: &str) -> Result<(), EmailFormatError> {
        if is_valid_email(address) {
            Ok(())
        } else {
            Err(EmailFormatError {
                address: address.to_string(),
            })
        }
    }

    fn lookup_avatar(&self, address: &str) -> Option<String> {
        let client = self.client.as_ref()?;
        let url = gravatar_url(&self.base_url, address, self.avatar_size);

        match client.head(url.as_str()).send() {
            Ok(response) if response.status().is_success() => Some(url),
            Ok(response) => {
                debug!(
                    "event=avatar_lookup module=identity status=miss http_status={}",
                    response.status().as_u16()
                );
                None
            }
            Err(err) => {
                debug!(
                    "event=avatar_lookup module=identity status=error timeout={}",
                    err.is_timeout()
                );
                None
            }
        }
    }
}
