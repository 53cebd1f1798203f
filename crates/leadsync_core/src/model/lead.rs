//! Lead domain model.
//!
//! # Responsibility
//! - Define the canonical sales-prospect record and its save-time flags.
//! - Provide change detection against the last persisted state.
//! - Publish list sort metadata for callers building sort selectors.
//!
//! # Invariants
//! - `name` is assigned by the store at first insert and never reused.
//! - `title` mirrors `organization_name` when present, else `lead_name`.
//! - `flags` are request-scoped and never persisted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier assigned to a lead by the record store.
pub type LeadId = Uuid;

/// Link doctype recorded on contact links that point back to a lead.
pub const LEAD_LINK_DOCTYPE: &str = "CRM Lead";

/// Pipeline state of a lead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Nurture,
    Qualified,
    Unqualified,
    Junk,
}

impl LeadStatus {
    /// Stable storage value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Nurture => "nurture",
            Self::Qualified => "qualified",
            Self::Unqualified => "unqualified",
            Self::Junk => "junk",
        }
    }

    /// Parses a storage value back into a status.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(Self::New),
            "contacted" => Some(Self::Contacted),
            "nurture" => Some(Self::Nurture),
            "qualified" => Some(Self::Qualified),
            "unqualified" => Some(Self::Unqualified),
            "junk" => Some(Self::Junk),
            _ => None,
        }
    }
}

/// Save-time switches supplied by the caller, e.g. bulk import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeadFlags {
    /// Skip the "needs a name, organization or email" requirement.
    pub ignore_mandatory: bool,
    /// Skip email syntax validation.
    pub ignore_email_validation: bool,
}

/// Identity fields whose changes are pushed to the linked contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadField {
    FirstName,
    LastName,
    Email,
    MobileNo,
    Phone,
    Salutation,
    Image,
}

impl LeadField {
    /// Fields checked for contact propagation, in check order.
    pub const CONTACT_SYNCED: [LeadField; 7] = [
        Self::FirstName,
        Self::LastName,
        Self::Email,
        Self::MobileNo,
        Self::Phone,
        Self::Salutation,
        Self::Image,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::Email => "email",
            Self::MobileNo => "mobile_no",
            Self::Phone => "phone",
            Self::Salutation => "salutation",
            Self::Image => "image",
        }
    }
}

/// Canonical lead record.
///
/// Optional text fields use `None` for "not set". Empty strings are treated
/// the same as `None` by every derivation rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    /// Store-assigned id; `None` until the first insert completes.
    pub name: Option<LeadId>,
    pub salutation: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    /// Derived display name.
    pub lead_name: Option<String>,
    pub organization_name: Option<String>,
    /// Derived: organization name, else lead name.
    pub title: Option<String>,
    pub email: Option<String>,
    /// Email of the owning user.
    pub lead_owner: Option<String>,
    /// Avatar URL.
    pub image: Option<String>,
    pub phone: Option<String>,
    pub mobile_no: Option<String>,
    pub job_title: Option<String>,
    pub gender: Option<String>,
    #[serde(default)]
    pub status: LeadStatus,
    /// Epoch milliseconds, maintained by the store.
    #[serde(default)]
    pub created_at: i64,
    /// Epoch milliseconds, maintained by the store.
    #[serde(default)]
    pub updated_at: i64,
    #[serde(skip)]
    pub flags: LeadFlags,
}

impl Lead {
    /// Creates an empty, not-yet-persisted lead.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether this lead has not been inserted yet.
    pub fn is_new(&self) -> bool {
        self.name.is_none()
    }

    /// Returns the non-empty value of one synced field.
    pub fn field(&self, field: LeadField) -> Option<&str> {
        let value = match field {
            LeadField::FirstName => &self.first_name,
            LeadField::LastName => &self.last_name,
            LeadField::Email => &self.email,
            LeadField::MobileNo => &self.mobile_no,
            LeadField::Phone => &self.phone,
            LeadField::Salutation => &self.salutation,
            LeadField::Image => &self.image,
        };
        non_empty(value)
    }

    /// Returns whether `field` differs from the last persisted state.
    ///
    /// A lead without persisted state reports every field as unchanged.
    pub fn has_value_changed(&self, previous: Option<&Lead>, field: LeadField) -> bool {
        match previous {
            Some(previous) => self.field(field) != previous.field(field),
            None => false,
        }
    }
}

/// Returns the value only when it is set and non-empty.
pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|text| !text.is_empty())
}

/// One entry of the lead list sort selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortOption {
    pub label: &'static str,
    pub value: &'static str,
}

const SORT_OPTIONS: &[SortOption] = &[
    SortOption {
        label: "Created",
        value: "creation",
    },
    SortOption {
        label: "Modified",
        value: "modified",
    },
    SortOption {
        label: "Status",
        value: "status",
    },
    SortOption {
        label: "Lead owner",
        value: "lead_owner",
    },
    SortOption {
        label: "Organization",
        value: "organization_name",
    },
    SortOption {
        label: "Name",
        value: "lead_name",
    },
    SortOption {
        label: "First Name",
        value: "first_name",
    },
    SortOption {
        label: "Last Name",
        value: "last_name",
    },
    SortOption {
        label: "Email",
        value: "email",
    },
    SortOption {
        label: "Mobile no",
        value: "mobile_no",
    },
];

/// Ordered (label, field) pairs accepted by lead list sorting.
pub fn sort_options() -> &'static [SortOption] {
    SORT_OPTIONS
}
