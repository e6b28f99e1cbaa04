use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote-assigned, stable account identifier (e.g. "1234567890").
pub type AccountId = String;

const RESOURCE_PREFIX: &str = "customers/";

/// How the initiating credential can reach an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AccessLevel {
    /// The account was in the caller's directly visible set.
    DirectAccess,
    /// Reached only by acting as a manager above it.
    ViaManager,
    /// Details could not be fetched for an account outside the visible set.
    #[default]
    Unknown,
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessLevel::DirectAccess => write!(f, "Direct Access"),
            AccessLevel::ViaManager => write!(f, "Via Manager"),
            AccessLevel::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    #[default]
    Enabled,
    Suspended,
    Canceled,
    Closed,
}

/// Display attributes returned by a single-account lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AccountDetails {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub currency_code: String,
    #[serde(default)]
    pub time_zone: String,
    #[serde(default)]
    pub is_manager: bool,
}

impl AccountDetails {
    pub fn new(display_name: impl Into<String>, is_manager: bool) -> Self {
        Self {
            display_name: display_name.into(),
            is_manager,
            ..Default::default()
        }
    }

    pub fn with_currency(mut self, currency_code: impl Into<String>) -> Self {
        self.currency_code = currency_code.into();
        self
    }

    pub fn with_time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = time_zone.into();
        self
    }

    /// Stand-in for an account whose details could not be fetched.
    pub fn placeholder() -> Self {
        Self::new("Unknown", false)
    }
}

/// One row of a manager's client listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildAccount {
    pub id: AccountId,
    pub is_manager: bool,
    #[serde(default)]
    pub status: AccountStatus,
    /// Display attributes when the listing carries them inline.
    #[serde(default)]
    pub details: Option<AccountDetails>,
}

impl ChildAccount {
    pub fn new(id: impl Into<AccountId>, is_manager: bool) -> Self {
        Self {
            id: id.into(),
            is_manager,
            status: AccountStatus::Enabled,
            details: None,
        }
    }

    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_details(mut self, details: AccountDetails) -> Self {
        self.details = Some(details);
        self
    }
}

/// A discovered node of the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    pub resource_name: String,
    pub display_name: String,
    pub currency_code: String,
    pub time_zone: String,
    pub is_manager: bool,
    /// Distance from the entry point whose expansion produced this node.
    pub level: usize,
    /// Manager whose listing produced this node, or the node itself for roots.
    pub discovered_via: AccountId,
    pub access_level: AccessLevel,
}

impl Account {
    pub fn from_details(
        id: impl Into<AccountId>,
        details: AccountDetails,
        level: usize,
        discovered_via: impl Into<AccountId>,
        access_level: AccessLevel,
    ) -> Self {
        let id = id.into();
        Self {
            resource_name: resource_name(&id),
            id,
            display_name: details.display_name,
            currency_code: details.currency_code,
            time_zone: details.time_zone,
            is_manager: details.is_manager,
            level,
            discovered_via: discovered_via.into(),
            access_level,
        }
    }

    pub fn is_root(&self) -> bool {
        self.discovered_via == self.id
    }

    pub fn account_type(&self) -> &'static str {
        if self.is_manager {
            "Manager"
        } else {
            "Client"
        }
    }
}

pub fn resource_name(account_id: &str) -> String {
    format!("{RESOURCE_PREFIX}{account_id}")
}

/// "customers/1234567890" -> "1234567890". Strings without a `/` are
/// returned unchanged.
pub fn customer_id_from_resource_name(resource_name: &str) -> &str {
    match resource_name.rfind('/') {
        Some(idx) => &resource_name[idx + 1..],
        None => resource_name,
    }
}

/// Strips the display separators from ids such as "123-456-7890".
pub fn normalize_customer_id(raw: &str) -> String {
    raw.trim().chars().filter(|c| *c != '-').collect()
}

/// Renders 10-digit ids as `xxx-xxx-xxxx`; other ids pass through.
pub fn format_customer_id(account_id: &str) -> String {
    if account_id.len() == 10 && account_id.chars().all(|c| c.is_ascii_digit()) {
        format!(
            "{}-{}-{}",
            &account_id[..3],
            &account_id[3..6],
            &account_id[6..]
        )
    } else {
        account_id.to_string()
    }
}
