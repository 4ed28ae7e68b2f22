//! Capability grants held by identities.

use std::collections::BTreeSet;

pub const RISK_EVENT_CREATE: &str = "risk_event.create";
pub const RISK_EVENT_APPROVE: &str = "risk_event.approve";
pub const RISK_EVENT_READ: &str = "risk_event.read";
pub const USER_MANAGE: &str = "user.manage";

/// Stored marker for the universal grant.
pub const UNIVERSAL_MARKER: &str = "*";

/// One entry of an identity's capability set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Grant {
    Universal,
    Named(String),
}

impl Grant {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "" => None,
            UNIVERSAL_MARKER => Some(Grant::Universal),
            name => Some(Grant::Named(name.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Grant::Universal => UNIVERSAL_MARKER,
            Grant::Named(name) => name,
        }
    }
}

/// Unordered set of grants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    grants: BTreeSet<Grant>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_strings<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            grants: raw
                .into_iter()
                .filter_map(|s| Grant::parse(s.as_ref()))
                .collect(),
        }
    }

    pub fn is_universal(&self) -> bool {
        self.grants.contains(&Grant::Universal)
    }

    /// True if the set holds the universal grant or `capability` literally.
    pub fn allows(&self, capability: &str) -> bool {
        self.is_universal() || self.grants.contains(&Grant::Named(capability.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Grant> {
        self.grants.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.grants.iter().map(|g| g.as_str().to_string()).collect()
    }
}
