//! ACL rule types, access bitmask and decisions

use crate::error::RowError;
use crate::mqtt::TopicMatcher;
use std::fmt;
use std::net::IpAddr;
use std::ops::BitOr;

/// Owner value marking a rule as applying to every user
pub const GLOBAL_OWNER: &str = "*";

/// Access bitmask: READ=1, WRITE=2, SUBSCRIBE=4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Access(u8);

impl Access {
    pub const NONE: Access = Access(0);
    pub const READ: Access = Access(1);
    pub const WRITE: Access = Access(2);
    pub const SUBSCRIBE: Access = Access(4);
    pub const ALL: Access = Access(7);

    /// Build from a raw store value, keeping only the known bits
    ///
    /// Negative values are rejected.
    pub fn from_bits(bits: i64) -> Option<Self> {
        if bits < 0 {
            return None;
        }
        Some(Access((bits & Self::ALL.0 as i64) as u8))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether any bit of `other` is also set here
    pub fn intersects(self, other: Access) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether every bit of `other` is also set here
    pub fn contains(self, other: Access) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Access {
    type Output = Access;

    fn bitor(self, rhs: Access) -> Access {
        Access(self.0 | rhs.0)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.intersects(Access::READ) {
            names.push("read");
        }
        if self.intersects(Access::WRITE) {
            names.push("write");
        }
        if self.intersects(Access::SUBSCRIBE) {
            names.push("subscribe");
        }
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// A single ACL row: owner, topic pattern and granted access
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclRule {
    /// Username, or `*` for a global rule
    pub owner: String,
    /// Topic pattern, may embed `{username}`/`{clientid}`
    pub pattern: String,
    /// Granted access bits
    pub access: Access,
}

impl AclRule {
    pub fn new(owner: impl Into<String>, pattern: impl Into<String>, access: Access) -> Self {
        Self {
            owner: owner.into(),
            pattern: pattern.into(),
            access,
        }
    }

    /// Global rule applying to every user
    pub fn global(pattern: impl Into<String>, access: Access) -> Self {
        Self::new(GLOBAL_OWNER, pattern, access)
    }

    /// Decode a raw `(owner, pattern, acc)` row
    pub fn from_row(index: usize, owner: String, pattern: String, acc: i64) -> Result<Self, RowError> {
        let access = Access::from_bits(acc)
            .ok_or_else(|| RowError::new("acls", index, format!("negative access bitmask {}", acc)))?;
        if !TopicMatcher::new().is_valid_filter(&pattern) {
            return Err(RowError::new(
                "acls",
                index,
                format!("invalid topic pattern {:?}", pattern),
            ));
        }
        Ok(Self::new(owner, pattern, access))
    }

    /// Whether this rule is a candidate for the given username
    pub fn applies_to(&self, username: &str) -> bool {
        self.owner == GLOBAL_OWNER || self.owner == username
    }
}

/// One row of an ACL read: a rule, or the reason it could not be decoded
pub type RuleRow = Result<AclRule, RowError>;

/// Requester identity
#[derive(Debug, Clone, Default)]
pub struct Requester {
    pub username: String,
    pub client_id: String,
    /// Source address, when the broker knows it
    pub address: Option<IpAddr>,
}

impl Requester {
    pub fn new(username: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            client_id: client_id.into(),
            address: None,
        }
    }

    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = Some(address);
        self
    }
}

/// Authorization request for a single topic operation
#[derive(Debug, Clone)]
pub struct AccessRequest<'a> {
    pub requester: &'a Requester,
    pub topic: &'a str,
    pub access: Access,
}

/// Allow or deny
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
}

/// Result of an authentication or authorization check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub verdict: Verdict,
    /// Reason for logging; never sent to the client
    pub reason: Option<String>,
}

impl Decision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Allow,
            reason: Some(reason.into()),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Deny,
            reason: Some(reason.into()),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.verdict == Verdict::Allow
    }

    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or("")
    }
}
