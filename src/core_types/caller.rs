//! Caller identity passed explicitly through the request pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a caller inside its tenant. Assignments and request limits are
/// configured per (purpose, role).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Basic,
    Extended,
    Unlimited,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Basic => "basic",
            Role::Extended => "extended",
            Role::Unlimited => "unlimited",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is asking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: i64,
    pub tenant: String,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: i64, tenant: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            tenant: tenant.into(),
            role,
        }
    }
}
