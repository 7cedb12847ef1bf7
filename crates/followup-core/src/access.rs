use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Staff => "staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "staff" => Ok(Self::Staff),
            other => Err(anyhow!("unknown role: {other}")),
        }
    }
}

/// Answers whether the current operator holds a role. Only the presentation
/// layer asks; the scheduling engine itself never checks access.
///
/// The gate is advisory: roles come from local config or `--role`, so it keeps
/// honest operators out of commands they were not given and nothing more.
pub trait RoleCheck {
    fn has_role(&self, role: Role) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct StaticRoles {
    roles: BTreeSet<Role>,
}

impl StaticRoles {
    pub fn new<I>(roles: I) -> Self
    where
        I: IntoIterator<Item = Role>,
    {
        Self {
            roles: roles.into_iter().collect(),
        }
    }
}

impl RoleCheck for StaticRoles {
    fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

pub fn require_role(check: &dyn RoleCheck, role: Role) -> anyhow::Result<()> {
    if check.has_role(role) {
        debug!(%role, "access granted");
        Ok(())
    } else {
        warn!(%role, "access denied");
        Err(anyhow!("this command requires the `{role}` role"))
    }
}
