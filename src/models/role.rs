//! Role model used by the access-control layer

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Closed set of roles a user account can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Librarian,
    Patron,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Librarian => "LIBRARIAN",
            Role::Patron => "PATRON",
        }
    }

    /// Authority string checked by the access-control layer
    pub fn authority(&self) -> &'static str {
        match self {
            Role::Admin => "ROLE_ADMIN",
            Role::Librarian => "ROLE_LIBRARIAN",
            Role::Patron => "ROLE_PATRON",
        }
    }

    /// Staff roles may act on behalf of other users
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Librarian)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        match upper.strip_prefix("ROLE_").unwrap_or(&upper) {
            "ADMIN" => Ok(Role::Admin),
            "LIBRARIAN" => Ok(Role::Librarian),
            "PATRON" => Ok(Role::Patron),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

/// Role set assigned to accounts created without an explicit one
pub fn default_roles() -> BTreeSet<Role> {
    BTreeSet::from([Role::Patron])
}

/// True when any role in the set is ADMIN or LIBRARIAN
pub fn holds_staff_role(roles: &BTreeSet<Role>) -> bool {
    roles.iter().any(Role::is_staff)
}

/// Parse stored role names, skipping anything unknown
pub fn parse_roles<I, S>(names: I) -> BTreeSet<Role>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|name| name.as_ref().parse().ok())
        .collect()
}

/// Role names in the form stored in the `roles` column
pub fn role_names(roles: &BTreeSet<Role>) -> Vec<String> {
    roles.iter().map(|r| r.as_str().to_string()).collect()
}
