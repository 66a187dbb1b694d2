use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use rolescope_core::{AppError, AppResult, OrgId, UserId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Permission;

/// Name prefix of roles declared in code and granted to basic roles.
pub const FIXED_ROLE_PREFIX: &str = "fixed:";
/// Name prefix of the roles backing org membership levels.
pub const BASIC_ROLE_PREFIX: &str = "basic:";
/// Name prefix of per-user roles holding directly granted permissions.
pub const MANAGED_ROLE_PREFIX: &str = "managed:";

const UID_DIGEST_LENGTH: usize = 24;

/// Stored role identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleId(i64);

impl RoleId {
    /// Creates a role identifier from its stored value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the stored value.
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for RoleId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Stored role row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    /// Stored identifier.
    pub id: RoleId,
    /// Stable external identifier.
    pub uid: String,
    /// Unique role name.
    pub name: String,
    /// Monotonic version, bumped whenever the permission set changes.
    pub version: u32,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// Last update timestamp.
    pub updated: DateTime<Utc>,
}

/// Role row before the store assigns an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRole {
    /// Stable external identifier.
    pub uid: String,
    /// Unique role name.
    pub name: String,
    /// Initial version.
    pub version: u32,
}

/// Name of an org membership level such as `Viewer`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BasicRole(String);

impl BasicRole {
    /// Creates a validated basic role name.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation(
                "basic role name must not be empty".to_owned(),
            ));
        }

        if trimmed.contains(':') {
            return Err(AppError::Validation(format!(
                "basic role name '{trimmed}' must not contain ':'"
            )));
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Read-only org members.
    #[must_use]
    pub fn viewer() -> Self {
        Self("Viewer".to_owned())
    }

    /// Org members allowed to edit content.
    #[must_use]
    pub fn editor() -> Self {
        Self("Editor".to_owned())
    }

    /// Org administrators.
    #[must_use]
    pub fn admin() -> Self {
        Self("Admin".to_owned())
    }

    /// Returns the membership level name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the backing role name, e.g. `basic:viewer`.
    #[must_use]
    pub fn role_name(&self) -> String {
        format!("{BASIC_ROLE_PREFIX}{}", self.0.to_lowercase())
    }
}

impl Display for BasicRole {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

impl TryFrom<String> for BasicRole {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BasicRole> for String {
    fn from(value: BasicRole) -> Self {
        value.0
    }
}

/// A basic role and the basic roles whose grants it inherits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicRoleDefinition {
    /// Membership level.
    pub role: BasicRole,
    /// Directly inherited levels.
    pub inherits: Vec<BasicRole>,
}

impl BasicRoleDefinition {
    /// The built-in chain: admin inherits editor, editor inherits viewer.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self {
                role: BasicRole::viewer(),
                inherits: Vec::new(),
            },
            Self {
                role: BasicRole::editor(),
                inherits: vec![BasicRole::viewer()],
            },
            Self {
                role: BasicRole::admin(),
                inherits: vec![BasicRole::editor()],
            },
        ]
    }
}

/// Fixed role declared in code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedRoleDefinition {
    /// Stable identifier. Derived from the name when empty.
    pub uid: Option<String>,
    /// Role name, must start with `fixed:`.
    pub name: String,
    /// Declared version.
    pub version: u32,
    /// Permissions carried by the role.
    pub permissions: Vec<Permission>,
}

impl FixedRoleDefinition {
    /// Creates a version 1 definition.
    #[must_use]
    pub fn new(name: impl Into<String>, permissions: Vec<Permission>) -> Self {
        Self {
            uid: None,
            name: name.into(),
            version: 1,
            permissions,
        }
    }

    /// Returns the explicit uid or the one derived from the name.
    #[must_use]
    pub fn resolved_uid(&self) -> String {
        self.uid
            .as_deref()
            .map(str::trim)
            .filter(|uid| !uid.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| prefixed_role_uid(self.name.as_str()))
    }

    /// Returns the permissions as an ordered, duplicate-free set.
    #[must_use]
    pub fn permission_set(&self) -> BTreeSet<Permission> {
        self.permissions.iter().cloned().collect()
    }
}

/// A fixed role plus the basic roles that receive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRegistration {
    /// Declared role.
    pub role: FixedRoleDefinition,
    /// Basic roles granted this role.
    pub grants: Vec<BasicRole>,
}

/// Assignment of a role to a user inside one organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRole {
    /// Stored identifier.
    pub id: i64,
    /// Organization scope of the assignment.
    pub org_id: OrgId,
    /// Assigned role.
    pub role_id: RoleId,
    /// Assignee.
    pub user_id: UserId,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
}

/// Org membership row carrying the user's basic role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgMembership {
    /// Organization.
    pub org_id: OrgId,
    /// Member.
    pub user_id: UserId,
    /// Membership level.
    pub basic_role: BasicRole,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// Last update timestamp.
    pub updated: DateTime<Utc>,
}

/// Derives a stable uid from a role name: first name segment plus a digest.
#[must_use]
pub fn prefixed_role_uid(name: &str) -> String {
    let prefix = name.split(':').next().unwrap_or_default();
    let digest: String = Sha256::digest(name.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect();

    format!("{prefix}_{}", &digest[..UID_DIGEST_LENGTH])
}

/// Uid of the managed role holding a user's direct grants in an org.
#[must_use]
pub fn managed_user_role_uid(org_id: OrgId, user_id: UserId) -> String {
    format!("managed_{org_id}_users_{user_id}_permissions")
}

/// Name of the managed role holding a user's direct grants in an org.
#[must_use]
pub fn managed_user_role_name(org_id: OrgId, user_id: UserId) -> String {
    format!("{MANAGED_ROLE_PREFIX}{org_id}:users:{user_id}:permissions")
}

#[cfg(test)]
mod tests {
    use rolescope_core::{OrgId, UserId};

    use super::{BasicRole, FixedRoleDefinition, managed_user_role_name, prefixed_role_uid};

    #[test]
    fn derived_uid_is_stable_and_prefixed() {
        let first = prefixed_role_uid("fixed:test:role");
        let second = prefixed_role_uid("fixed:test:role");

        assert_eq!(first, second);
        assert!(first.starts_with("fixed_"));
        assert_eq!(first.len(), "fixed_".len() + 24);
        assert_ne!(first, prefixed_role_uid("fixed:test:other"));
    }

    #[test]
    fn explicit_uid_wins_over_derived_one() {
        let mut definition = FixedRoleDefinition::new("fixed:test:role", Vec::new());
        assert_eq!(definition.resolved_uid(), prefixed_role_uid("fixed:test:role"));

        definition.uid = Some("custom_uid".to_owned());
        assert_eq!(definition.resolved_uid(), "custom_uid");
    }

    #[test]
    fn basic_role_name_is_lowercased() {
        assert_eq!(BasicRole::admin().role_name(), "basic:admin");
        assert!(BasicRole::new("basic:viewer").is_err());
    }
}
