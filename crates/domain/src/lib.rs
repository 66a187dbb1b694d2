//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod permission;
mod role;
mod scope;
mod search;
mod user;

pub use permission::{Action, EffectivePermissions, Permission, PermissionRecord};
pub use role::{
    BASIC_ROLE_PREFIX, BasicRole, BasicRoleDefinition, FIXED_ROLE_PREFIX, FixedRoleDefinition,
    MANAGED_ROLE_PREFIX, NewRole, OrgMembership, Role, RoleId, RoleRegistration,
    UserRole, managed_user_role_name, managed_user_role_uid, prefixed_role_uid,
};
pub use scope::{Scope, covers};
pub use search::SearchOptions;
pub use user::{ACTION_USERS_PERMISSIONS_READ, SignedInUser, user_scope};
