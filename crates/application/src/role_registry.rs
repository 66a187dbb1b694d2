use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use tracing::{debug, info};

use rolescope_core::{AppError, AppResult};
use rolescope_domain::{
    BasicRole, BasicRoleDefinition, EffectivePermissions, FIXED_ROLE_PREFIX, FixedRoleDefinition,
    NewRole, Permission, Role, RoleRegistration,
};

use crate::PermissionStore;

#[cfg(test)]
mod tests;

/// Collects fixed role declarations before they are committed.
///
/// Declarations are validated as they arrive; `commit` reconciles them with
/// the store and freezes them into a [`Registry`].
#[derive(Debug, Clone)]
pub struct RegistryBuilder {
    basic_roles: BTreeMap<BasicRole, Vec<BasicRole>>,
    registrations: BTreeMap<String, RoleRegistration>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    /// Creates a builder with the built-in viewer, editor and admin chain.
    #[must_use]
    pub fn new() -> Self {
        let basic_roles = BasicRoleDefinition::defaults()
            .into_iter()
            .map(|definition| (definition.role, definition.inherits))
            .collect();

        Self {
            basic_roles,
            registrations: BTreeMap::new(),
        }
    }

    /// Declares or redefines a basic role and the basic roles it inherits.
    ///
    /// Inherited roles must already be declared and the resulting graph must
    /// stay acyclic.
    pub fn declare_basic_role(&mut self, definition: BasicRoleDefinition) -> AppResult<()> {
        for inherited in &definition.inherits {
            if inherited != &definition.role && !self.basic_roles.contains_key(inherited) {
                return Err(AppError::Validation(format!(
                    "basic role '{}' inherits unknown basic role '{inherited}'",
                    definition.role
                )));
            }
        }

        let mut candidate = self.basic_roles.clone();
        candidate.insert(definition.role.clone(), definition.inherits);
        if let Some(role) = find_inheritance_cycle(&candidate) {
            return Err(AppError::Validation(format!(
                "basic role inheritance forms a cycle through '{role}'"
            )));
        }

        self.basic_roles = candidate;
        Ok(())
    }

    /// Accumulates fixed role registrations.
    ///
    /// The whole batch is rejected when one registration is invalid. Declaring
    /// the same uid again with identical content is a no-op; with different
    /// content it is a [`AppError::DuplicateRegistration`].
    pub fn declare(
        &mut self,
        registrations: impl IntoIterator<Item = RoleRegistration>,
    ) -> AppResult<()> {
        let mut accepted = self.registrations.clone();

        for mut registration in registrations {
            self.validate_registration(&registration)?;

            let uid = registration.role.resolved_uid();
            registration.role.uid = Some(uid.clone());

            if let Some(existing) = accepted.get(&uid) {
                if same_registration(existing, &registration) {
                    continue;
                }

                return Err(AppError::DuplicateRegistration(format!(
                    "fixed role '{uid}' is already declared with different content"
                )));
            }

            if let Some(existing) = accepted
                .values()
                .find(|existing| existing.role.name == registration.role.name)
            {
                return Err(AppError::DuplicateRegistration(format!(
                    "fixed role name '{}' is already declared with uid '{}'",
                    registration.role.name,
                    existing.role.resolved_uid()
                )));
            }

            accepted.insert(uid, registration);
        }

        self.registrations = accepted;
        Ok(())
    }

    /// Persists the declared fixed roles and grant edges, then freezes the
    /// registry.
    ///
    /// Running it again with the same declarations writes nothing new: roles
    /// whose stored permissions already match keep their version.
    pub async fn commit(self, store: &dyn PermissionStore) -> AppResult<Registry> {
        let mut fixed_roles = BTreeMap::new();

        for (uid, registration) in &self.registrations {
            let role = reconcile_fixed_role(store, uid, &registration.role).await?;
            store
                .save_basic_role_grants(role.id, &registration.grants)
                .await?;

            let mut grants = registration.grants.clone();
            grants.sort();
            grants.dedup();

            fixed_roles.insert(
                uid.clone(),
                CommittedFixedRole {
                    role,
                    permissions: registration.role.permission_set().into_iter().collect(),
                    grants,
                },
            );
        }

        let mut basic_roles = BTreeMap::new();
        for basic_role in self.basic_roles.keys() {
            let inherited = self.inheritance_closure(basic_role);
            let mut permissions = EffectivePermissions::new();
            for fixed_role in fixed_roles.values() {
                if fixed_role
                    .grants
                    .iter()
                    .any(|grant| inherited.contains(grant))
                {
                    permissions.extend(fixed_role.permissions.iter().cloned());
                }
            }
            basic_roles.insert(basic_role.clone(), permissions);
        }

        info!(
            fixed_roles = fixed_roles.len(),
            basic_roles = basic_roles.len(),
            "fixed roles registered"
        );

        Ok(Registry {
            basic_roles,
            fixed_roles,
        })
    }

    fn validate_registration(&self, registration: &RoleRegistration) -> AppResult<()> {
        let role = &registration.role;
        if !role.name.starts_with(FIXED_ROLE_PREFIX) {
            return Err(AppError::Validation(format!(
                "fixed role name '{}' must start with '{FIXED_ROLE_PREFIX}'",
                role.name
            )));
        }

        if role.name.len() == FIXED_ROLE_PREFIX.len() {
            return Err(AppError::Validation(
                "fixed role name must not be empty after its prefix".to_owned(),
            ));
        }

        if role.version == 0 {
            return Err(AppError::Validation(format!(
                "fixed role '{}' must have a version of at least 1",
                role.name
            )));
        }

        for grant in &registration.grants {
            if !self.basic_roles.contains_key(grant) {
                return Err(AppError::Validation(format!(
                    "fixed role '{}' is granted to unknown basic role '{grant}'",
                    role.name
                )));
            }
        }

        Ok(())
    }

    /// Returns the role itself plus every role it inherits, transitively.
    fn inheritance_closure(&self, role: &BasicRole) -> BTreeSet<BasicRole> {
        let mut visited = BTreeSet::new();
        let mut pending = vec![role.clone()];

        while let Some(current) = pending.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(parents) = self.basic_roles.get(&current) {
                pending.extend(parents.iter().cloned());
            }
        }

        visited
    }
}

/// Fixed role as stored after commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedFixedRole {
    /// Stored role row.
    pub role: Role,
    /// Declared permissions, sorted and duplicate-free.
    pub permissions: Vec<Permission>,
    /// Basic roles receiving the role, sorted.
    pub grants: Vec<BasicRole>,
}

/// Immutable snapshot of committed fixed roles and expanded basic roles.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    basic_roles: BTreeMap<BasicRole, EffectivePermissions>,
    fixed_roles: BTreeMap<String, CommittedFixedRole>,
}

impl Registry {
    /// Returns every permission a basic role receives through fixed role
    /// grants, including grants made to the roles it inherits.
    #[must_use]
    pub fn basic_role_permissions(&self, role: &BasicRole) -> Option<&EffectivePermissions> {
        self.basic_roles.get(role)
    }

    /// Returns a committed fixed role by uid.
    #[must_use]
    pub fn fixed_role(&self, uid: &str) -> Option<&CommittedFixedRole> {
        self.fixed_roles.get(uid)
    }
}

async fn reconcile_fixed_role(
    store: &dyn PermissionStore,
    uid: &str,
    definition: &FixedRoleDefinition,
) -> AppResult<Role> {
    let declared = definition.permission_set();
    let declared_permissions: Vec<Permission> = declared.iter().cloned().collect();

    let Some(mut role) = store.find_role_by_uid(uid).await? else {
        let role = store
            .create_role(NewRole {
                uid: uid.to_owned(),
                name: definition.name.clone(),
                version: definition.version,
            })
            .await?;
        store
            .replace_role_permissions(role.id, &declared_permissions)
            .await?;
        debug!(uid, version = role.version, "fixed role created");
        return Ok(role);
    };

    let stored: BTreeSet<Permission> = store
        .list_role_permissions(role.id)
        .await?
        .into_iter()
        .collect();
    if stored == declared {
        return Ok(role);
    }

    let version = role.version.saturating_add(1).max(definition.version);
    store
        .replace_role_permissions(role.id, &declared_permissions)
        .await?;
    store.update_role_version(role.id, version).await?;

    info!(
        uid,
        previous_version = role.version,
        version,
        "fixed role permissions changed"
    );
    role.version = version;
    role.updated = Utc::now();
    Ok(role)
}

fn same_registration(left: &RoleRegistration, right: &RoleRegistration) -> bool {
    let grants = |registration: &RoleRegistration| -> BTreeSet<BasicRole> {
        registration.grants.iter().cloned().collect()
    };

    left.role.name == right.role.name
        && left.role.version == right.role.version
        && left.role.permission_set() == right.role.permission_set()
        && grants(left) == grants(right)
}

fn find_inheritance_cycle(graph: &BTreeMap<BasicRole, Vec<BasicRole>>) -> Option<BasicRole> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        role: &BasicRole,
        graph: &BTreeMap<BasicRole, Vec<BasicRole>>,
        marks: &mut BTreeMap<BasicRole, Mark>,
    ) -> Option<BasicRole> {
        match marks.get(role) {
            Some(Mark::Visiting) => return Some(role.clone()),
            Some(Mark::Done) => return None,
            None => {}
        }

        marks.insert(role.clone(), Mark::Visiting);
        for parent in graph.get(role).into_iter().flatten() {
            if let Some(cycle) = visit(parent, graph, marks) {
                return Some(cycle);
            }
        }
        marks.insert(role.clone(), Mark::Done);
        None
    }

    let mut marks = BTreeMap::new();
    graph
        .keys()
        .find_map(|role| visit(role, graph, &mut marks))
}
