use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use rolescope_core::{AppResult, OrgId, UserId};
use rolescope_domain::{
    ACTION_USERS_PERMISSIONS_READ, Action, BasicRole, EffectivePermissions, Permission,
    SearchOptions, SignedInUser, user_scope,
};

use crate::{ActionFilter, PermissionQuery};

use super::AccessControlService;

impl AccessControlService {
    /// Returns, per user of the organization, the permissions matching the
    /// search options.
    ///
    /// Only users the caller may read permissions of are returned; a caller
    /// without that right gets an empty map rather than an error. Within a
    /// user, permissions are sorted by action then scope. Users without any
    /// matching permission are left out.
    pub async fn search_users_permissions(
        &self,
        caller: &SignedInUser,
        org_id: OrgId,
        options: &SearchOptions,
    ) -> AppResult<BTreeMap<UserId, Vec<Permission>>> {
        options.validate()?;

        let read_action = Action::new(ACTION_USERS_PERMISSIONS_READ)?;
        let Some(caller_permissions) = caller
            .permissions_in(org_id)
            .filter(|permissions| permissions.scopes(&read_action).is_some())
        else {
            debug!(
                org_id = %org_id,
                caller = %caller.user_id(),
                "caller cannot read user permissions"
            );
            return Ok(BTreeMap::new());
        };
        let mut readable = ReadableUsers {
            caller_permissions,
            read_action: &read_action,
            decisions: HashMap::new(),
        };

        let query = PermissionQuery {
            action: ActionFilter::from_options(options),
            user_id: options.user_id,
        };
        let rows = self
            .store
            .query_permissions_by_org_and_action(org_id, &query)
            .await?;
        let memberships = self
            .store
            .list_org_memberships(org_id, options.user_id)
            .await?;

        let mut basic_matches: HashMap<BasicRole, Vec<Permission>> = HashMap::new();
        let mut results: BTreeMap<UserId, EffectivePermissions> = BTreeMap::new();

        for membership in memberships {
            if !readable.allows(membership.user_id)? {
                continue;
            }

            let matching = basic_matches
                .entry(membership.basic_role.clone())
                .or_insert_with(|| {
                    self.registry
                        .basic_role_permissions(&membership.basic_role)
                        .map(|permissions| {
                            permissions
                                .iter()
                                .filter(|permission| options.matches(permission))
                                .collect()
                        })
                        .unwrap_or_default()
                });
            if matching.is_empty() {
                continue;
            }

            results
                .entry(membership.user_id)
                .or_default()
                .extend(matching.iter().cloned());
        }

        let row_count = rows.len();
        for row in rows {
            if !options.matches(&row.permission) || !readable.allows(row.user_id)? {
                continue;
            }

            results.entry(row.user_id).or_default().insert(row.permission);
        }

        debug!(
            org_id = %org_id,
            caller = %caller.user_id(),
            rows = row_count,
            users = results.len(),
            "searched users permissions"
        );

        Ok(results
            .into_iter()
            .map(|(user_id, permissions)| (user_id, permissions.to_permissions()))
            .collect())
    }
}

struct ReadableUsers<'a> {
    caller_permissions: &'a EffectivePermissions,
    read_action: &'a Action,
    decisions: HashMap<UserId, bool>,
}

impl ReadableUsers<'_> {
    fn allows(&mut self, user_id: UserId) -> AppResult<bool> {
        if let Some(decision) = self.decisions.get(&user_id) {
            return Ok(*decision);
        }

        let decision = self
            .caller_permissions
            .allows(self.read_action, &user_scope(user_id)?);
        self.decisions.insert(user_id, decision);
        Ok(decision)
    }
}
