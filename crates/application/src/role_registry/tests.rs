use rolescope_core::AppError;
use rolescope_domain::{
    Action, BasicRole, BasicRoleDefinition, FixedRoleDefinition, Permission, RoleRegistration,
    Scope,
};

use crate::test_support::FakePermissionStore;

use super::RegistryBuilder;

fn permission(action: &str, scope: &str) -> Permission {
    match Permission::parse(action, scope) {
        Ok(permission) => permission,
        Err(error) => panic!("invalid permission {action} {scope}: {error}"),
    }
}

fn registration(name: &str, permissions: Vec<Permission>, grants: Vec<BasicRole>) -> RoleRegistration {
    RoleRegistration {
        role: FixedRoleDefinition::new(name, permissions),
        grants,
    }
}

fn reader_registration() -> RoleRegistration {
    registration(
        "fixed:resources:reader",
        vec![permission("resources:action1", "")],
        vec![BasicRole::viewer()],
    )
}

#[test]
fn identical_redeclaration_is_a_no_op() {
    let mut builder = RegistryBuilder::new();
    assert!(builder.declare([reader_registration()]).is_ok());
    assert!(builder.declare([reader_registration()]).is_ok());
    assert_eq!(builder.registrations.len(), 1);
}

#[test]
fn conflicting_redeclaration_is_rejected() {
    let mut builder = RegistryBuilder::new();
    assert!(builder.declare([reader_registration()]).is_ok());

    let changed = registration(
        "fixed:resources:reader",
        vec![permission("resources:action2", "")],
        vec![BasicRole::viewer()],
    );
    let result = builder.declare([changed]);
    assert!(matches!(result, Err(AppError::DuplicateRegistration(_))));
}

#[test]
fn same_name_under_another_uid_is_rejected() {
    let mut builder = RegistryBuilder::new();
    assert!(builder.declare([reader_registration()]).is_ok());

    let mut renamed = reader_registration();
    renamed.role.uid = Some("explicit_reader".to_owned());
    let result = builder.declare([renamed]);
    assert!(matches!(result, Err(AppError::DuplicateRegistration(_))));
}

#[test]
fn invalid_batch_is_rejected_as_a_whole() {
    let mut builder = RegistryBuilder::new();
    let unknown_grant = registration(
        "fixed:resources:writer",
        vec![permission("resources:write", "")],
        vec![BasicRole::new("Auditor").unwrap_or_else(|_| BasicRole::viewer())],
    );

    let result = builder.declare([reader_registration(), unknown_grant]);
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(builder.registrations.is_empty());
}

#[test]
fn names_must_carry_the_fixed_prefix() {
    let mut builder = RegistryBuilder::new();
    let custom = registration("custom:reader", Vec::new(), Vec::new());
    assert!(matches!(
        builder.declare([custom]),
        Err(AppError::Validation(_))
    ));

    let bare = registration("fixed:", Vec::new(), Vec::new());
    assert!(matches!(builder.declare([bare]), Err(AppError::Validation(_))));
}

#[test]
fn basic_role_cycles_are_rejected() {
    let mut builder = RegistryBuilder::new();
    let result = builder.declare_basic_role(BasicRoleDefinition {
        role: BasicRole::viewer(),
        inherits: vec![BasicRole::admin()],
    });

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[test]
fn basic_role_must_inherit_known_roles() {
    let mut builder = RegistryBuilder::new();
    let Ok(auditor) = BasicRole::new("Auditor") else {
        panic!("invalid basic role");
    };
    let Ok(guest) = BasicRole::new("Guest") else {
        panic!("invalid basic role");
    };

    let unknown = builder.declare_basic_role(BasicRoleDefinition {
        role: auditor.clone(),
        inherits: vec![guest],
    });
    assert!(matches!(unknown, Err(AppError::Validation(_))));

    let known = builder.declare_basic_role(BasicRoleDefinition {
        role: auditor,
        inherits: vec![BasicRole::viewer()],
    });
    assert!(known.is_ok());
}

#[tokio::test]
async fn commit_expands_grants_through_inheritance() {
    let store = FakePermissionStore::default();
    let mut builder = RegistryBuilder::new();
    let editor_only = registration(
        "fixed:resources:editor",
        vec![permission("resources:write", "resources:*")],
        vec![BasicRole::editor()],
    );
    assert!(builder.declare([reader_registration(), editor_only]).is_ok());

    let registry = match builder.commit(&store).await {
        Ok(registry) => registry,
        Err(error) => panic!("commit failed: {error}"),
    };

    let Ok(read) = Action::new("resources:action1") else {
        panic!("invalid action");
    };
    let Ok(write) = Action::new("resources:write") else {
        panic!("invalid action");
    };
    let Ok(target) = Scope::new("resources:id:7") else {
        panic!("invalid scope");
    };

    let viewer = registry
        .basic_role_permissions(&BasicRole::viewer())
        .cloned()
        .unwrap_or_default();
    assert!(viewer.allows(&read, &target));
    assert!(!viewer.allows(&write, &target));

    let admin = registry
        .basic_role_permissions(&BasicRole::admin())
        .cloned()
        .unwrap_or_default();
    assert!(admin.allows(&read, &target));
    assert!(admin.allows(&write, &target));

    let uid = reader_registration().role.resolved_uid();
    let Some(committed) = registry.fixed_role(uid.as_str()) else {
        panic!("reader role was not committed");
    };
    assert_eq!(store.grants_of(committed.role.id).await, vec![BasicRole::viewer()]);
}

#[tokio::test]
async fn commit_twice_writes_nothing_new() {
    let store = FakePermissionStore::default();
    let declare = || {
        let mut builder = RegistryBuilder::new();
        assert!(builder.declare([reader_registration()]).is_ok());
        builder
    };

    let first = declare().commit(&store).await;
    assert!(first.is_ok());
    let writes = store.permission_writes();
    let rows = store.permission_rows().await;

    let second = match declare().commit(&store).await {
        Ok(registry) => registry,
        Err(error) => panic!("second commit failed: {error}"),
    };

    assert_eq!(store.permission_writes(), writes);
    assert_eq!(store.permission_rows().await, rows);
    let uid = reader_registration().role.resolved_uid();
    assert_eq!(
        second.fixed_role(uid.as_str()).map(|role| role.role.version),
        Some(1)
    );
}

#[tokio::test]
async fn changed_permissions_bump_the_version() {
    let store = FakePermissionStore::default();
    let mut first = RegistryBuilder::new();
    assert!(first.declare([reader_registration()]).is_ok());
    assert!(first.commit(&store).await.is_ok());

    let mut second = RegistryBuilder::new();
    let widened = registration(
        "fixed:resources:reader",
        vec![
            permission("resources:action1", ""),
            permission("resources:action3", "resources:*"),
        ],
        vec![BasicRole::viewer()],
    );
    assert!(second.declare([widened]).is_ok());
    let registry = match second.commit(&store).await {
        Ok(registry) => registry,
        Err(error) => panic!("commit failed: {error}"),
    };

    let uid = reader_registration().role.resolved_uid();
    let Some(committed) = registry.fixed_role(uid.as_str()) else {
        panic!("reader role was not committed");
    };
    assert_eq!(committed.role.version, 2);
    assert_eq!(committed.permissions.len(), 2);
    assert_eq!(store.permission_rows().await, 2);
}

#[tokio::test]
async fn commit_surfaces_store_failures() {
    let store = FakePermissionStore::default();
    store.fail_reads();
    let mut builder = RegistryBuilder::new();
    assert!(builder.declare([reader_registration()]).is_ok());

    let result = builder.commit(&store).await;
    assert!(matches!(result, Err(AppError::Store(_))));
}
