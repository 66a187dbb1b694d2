//! Application services and ports.

#![forbid(unsafe_code)]

mod access_control_service;
mod bulk_loader;
mod permission_ports;
mod role_registry;

#[cfg(test)]
mod test_support;

pub use access_control_service::AccessControlService;
pub use bulk_loader::{BatchOptions, ChunkBounds, FailurePolicy, chunk_bounds, run_batches};
pub use permission_ports::{ActionFilter, PermissionQuery, PermissionStore, UserPermissionRow};
pub use role_registry::{CommittedFixedRole, Registry, RegistryBuilder};
