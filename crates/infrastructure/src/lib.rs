//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_permission_store;
mod postgres_permission_store;

pub use in_memory_permission_store::InMemoryPermissionStore;
pub use postgres_permission_store::{PostgresPermissionStore, run_migrations};
