mod queries;
mod store;

pub use queries::{ActionFilter, PermissionQuery, UserPermissionRow};
pub use store::PermissionStore;
