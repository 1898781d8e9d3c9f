mod cache;
mod hierarchy;

pub use cache::DekCache;
pub use hierarchy::{KeyHierarchy, TenantDek, TenantGuard};
