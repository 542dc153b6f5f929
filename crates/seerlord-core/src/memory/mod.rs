//! Tenant-scoped experience memory

mod store;

pub use store::{MemoryHit, MemoryStore};
