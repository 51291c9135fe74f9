//! Reference implementations of the transport and lock store boundaries.
//!
//! These keep all state in process memory. They are intended for tests,
//! local development, and single-process deployments.

pub mod memory_lock;
pub mod memory_source;

pub use memory_lock::InMemoryLockStore;
pub use memory_source::InMemoryMessageSource;
