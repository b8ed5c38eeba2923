//! Distributed mutual-exclusion primitive.
//!
//! A [`LockManager`] wraps a [`LockClient`] backend and exposes two
//! higher-order functions: [`LockManager::with_lock`] for a single key and
//! [`LockManager::with_multi_lock`] for a set of keys. Multi-key acquisition
//! sorts the keys first so every caller acquires overlapping sets in the same
//! global order, which is the sole deadlock-avoidance mechanism.
//!
//! Locks carry a lease: the hold auto-expires even if the holder crashes.
//! The lease is crash recovery only — it must exceed the expected
//! critical-section duration with margin.

mod client;
mod error;
mod manager;

pub use client::{InMemoryLockClient, LockClient, LockToken};
pub use error::LockError;
pub use manager::{LockConfig, LockManager};
