//! Shared key-value structures backing the asynchronous coupon path.
//!
//! Three narrow interfaces — an atomic counter, a dedup set and a
//! score-ordered queue — modeled after the string/SET/ZSET trio the issuance
//! flow keeps in a shared cache. They are an optimization layer: the durable
//! coupon ledger remains the source of truth, and every structure carries a
//! bounded TTL appropriate to its retention need.

mod memory;
mod store;

pub use memory::InMemoryCache;
pub use store::{AtomicCounter, DedupSet, RankedQueue};
