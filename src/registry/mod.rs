//! Shared tables behind the bus.
//!
//! - [`SubscriptionRegistry`]: event name → registered receivers, plus the
//!   catch-all bucket
//! - [`StickyStore`]: event name → last sticky payload
//!
//! Both are mutated from arbitrary caller threads and read by the dispatch
//! thread. Each is consistent on its own; they are not updated atomically
//! together.

mod buckets;
mod sticky;

pub use buckets::SubscriptionRegistry;
pub use sticky::StickyStore;
