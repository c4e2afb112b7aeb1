//! Incremental sync engine.
//!
//! Each cycle, for every configured community:
//! - rebuild the set of already archived post ids from the storage file
//! - page through the newest posts, skipping known and too-recent ones
//! - collect comments for the rest and append them to the storage file
//! - flush the request audit log

mod comments;
mod engine;
#[cfg(test)]
pub(crate) mod fake;
mod scheduler;
mod seen;
mod store;

pub use engine::SyncEngine;
pub use scheduler::Scheduler;
