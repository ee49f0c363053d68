//! Offline-first client core for a geotagged short-story service.
//!
//! Stories fetched from the service are cached in a local database, stories
//! authored while offline are queued and reconciled by the sync engine, and
//! the shell layer keeps the static application surface usable with no
//! network.

pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod shell;
pub mod store;
pub mod sync;
