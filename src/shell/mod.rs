//! The app-shell cache layer: serves static application assets and
//! previously-seen responses when the network is unavailable, and
//! transparently refreshes its cache when online.
//!
//! Runs against its own database handle, independent from the story store;
//! the application and this layer share nothing but the request/response
//! boundary and the durable cache.

pub mod cache;
pub mod interceptor;
pub mod manifest;
pub mod notify;

pub use cache::{AssetCache, CachedResponse};
pub use interceptor::{FetchOutcome, ShellInterceptor, ShellRequest};
