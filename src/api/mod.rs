//! Client for the remote story service.

pub mod client;
pub mod types;

pub use client::StoryClient;
pub use types::StoryUpload;
