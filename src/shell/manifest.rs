//! Build-time asset manifest for the app shell.
//!
//! The lists are a build-time configuration surface, not a runtime protocol:
//! bump [`CACHE_VERSION`] when the shipped assets change and activation will
//! retire the previous generation.

/// Name of the current cache generation.
pub const CACHE_VERSION: &str = "app-shell-v1";

/// Assets the shell needs to boot without network. Install logs failures on
/// these but still proceeds.
pub const ESSENTIAL_ASSETS: &[&str] = &["/", "/index.html", "/manifest.json", "/styles.css"];

/// Nice-to-have assets; install failures on these are swallowed.
pub const OPTIONAL_ASSETS: &[&str] = &[
  "/favicon.png",
  "/icons/icon-72x72.png",
  "/icons/icon-96x96.png",
  "/icons/icon-128x128.png",
  "/icons/icon-144x144.png",
  "/icons/icon-152x152.png",
  "/icons/icon-192x192.png",
  "/icons/icon-384x384.png",
  "/icons/icon-512x512.png",
];

/// Entry served when a navigation falls back offline.
pub const SHELL_DOCUMENT: &str = "/index.html";
