//! Push-notification template and click routing.

use url::Url;

/// Fixed-template notification shown on push receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
}

/// The notification displayed for an incoming story push.
pub fn story_notification() -> Notification {
  Notification {
    title: "Stories nearby".into(),
    body: "A new story was shared near you!".into(),
    icon: "/icons/icon-192x192.png".into(),
    badge: "/icons/icon-72x72.png".into(),
  }
}

/// What to do when the user activates a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
  /// Focus the already-open client at this index.
  Focus(usize),
  /// No same-origin client is open; open a new one at the application root.
  OpenWindow(Url),
}

/// Focus the first open same-origin client, else open the application root.
pub fn resolve_notification_click(app_origin: &Url, open_clients: &[Url]) -> ClickAction {
  for (index, client) in open_clients.iter().enumerate() {
    if client.origin() == app_origin.origin() {
      return ClickAction::Focus(index);
    }
  }
  ClickAction::OpenWindow(app_origin.clone())
}
