//! Wire types for the story service API.

use serde::Deserialize;

use crate::model::Story;

/// Response envelope for `GET /stories`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStoryListResponse {
  #[serde(default)]
  pub error: bool,
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub list_story: Vec<ApiStory>,
}

/// A story as the service serializes it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStory {
  pub id: String,
  pub name: String,
  pub description: String,
  #[serde(default)]
  pub photo_url: Option<String>,
  #[serde(default)]
  pub lat: Option<f64>,
  #[serde(default)]
  pub lon: Option<f64>,
  pub created_at: String,
}

impl ApiStory {
  /// Convert into the cached domain record, normalizing the photo URL and
  /// computing the derived fields.
  pub fn into_story(self) -> Story {
    Story::from_remote(
      self.id,
      self.name,
      self.description,
      self.photo_url,
      self.lat,
      self.lon,
      self.created_at,
    )
  }
}

/// Generic `{error, message}` envelope used by write endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
  #[serde(default)]
  pub error: bool,
  #[serde(default)]
  pub message: String,
}

/// Borrowed view of a story payload for upload.
#[derive(Debug, Clone, Copy)]
pub struct StoryUpload<'a> {
  pub description: &'a str,
  pub photo: &'a [u8],
  pub lat: Option<f64>,
  pub lon: Option<f64>,
}
