use std::time::Duration;

use reqwest::multipart::{Form, Part};
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::error::ApiError;
use crate::model::Story;

use super::types::{ApiEnvelope, ApiStoryListResponse, StoryUpload};

/// Client for the remote story service.
///
/// Reads carry a short timeout, uploads a longer one; both surface as
/// [`ApiError::Timeout`] when exceeded, and reqwest releases the connection
/// on expiry.
#[derive(Clone)]
pub struct StoryClient {
  http: reqwest::Client,
  base_url: Url,
  token: String,
  read_timeout: Duration,
  upload_timeout: Duration,
}

impl StoryClient {
  pub fn new(config: &Config, token: &str) -> Result<Self, ApiError> {
    let base_url = Url::parse(&config.api.url)
      .map_err(|e| ApiError::InvalidResponse(format!("invalid API base URL: {e}")))?;

    let http = reqwest::Client::builder()
      .build()
      .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))?;

    Ok(Self {
      http,
      base_url,
      token: token.to_string(),
      read_timeout: Duration::from_secs(config.timeouts.read_secs),
      upload_timeout: Duration::from_secs(config.timeouts.upload_secs),
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
    self
      .base_url
      .join(path)
      .map_err(|e| ApiError::InvalidResponse(format!("invalid endpoint {path}: {e}")))
  }

  /// Fetch the full story collection from the service.
  pub async fn fetch_stories(&self) -> Result<Vec<Story>, ApiError> {
    let url = self.endpoint("stories")?;
    debug!(%url, "fetching stories");

    let response = self
      .http
      .get(url)
      .bearer_auth(&self.token)
      .timeout(self.read_timeout)
      .send()
      .await?;

    let status = response.status();
    let body: ApiStoryListResponse = response
      .json()
      .await
      .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

    if !status.is_success() || body.error {
      let message = if body.message.is_empty() {
        format!("HTTP {status}")
      } else {
        body.message
      };
      return Err(ApiError::Rejected { message });
    }

    Ok(body.list_story.into_iter().map(|s| s.into_story()).collect())
  }

  /// Post a new story as a multipart upload.
  pub async fn post_story(&self, upload: StoryUpload<'_>) -> Result<(), ApiError> {
    let url = self.endpoint("stories")?;

    let mut form = Form::new()
      .text("description", upload.description.to_string())
      .part(
        "photo",
        Part::bytes(upload.photo.to_vec())
          .file_name("photo.jpg")
          .mime_str("image/jpeg")
          .map_err(|e| ApiError::InvalidResponse(e.to_string()))?,
      );
    if let Some(lat) = upload.lat {
      form = form.text("lat", lat.to_string());
    }
    if let Some(lon) = upload.lon {
      form = form.text("lon", lon.to_string());
    }

    let response = self
      .http
      .post(url)
      .bearer_auth(&self.token)
      .multipart(form)
      .timeout(self.upload_timeout)
      .send()
      .await?;

    let status = response.status();
    let body: ApiEnvelope = response
      .json()
      .await
      .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

    if !status.is_success() || body.error {
      let message = if body.message.is_empty() {
        format!("HTTP {status}")
      } else {
        body.message
      };
      warn!(%status, %message, "story upload rejected");
      return Err(ApiError::Rejected { message });
    }

    Ok(())
  }
}
