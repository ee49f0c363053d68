use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storymap::api::{StoryClient, StoryUpload};
use storymap::config::{ApiConfig, Config, RetryConfig, ShellConfig, TimeoutConfig};
use storymap::error::ApiError;
use storymap::model::PHOTO_PLACEHOLDER;

fn test_config(base_url: &str) -> Config {
  Config {
    api: ApiConfig {
      url: format!("{base_url}/"),
    },
    data_dir: None,
    timeouts: TimeoutConfig {
      read_secs: 1,
      upload_secs: 1,
    },
    retry: RetryConfig::default(),
    shell: ShellConfig::default(),
  }
}

fn client(base_url: &str) -> StoryClient {
  StoryClient::new(&test_config(base_url), "test-token").unwrap()
}

#[tokio::test]
async fn fetch_stories_parses_and_normalizes() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/stories"))
    .and(header("authorization", "Bearer test-token"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "error": false,
      "message": "Stories fetched successfully",
      "listStory": [
        {
          "id": "story-1",
          "name": "Alice",
          "description": "Morning walk",
          "photoUrl": "https://cdn.example.com/1.jpg",
          "lat": -6.2,
          "lon": 106.8,
          "createdAt": "2024-05-01T10:00:00Z"
        },
        {
          "id": "story-2",
          "name": "Bob",
          "description": "No photo, no place",
          "createdAt": "2024-05-02T10:00:00Z"
        }
      ]
    })))
    .mount(&server)
    .await;

  let stories = client(&server.uri()).fetch_stories().await.unwrap();

  assert_eq!(stories.len(), 2);
  assert_eq!(stories[0].id, "story-1");
  assert!(stories[0].has_location);
  assert_eq!(stories[0].photo_url, "https://cdn.example.com/1.jpg");
  assert!(!stories[1].has_location);
  assert_eq!(stories[1].photo_url, PHOTO_PLACEHOLDER);
  assert!(!stories[1].cached_at.is_empty());
}

#[tokio::test]
async fn fetch_stories_surfaces_service_rejection() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/stories"))
    .respond_with(
      ResponseTemplate::new(401).set_body_json(json!({"error": true, "message": "Missing authentication"})),
    )
    .mount(&server)
    .await;

  let err = client(&server.uri()).fetch_stories().await.unwrap_err();
  match err {
    ApiError::Rejected { message } => assert_eq!(message, "Missing authentication"),
    other => panic!("expected Rejected, got {other:?}"),
  }
}

#[tokio::test]
async fn fetch_stories_times_out_distinctly() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/stories"))
    .respond_with(
      ResponseTemplate::new(200)
        .set_body_json(json!({"error": false, "listStory": []}))
        .set_delay(Duration::from_secs(10)),
    )
    .mount(&server)
    .await;

  let err = client(&server.uri()).fetch_stories().await.unwrap_err();
  assert!(matches!(err, ApiError::Timeout));
}

#[tokio::test]
async fn post_story_uploads_multipart() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/stories"))
    .and(header("authorization", "Bearer test-token"))
    .respond_with(
      ResponseTemplate::new(201).set_body_json(json!({"error": false, "message": "created"})),
    )
    .expect(1)
    .mount(&server)
    .await;

  let upload = StoryUpload {
    description: "A trip",
    photo: &[0xff, 0xd8, 0xff],
    lat: Some(-6.2),
    lon: Some(106.8),
  };
  client(&server.uri()).post_story(upload).await.unwrap();
  server.verify().await;
}

#[tokio::test]
async fn post_story_surfaces_error_envelope() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/stories"))
    .respond_with(
      ResponseTemplate::new(413).set_body_json(json!({"error": true, "message": "Payload too large"})),
    )
    .mount(&server)
    .await;

  let upload = StoryUpload {
    description: "Huge",
    photo: &[0u8; 16],
    lat: None,
    lon: None,
  };
  let err = client(&server.uri()).post_story(upload).await.unwrap_err();
  match err {
    ApiError::Rejected { message } => assert_eq!(message, "Payload too large"),
    other => panic!("expected Rejected, got {other:?}"),
  }
}

#[tokio::test]
async fn network_failure_is_not_a_timeout() {
  // A port nothing listens on: connection refused, not a timeout.
  let err = client("http://127.0.0.1:9")
    .fetch_stories()
    .await
    .unwrap_err();
  assert!(matches!(err, ApiError::Network(_)));
}
