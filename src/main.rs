use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use tracing_subscriber::EnvFilter;
use url::Url;

use storymap::api::{StoryClient, StoryUpload};
use storymap::config::Config;
use storymap::error::ApiError;
use storymap::model::OfflineStoryDraft;
use storymap::query::{self, FilterCriteria};
use storymap::shell::cache::AssetCache;
use storymap::shell::interceptor::{network_fetch, ShellInterceptor};
use storymap::store::Store;
use storymap::sync::{RetryPolicy, SyncEngine};

#[derive(Parser, Debug)]
#[command(name = "storymap")]
#[command(about = "Browse, post, and favorite geotagged short stories, offline included")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/storymap/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch stories from the service and refresh the local cache
  Refresh,
  /// List cached stories, newest first
  List {
    /// Only stories carrying coordinates
    #[arg(long)]
    with_location: bool,
    /// Only favorited stories
    #[arg(long)]
    favorites: bool,
  },
  /// Search cached stories by name or description
  Search { query: String },
  /// Post a story; queued locally when the service is unreachable
  Post {
    description: String,
    /// Path to the photo file
    photo: PathBuf,
    #[arg(long)]
    lat: Option<f64>,
    #[arg(long)]
    lon: Option<f64>,
  },
  /// Push queued offline stories to the service
  Sync,
  /// Manage the offline story queue
  Offline {
    #[command(subcommand)]
    action: OfflineAction,
  },
  /// Manage favorites
  Favorite {
    #[command(subcommand)]
    action: FavoriteAction,
  },
  /// Export favorites as a JSON document
  Export {
    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Show collection counters
  Stats,
  /// Wipe the local database: cached stories, offline queue, favorites
  Clear,
  /// Pre-populate the app-shell cache and retire stale generations
  ShellInstall,
}

#[derive(Subcommand, Debug)]
enum OfflineAction {
  /// List queued stories and their sync state
  List,
  /// Delete a queued story
  Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
enum FavoriteAction {
  /// Bookmark a cached story
  Add { story_id: String },
  /// Remove a bookmark
  Remove { story_id: String },
  /// List bookmarks
  List,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let data_dir = config.resolve_data_dir()?;
  let _log_guard = init_tracing(&data_dir);

  // Composition root: one store per process, passed by handle to every
  // collaborator.
  let store = Arc::new(Store::at_path(data_dir.join("stories.db")));

  match args.command {
    Command::Refresh => refresh(&config, &store).await,
    Command::List {
      with_location,
      favorites,
    } => list(&store, with_location, favorites).await,
    Command::Search { query } => search(&store, &query).await,
    Command::Post {
      description,
      photo,
      lat,
      lon,
    } => post(&config, &store, description, &photo, lat, lon).await,
    Command::Sync => sync(&config, &store).await,
    Command::Offline { action } => offline(&store, action).await,
    Command::Favorite { action } => favorite(&store, action).await,
    Command::Export { output } => export(&store, output.as_deref()).await,
    Command::Stats => stats(&store).await,
    Command::Clear => clear(&store).await,
    Command::ShellInstall => shell_install(&config, &data_dir).await,
  }
}

fn init_tracing(data_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
  let appender = tracing_appender::rolling::daily(data_dir.join("logs"), "storymap.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(writer)
    .with_ansi(false)
    .init();
  guard
}

fn client(config: &Config) -> Result<StoryClient> {
  let token = Config::get_api_token()?;
  Ok(StoryClient::new(config, &token)?)
}

async fn refresh(config: &Config, store: &Arc<Store>) -> Result<()> {
  match client(config)?.fetch_stories().await {
    Ok(stories) => {
      store.replace_all_stories(&stories).await?;
      println!("Cached {} stories.", stories.len());
    }
    Err(err) => {
      // Read failures degrade to cached data.
      let cached = store.get_stories().await.unwrap_or_default();
      println!(
        "Service unreachable ({err}); keeping {} cached stories.",
        cached.len()
      );
    }
  }
  Ok(())
}

async fn list(store: &Arc<Store>, with_location: bool, favorites: bool) -> Result<()> {
  let criteria = FilterCriteria {
    has_location: with_location,
    date_range: None,
    favorites_only: favorites,
  };
  let stories = query::filter(store, &criteria).await?;
  let stories = query::sort_stories(
    stories,
    query::SortSpec {
      field: query::SortField::CreatedAt,
      direction: query::SortDirection::Descending,
    },
    None,
  );
  if stories.is_empty() {
    println!("No cached stories. Run `storymap refresh` first.");
    return Ok(());
  }
  for story in stories {
    print_story_line(&story.id, &story.name, &story.description, &story.created_at);
  }
  Ok(())
}

async fn search(store: &Arc<Store>, query_text: &str) -> Result<()> {
  let results = query::search(store, query_text).await?;
  if results.is_empty() {
    println!("No stories match \"{query_text}\".");
    return Ok(());
  }
  for story in results {
    print_story_line(&story.id, &story.name, &story.description, &story.created_at);
  }
  Ok(())
}

async fn post(
  config: &Config,
  store: &Arc<Store>,
  description: String,
  photo_path: &Path,
  lat: Option<f64>,
  lon: Option<f64>,
) -> Result<()> {
  let photo = tokio::fs::read(photo_path)
    .await
    .map_err(|e| eyre!("Failed to read photo {}: {}", photo_path.display(), e))?;
  let draft = OfflineStoryDraft::new(description, photo, lat, lon)?;

  let upload = StoryUpload {
    description: &draft.description,
    photo: &draft.photo,
    lat: draft.lat,
    lon: draft.lon,
  };
  match client(config)?.post_story(upload).await {
    Ok(()) => {
      println!("Story posted.");
      Ok(())
    }
    Err(ApiError::Timeout) | Err(ApiError::Network(_)) => {
      let id = store.save_offline_story(&draft).await?;
      println!("Service unreachable; story queued offline with id {id}. Run `storymap sync` later.");
      Ok(())
    }
    Err(err) => Err(err.into()),
  }
}

async fn sync(config: &Config, store: &Arc<Store>) -> Result<()> {
  let engine = SyncEngine::new(
    Arc::clone(store),
    client(config)?,
    RetryPolicy::from(config.retry),
  );
  let report = engine.sync_all().await;

  if report.successful.is_empty() && report.failed.is_empty() {
    println!("Nothing to sync.");
    return Ok(());
  }
  for id in &report.successful {
    println!("Synced story {id}.");
  }
  for failure in &report.failed {
    println!("Story {} failed: {}.", failure.id, failure.reason);
  }
  Ok(())
}

async fn offline(store: &Arc<Store>, action: OfflineAction) -> Result<()> {
  match action {
    OfflineAction::List => {
      let queued = store.get_offline_stories().await?;
      if queued.is_empty() {
        println!("Offline queue is empty.");
      }
      for story in queued {
        let state = if story.is_pending() { "pending" } else { "synced" };
        println!("{}  {}  [{}] {}", story.created_at, story.id, state, story.description);
      }
    }
    OfflineAction::Delete { id } => {
      store.delete_offline_story(id).await?;
      println!("Deleted queued story {id}.");
    }
  }
  Ok(())
}

async fn clear(store: &Arc<Store>) -> Result<()> {
  store.clear_all().await?;
  println!("Local database cleared.");
  Ok(())
}

async fn favorite(store: &Arc<Store>, action: FavoriteAction) -> Result<()> {
  match action {
    FavoriteAction::Add { story_id } => {
      let story = store
        .get_story(&story_id)
        .await?
        .ok_or_else(|| eyre!("Story {story_id} is not in the local cache; run refresh first."))?;
      store.add_favorite(&story).await?;
      println!("Favorited \"{}\".", story.name);
    }
    FavoriteAction::Remove { story_id } => {
      store.remove_favorite(&story_id).await?;
      println!("Removed favorite {story_id}.");
    }
    FavoriteAction::List => {
      let favorites = store.get_favorites().await?;
      if favorites.is_empty() {
        println!("No favorites yet.");
      }
      for fav in favorites {
        print_story_line(&fav.story_id, &fav.name, &fav.description, &fav.added_at);
      }
    }
  }
  Ok(())
}

async fn export(store: &Arc<Store>, output: Option<&Path>) -> Result<()> {
  let document = query::export_favorites(store).await?;
  let json = serde_json::to_string_pretty(&document)?;
  match output {
    Some(path) => {
      tokio::fs::write(path, &json)
        .await
        .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
      println!("Exported {} favorites to {}.", document.total_favorites, path.display());
    }
    None => println!("{json}"),
  }
  Ok(())
}

async fn stats(store: &Arc<Store>) -> Result<()> {
  let stats = query::stats(store).await?;
  println!("Cached stories:      {}", stats.total_stories);
  println!("  with location:     {}", stats.stories_with_location);
  println!("Offline stories:     {}", stats.offline_stories);
  println!("  awaiting sync:     {}", stats.unsynced_stories);
  println!("Favorites:           {}", stats.favorites);
  Ok(())
}

async fn shell_install(config: &Config, data_dir: &Path) -> Result<()> {
  let origin = config
    .shell
    .origin
    .as_deref()
    .ok_or_else(|| eyre!("shell.origin is not configured"))?;
  let origin = Url::parse(origin).map_err(|e| eyre!("Invalid shell origin: {e}"))?;
  let api_origin = Url::parse(&config.api.url).map_err(|e| eyre!("Invalid API URL: {e}"))?;

  let cache = AssetCache::open(&data_dir.join("shell-cache.db"))?;
  let mut interceptor = ShellInterceptor::new(cache, origin, api_origin);

  let http = reqwest::Client::new();
  interceptor
    .install(|url| {
      let http = http.clone();
      let url = url.clone();
      async move { network_fetch(&http, &url).await }
    })
    .await?;
  interceptor.activate()?;

  println!("App shell cache installed.");
  Ok(())
}

fn print_story_line(id: &str, name: &str, description: &str, timestamp: &str) {
  let first_line = description.lines().next().unwrap_or_default();
  println!("{timestamp}  {id}  {name}: {first_line}");
}
