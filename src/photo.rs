use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::BotToken;

/// Upper bound on cached users; the least fresh entry is evicted beyond it.
pub const DEFAULT_PHOTO_CACHE_CAPACITY: usize = 10_000;

#[derive(Error, Debug)]
pub enum PhotoLookupError {
    #[error("Bot API request failed: {0}")] Network(String),
    #[error("Bot API returned status {0}")] Status(u16),
    #[error("Bot API response could not be decoded: {0}")] Decode(String),
}

/// Downloaded photo bytes with the upstream content type, if any.
#[derive(Debug, Clone)]
pub struct PhotoFile {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Where profile photos come from.
#[async_trait::async_trait]
pub trait PhotoSource: Send + Sync {
    /// File path of the user's largest current profile photo, `None` if they have none.
    async fn largest_photo_path(&self, user_id: &str) -> Result<Option<String>, PhotoLookupError>;

    async fn download(&self, file_path: &str) -> Result<PhotoFile, PhotoLookupError>;
}

#[derive(Debug, Deserialize)]
struct BotApiResponse<T> {
    ok: bool,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct UserProfilePhotos {
    total_count: u64,
    photos: Vec<Vec<PhotoSize>>,
}

#[derive(Debug, Deserialize)]
struct PhotoSize {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct BotFile {
    file_path: Option<String>,
}

/// [`PhotoSource`] backed by the Bot API (`getUserProfilePhotos` + `getFile`).
pub struct TelegramPhotoSource {
    client: Client,
    api_base: String,
    token: BotToken,
}

impl TelegramPhotoSource {
    pub fn new(client: Client, api_base: impl Into<String>, token: BotToken) -> Self {
        Self { client, api_base: api_base.into(), token }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token.expose(), method)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<BotApiResponse<T>, PhotoLookupError> {
        let resp = self
            .client
            .get(self.method_url(method))
            .query(query)
            .send()
            .await
            .map_err(|e| PhotoLookupError::Network(e.without_url().to_string()))?;

        if !resp.status().is_success() {
            return Err(PhotoLookupError::Status(resp.status().as_u16()));
        }

        resp.json::<BotApiResponse<T>>()
            .await
            .map_err(|e| PhotoLookupError::Decode(e.without_url().to_string()))
    }
}

#[async_trait::async_trait]
impl PhotoSource for TelegramPhotoSource {
    async fn largest_photo_path(&self, user_id: &str) -> Result<Option<String>, PhotoLookupError> {
        let photos: BotApiResponse<UserProfilePhotos> =
            self.call("getUserProfilePhotos", &[("user_id", user_id), ("limit", "1")]).await?;
        let photos = match photos.result {
            Some(p) if photos.ok && p.total_count > 0 => p,
            _ => return Ok(None),
        };

        // Sizes are listed smallest first.
        let file_id = match photos.photos.first().and_then(|sizes| sizes.last()) {
            Some(size) => size.file_id.clone(),
            None => return Ok(None),
        };

        let file: BotApiResponse<BotFile> = self.call("getFile", &[("file_id", file_id.as_str())]).await?;
        if !file.ok { return Ok(None); }
        Ok(file.result.and_then(|f| f.file_path))
    }

    async fn download(&self, file_path: &str) -> Result<PhotoFile, PhotoLookupError> {
        let url = format!("{}/file/bot{}/{}", self.api_base, self.token.expose(), file_path);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PhotoLookupError::Network(e.without_url().to_string()))?;

        if !resp.status().is_success() {
            return Err(PhotoLookupError::Status(resp.status().as_u16()));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PhotoLookupError::Network(e.without_url().to_string()))?;

        Ok(PhotoFile { bytes: bytes.to_vec(), content_type })
    }
}

struct CachedPath {
    file_path: Option<String>,
    expires_at: Instant,
}

/// Per-user cache in front of a [`PhotoSource`]. Negative results are cached too.
pub struct ProfilePhotos {
    source: Arc<dyn PhotoSource>,
    ttl: Duration,
    capacity: usize,
    entries: RwLock<HashMap<String, CachedPath>>,
}

impl ProfilePhotos {
    pub fn new(source: Arc<dyn PhotoSource>, ttl: Duration) -> Self {
        Self::with_capacity(source, ttl, DEFAULT_PHOTO_CACHE_CAPACITY)
    }

    pub fn with_capacity(source: Arc<dyn PhotoSource>, ttl: Duration, capacity: usize) -> Self {
        Self { source, ttl, capacity: capacity.max(1), entries: RwLock::new(HashMap::new()) }
    }

    /// Number of users with a live cache entry.
    pub async fn cached_users(&self) -> usize {
        let now = Instant::now();
        self.entries.read().await.values().filter(|e| now < e.expires_at).count()
    }

    pub async fn file_path_for(&self, user_id: &str) -> Result<Option<String>, PhotoLookupError> {
        if let Some(entry) = self.entries.read().await.get(user_id) {
            if Instant::now() < entry.expires_at {
                tracing::debug!("Profile photo cache hit for user_id={}", user_id);
                return Ok(entry.file_path.clone());
            }
        }

        let file_path = self.source.largest_photo_path(user_id).await?;
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, e| now < e.expires_at);
        while entries.len() >= self.capacity && !entries.contains_key(user_id) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => { entries.remove(&key); }
                None => break,
            }
        }
        entries.insert(
            user_id.to_string(),
            CachedPath { file_path: file_path.clone(), expires_at: Instant::now() + self.ttl },
        );
        Ok(file_path)
    }

    /// Whether `file_path` was handed out by a lookup that is still cached.
    /// Only such paths may be proxied.
    pub async fn is_known_path(&self, file_path: &str) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .any(|e| now < e.expires_at && e.file_path.as_deref() == Some(file_path))
    }

    pub async fn download(&self, file_path: &str) -> Result<PhotoFile, PhotoLookupError> {
        self.source.download(file_path).await
    }
}

/// Public URL under which this service proxies a photo file.
pub fn proxy_url(file_path: &str) -> String {
    format!("/photo/{}", file_path)
}
