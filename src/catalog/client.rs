use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::CatalogError;
use crate::queue::{Album, Track};

pub const DEFAULT_BASE_URL: &str = "https://monster-siren.hypergryph.com/api/";

/// Lookup of fresh track records by id.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn fetch_track_by_id(&self, id: &str) -> Result<Track, CatalogError>;
}

/// Envelope every catalog endpoint answers with.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TrackList {
    list: Vec<Track>,
}

#[derive(Debug, Deserialize)]
struct AlbumArtists {
    #[serde(default, alias = "artistes")]
    artists: Vec<String>,
}

pub struct CatalogClient {
    client: reqwest::Client,
    base_url: Url,
}

impl CatalogClient {
    pub fn new(base_url: &str) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder().build()?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, CatalogError> {
        // Url::join drops the last path segment unless it ends with '/'.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized).map_err(|e| CatalogError::InvalidUrl(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CatalogError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| CatalogError::InvalidUrl(e.to_string()))?;
        log::debug!("Catalog GET {}", url);

        let envelope: ApiResponse<T> = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if envelope.code != 0 {
            return Err(CatalogError::Api {
                code: envelope.code,
                msg: envelope.msg,
            });
        }
        envelope
            .data
            .ok_or_else(|| CatalogError::MissingData(path.to_string()))
    }

    /// Every track the catalog lists. List entries usually omit source urls.
    pub async fn fetch_tracks(&self) -> Result<Vec<Track>, CatalogError> {
        let list: TrackList = self.get("songs").await?;
        Ok(list.list)
    }

    /// Album detail merged with the artist list from the album's data
    /// endpoint.
    pub async fn fetch_album(&self, id: &str) -> Result<Album, CatalogError> {
        let mut album: Album = self.get(&format!("album/{}/detail", id)).await?;
        let meta: AlbumArtists = self.get(&format!("album/{}/data", id)).await?;
        album.artists = meta.artists;
        Ok(album)
    }
}

#[async_trait]
impl Catalog for CatalogClient {
    async fn fetch_track_by_id(&self, id: &str) -> Result<Track, CatalogError> {
        self.get(&format!("song/{}", id)).await
    }
}
