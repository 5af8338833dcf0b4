use serde::{Deserialize, Serialize};

const UNKNOWN_ARTIST: &str = "Unknown artist";

/// A playable catalog entry.
///
/// Tracks are never patched field by field: a stale track is replaced by the
/// record the catalog returns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    #[serde(alias = "cid")]
    pub id: String,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(alias = "albumCid")]
    pub album_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyric_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mv_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mv_cover_url: Option<String>,
    #[serde(default)]
    pub artists: Vec<String>,
}

impl Track {
    /// Artists joined for display, e.g. `"A / B"`.
    pub fn artist_line(&self) -> String {
        if self.artists.is_empty() {
            return UNKNOWN_ARTIST.to_string();
        }
        self.artists.join(" / ")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    #[serde(alias = "cid")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub belong: Option<String>,
    #[serde(default)]
    pub cover_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_de_url: Option<String>,
    #[serde(default, alias = "artistes")]
    pub artists: Vec<String>,
}

/// One queue slot: the track plus the album it was queued from, if any.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    #[serde(alias = "song")]
    pub track: Track,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<Album>,
}

impl QueueItem {
    pub fn new(track: Track) -> Self {
        Self { track, album: None }
    }
}
