use std::sync::Arc;

use crate::catalog::Catalog;
use crate::error::{CatalogError, ResourceUnavailable};
use crate::queue::Track;

use super::probe::HttpProbe;

/// Result of checking one track.
#[derive(Debug)]
pub enum CheckOutcome {
    /// The source answered the probe.
    Reachable,
    /// The track has no source url to check.
    MissingSource,
    /// The probe failed and the catalog returned a different record.
    Refreshed {
        reason: ResourceUnavailable,
        track: Track,
    },
    /// The probe failed and the catalog returned the same record.
    Unchanged { reason: ResourceUnavailable },
    /// The probe failed and so did the catalog lookup.
    RefreshFailed {
        reason: ResourceUnavailable,
        error: CatalogError,
    },
}

/// Verifies a track's audio resource and falls back to the catalog for a
/// fresh record when it is stale.
///
/// The checker holds no references into queues or favourites; callers get the
/// fresh track through a callback and patch their own copies.
#[derive(Clone)]
pub struct ResourceChecker {
    probe: Arc<dyn HttpProbe>,
    catalog: Arc<dyn Catalog>,
}

impl ResourceChecker {
    pub fn new(probe: Arc<dyn HttpProbe>, catalog: Arc<dyn Catalog>) -> Self {
        Self { probe, catalog }
    }

    pub async fn probe(&self, url: &str) -> Result<(), ResourceUnavailable> {
        self.probe.probe(url).await
    }

    pub async fn try_refresh(&self, id: &str) -> Result<Track, CatalogError> {
        self.catalog.fetch_track_by_id(id).await
    }

    /// Fresh catalog record for `track`, or `track` itself when the lookup
    /// fails.
    pub async fn refresh(&self, track: &Track) -> Track {
        match self.try_refresh(&track.id).await {
            Ok(fresh) => fresh,
            Err(err) => {
                log::error!("Failed to refresh track {} ({}): {}", track.id, track.title, err);
                track.clone()
            }
        }
    }

    pub async fn inspect(&self, track: &Track) -> CheckOutcome {
        let Some(url) = track.source_url.as_deref() else {
            return CheckOutcome::MissingSource;
        };

        let reason = match self.probe(url).await {
            Ok(()) => return CheckOutcome::Reachable,
            Err(reason) => reason,
        };

        match self.try_refresh(&track.id).await {
            Ok(fresh) if fresh != *track => CheckOutcome::Refreshed { reason, track: fresh },
            Ok(_) => CheckOutcome::Unchanged { reason },
            Err(error) => CheckOutcome::RefreshFailed { reason, error },
        }
    }

    /// Returns the track to play: `track` itself when its source is healthy,
    /// otherwise the catalog's current record. `on_update` fires only when
    /// the returned track differs from the input.
    pub async fn check_and_refresh(&self, track: &Track, on_update: impl FnOnce(&Track)) -> Track {
        match self.inspect(track).await {
            CheckOutcome::Reachable => {
                log::debug!("Resource available: {}", track.title);
                track.clone()
            }
            CheckOutcome::MissingSource => {
                log::warn!("Track {} ({}) has no source url", track.id, track.title);
                track.clone()
            }
            CheckOutcome::Refreshed { reason, track: fresh } => {
                log::info!("Resource for {} unavailable ({}), refreshed from catalog", track.title, reason);
                on_update(&fresh);
                fresh
            }
            CheckOutcome::Unchanged { reason } => {
                log::info!("Resource for {} unavailable ({}), catalog has no newer record", track.title, reason);
                track.clone()
            }
            CheckOutcome::RefreshFailed { reason, error } => {
                log::error!(
                    "Resource for {} unavailable ({}) and refresh failed: {}",
                    track.title,
                    reason,
                    error
                );
                track.clone()
            }
        }
    }

    /// Checks `tracks` one after another, preserving order. `on_update`
    /// receives each refreshed track with its index in `tracks`.
    pub async fn check_and_refresh_all(
        &self,
        tracks: &[Track],
        mut on_update: impl FnMut(usize, &Track),
    ) -> Vec<Track> {
        let mut results = Vec::with_capacity(tracks.len());
        for (index, track) in tracks.iter().enumerate() {
            let checked = self
                .check_and_refresh(track, |fresh| on_update(index, fresh))
                .await;
            results.push(checked);
        }
        results
    }
}
