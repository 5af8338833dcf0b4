use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, EXPIRES, PRAGMA};

use crate::error::ResourceUnavailable;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Existence check for a remote audio resource.
#[async_trait]
pub trait HttpProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<(), ResourceUnavailable>;
}

/// HEAD-request probe that defeats intermediate caches.
pub struct ReqwestProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn probe(&self, url: &str) -> Result<(), ResourceUnavailable> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        let response = self
            .client
            .head(url)
            .query(&[("_t", stamp.to_string())])
            .header(CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .header(PRAGMA, "no-cache")
            .header(EXPIRES, "0")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ResourceUnavailable::Timeout(self.timeout)
                } else {
                    ResourceUnavailable::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() || status.is_redirection() {
            log::debug!("Probe ok ({}): {}", status, url);
            Ok(())
        } else {
            Err(ResourceUnavailable::Status(status.as_u16()))
        }
    }
}
