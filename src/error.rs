//! Error and fault types shared across the engine.
//!
//! Components that must never fail outward (the health checker, the preload
//! manager, the spectrum analyzer) still use these types internally and in
//! their explicit-result entry points.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Why a probed audio resource was judged unreachable.
#[derive(Debug, Error)]
pub enum ResourceUnavailable {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("server answered HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Transport(String),
}

/// Catalog lookup failures.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid catalog url: {0}")]
    InvalidUrl(String),

    #[error("catalog rejected request (code {code}): {msg}")]
    Api { code: i64, msg: String },

    #[error("catalog response for {0} carried no data")]
    MissingData(String),
}

/// Raised by an [`AudioPlatform`](crate::platform::AudioPlatform) that cannot
/// build an analysis graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("cross-origin source cannot be analysed: {0}")]
    CorsBlocked(String),

    #[error("audio processing unavailable: {0}")]
    Unsupported(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Observable fault kinds. These are reported as values, never raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    DecodeError,
    CorsBlocked,
    InitFailure,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::DecodeError => "DECODE_ERROR",
            FaultKind::CorsBlocked => "CORS_BLOCKED",
            FaultKind::InitFailure => "INIT_FAILURE",
        };
        f.write_str(name)
    }
}

/// Fault recorded by the spectrum analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerFault {
    pub kind: FaultKind,
    pub detail: String,
}

impl AnalyzerFault {
    pub fn new(kind: FaultKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for AnalyzerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl From<&PlatformError> for AnalyzerFault {
    fn from(err: &PlatformError) -> Self {
        match err {
            PlatformError::CorsBlocked(detail) => Self::new(FaultKind::CorsBlocked, detail.clone()),
            PlatformError::Unsupported(detail) => Self::new(FaultKind::InitFailure, detail.clone()),
        }
    }
}
