//! Native audio capabilities: symphonia decoding, a headless playback clock
//! and an FFT analyser standing in for the host's frequency-transform node.

pub mod analyser;
pub mod decode;
pub mod element;

use std::sync::Arc;

use crate::error::PlatformError;
use crate::platform::{AnalysisGraph, AudioBackend, AudioPlatform, MediaElement, TransformSettings};

pub use analyser::FftAnalyser;
pub use decode::{decode_bytes, decode_file, AudioData};
pub use element::{Clock, NativeElement};

/// Creates [`NativeElement`]s sharing one HTTP client.
pub struct NativeAudioBackend {
    client: reqwest::Client,
    clock: Clock,
}

impl NativeAudioBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            clock: Clock::Realtime,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

impl AudioBackend for NativeAudioBackend {
    fn create_element(&self) -> Arc<dyn MediaElement> {
        NativeElement::new(self.client.clone(), self.clock)
    }
}

/// Builds [`FftAnalyser`] graphs over an element's sample tap.
pub struct NativeAudioPlatform;

impl AudioPlatform for NativeAudioPlatform {
    fn create_graph(
        &self,
        element: &Arc<dyn MediaElement>,
        settings: &TransformSettings,
    ) -> Result<Box<dyn AnalysisGraph>, PlatformError> {
        let n = settings.fft_size;
        if !n.is_power_of_two() || !(32..=32768).contains(&n) {
            return Err(PlatformError::Unsupported(format!("invalid fft size {}", n)));
        }

        match element.sample_tap() {
            Some(tap) => Ok(Box::new(FftAnalyser::new(tap, *settings))),
            None => {
                let source = element.source().unwrap_or_default();
                if element::is_remote(&source) {
                    Err(PlatformError::CorsBlocked(source))
                } else {
                    Err(PlatformError::Unsupported(format!("no decoded samples for '{}'", source)))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::NullElement;

    fn settings(fft_size: usize) -> TransformSettings {
        TransformSettings {
            fft_size,
            smoothing: 0.7,
            min_decibels: -100.0,
            max_decibels: -10.0,
        }
    }

    #[test]
    fn rejects_invalid_fft_size() {
        let element: Arc<dyn MediaElement> = Arc::new(NullElement::default());
        let err = NativeAudioPlatform.create_graph(&element, &settings(1000)).err().unwrap();
        assert!(matches!(err, PlatformError::Unsupported(_)));
    }

    #[test]
    fn element_without_samples_is_unsupported() {
        let element = NativeAudioBackend::new(reqwest::Client::new()).create_element();
        let err = NativeAudioPlatform.create_graph(&element, &settings(2048)).err().unwrap();
        assert!(matches!(err, PlatformError::Unsupported(_)));
    }
}
