//! Audio Format & Paging Resolver.
//!
//! Turns a declared audio encoding plus a page-size request (explicit sample
//! count, a latency window, or a single target latency) into the concrete
//! numbers the rest of the audio pipeline needs: sample rate, bytes per
//! sample, bytes per page, and the byte used to pad a short tail with
//! silence.

use crate::error::{AriaError, AriaResult};
use openai_protocol::realtime::AudioFormat;

pub const DEFAULT_PCM_SAMPLE_RATE: u32 = 24_000;
const G711_SAMPLE_RATE: u32 = 8_000;

/// A fully-resolved audio encoding: which codec, and at what rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    Pcm16 { sample_rate: u32 },
    G711Ulaw,
    G711Alaw,
}

impl AudioEncoding {
    /// Build the resolved encoding from a wire [`AudioFormat`] tag. PCM16
    /// rate defaults to [`DEFAULT_PCM_SAMPLE_RATE`] unless a rate is known
    /// from session configuration.
    pub fn from_wire(format: AudioFormat, pcm_sample_rate: Option<u32>) -> Self {
        match format {
            AudioFormat::Pcm16 => Self::Pcm16 {
                sample_rate: pcm_sample_rate.unwrap_or(DEFAULT_PCM_SAMPLE_RATE),
            },
            AudioFormat::G711Ulaw => Self::G711Ulaw,
            AudioFormat::G711Alaw => Self::G711Alaw,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        match self {
            Self::Pcm16 { sample_rate } => *sample_rate,
            Self::G711Ulaw | Self::G711Alaw => G711_SAMPLE_RATE,
        }
    }

    pub fn bytes_per_sample(&self) -> u32 {
        match self {
            Self::Pcm16 { .. } => 2,
            Self::G711Ulaw | Self::G711Alaw => 1,
        }
    }

    /// Byte value used to pad a short tail. PCM silence is exactly zero;
    /// for the G.711 companded encodings this is a best-effort filler --
    /// those pages are not guaranteed to be played back, per spec.
    pub fn silence_byte(&self) -> u8 {
        0
    }
}

/// How the caller wants the page size chosen.
#[derive(Debug, Clone, Copy)]
pub struct PagingRequest {
    pub explicit_samples: Option<u32>,
    pub latency: Option<LatencyTarget>,
}

#[derive(Debug, Clone, Copy)]
pub enum LatencyTarget {
    /// A single target latency in milliseconds.
    Single(f64),
    /// An acceptable latency window, in milliseconds.
    Window { min_ms: f64, max_ms: f64 },
}

impl PagingRequest {
    pub fn explicit(samples: u32) -> Self {
        Self {
            explicit_samples: Some(samples),
            latency: None,
        }
    }

    pub fn latency_window(min_ms: f64, max_ms: f64) -> Self {
        Self {
            explicit_samples: None,
            latency: Some(LatencyTarget::Window { min_ms, max_ms }),
        }
    }

    pub fn target_latency(ms: f64) -> Self {
        Self {
            explicit_samples: None,
            latency: Some(LatencyTarget::Single(ms)),
        }
    }
}

/// The fully-resolved format + page geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAudio {
    pub encoding: AudioEncoding,
    pub n_samples_per_page: u32,
    pub bytes_per_page: usize,
}

impl ResolvedAudio {
    pub fn sample_rate(&self) -> u32 {
        self.encoding.sample_rate()
    }

    pub fn bytes_per_sample(&self) -> u32 {
        self.encoding.bytes_per_sample()
    }

    pub fn silence_byte(&self) -> u8 {
        self.encoding.silence_byte()
    }

    pub fn ms_per_page(&self) -> f64 {
        (self.n_samples_per_page as f64 / self.sample_rate() as f64) * 1000.0
    }

    pub fn ms_per_byte(&self) -> f64 {
        1000.0 / (self.sample_rate() as f64 * self.bytes_per_sample() as f64)
    }
}

/// Resolve an encoding and paging request into concrete page geometry.
///
/// Over-specification (an explicit sample count together with a single
/// target latency) is rejected. Under-specification (neither given) is
/// rejected too -- callers without a page-size hint yet should defer
/// resolution rather than call this with an empty request.
pub fn resolve(encoding: AudioEncoding, paging: PagingRequest) -> AriaResult<ResolvedAudio> {
    let bytes_per_sample = encoding.bytes_per_sample();
    let sample_rate = encoding.sample_rate();

    let n_samples_per_page = match (paging.explicit_samples, paging.latency) {
        (Some(_), Some(LatencyTarget::Single(_))) => {
            return Err(AriaError::AudioFormatOverSpecified(
                "both an explicit sample count and a single target latency were given"
                    .to_string(),
            ));
        }
        (None, None) => {
            return Err(AriaError::AudioFormatUnderSpecified(
                "neither an explicit sample count nor a target latency was given".to_string(),
            ));
        }
        (Some(samples), _) => samples,
        (None, Some(LatencyTarget::Single(ms))) => {
            ((ms / 1000.0) * sample_rate as f64).round() as u32
        }
        (None, Some(LatencyTarget::Window { min_ms, max_ms })) => {
            let midpoint_ms = (min_ms + max_ms) / 2.0;
            let candidate = ((midpoint_ms / 1000.0) * sample_rate as f64).round() as u32;
            let candidate_ms = (candidate as f64 / sample_rate as f64) * 1000.0;
            if candidate_ms < min_ms || candidate_ms > max_ms {
                return Err(AriaError::AudioPagingUnresolvable(format!(
                    "no integer sample count at {sample_rate} Hz falls within [{min_ms}, {max_ms}] ms (closest was {candidate_ms} ms)"
                )));
            }
            candidate
        }
    };

    if n_samples_per_page == 0 {
        return Err(AriaError::AudioPagingUnresolvable(
            "resolved page size is zero samples".to_string(),
        ));
    }

    Ok(ResolvedAudio {
        encoding,
        n_samples_per_page,
        bytes_per_page: (n_samples_per_page * bytes_per_sample) as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_samples_resolves_ms_per_page() {
        let r = resolve(
            AudioEncoding::Pcm16 { sample_rate: 24_000 },
            PagingRequest::explicit(2048),
        )
        .unwrap();
        assert_eq!(r.bytes_per_page, 4096);
        assert!((r.ms_per_page() - (2048.0 / 24_000.0 * 1000.0)).abs() < 1e-9);
    }

    #[test]
    fn latency_window_picks_midpoint_and_stays_inside() {
        let r = resolve(
            AudioEncoding::Pcm16 { sample_rate: 24_000 },
            PagingRequest::latency_window(80.0, 90.0),
        )
        .unwrap();
        let ms = r.ms_per_page();
        assert!((80.0..=90.0).contains(&ms), "ms_per_page = {ms}");
    }

    #[test]
    fn single_latency_resolves() {
        let r = resolve(
            AudioEncoding::Pcm16 { sample_rate: 8_000 },
            PagingRequest::target_latency(20.0),
        )
        .unwrap();
        assert_eq!(r.n_samples_per_page, 160);
    }

    #[test]
    fn over_specified_is_rejected() {
        let req = PagingRequest {
            explicit_samples: Some(160),
            latency: Some(LatencyTarget::Single(20.0)),
        };
        let err = resolve(AudioEncoding::G711Ulaw, req).unwrap_err();
        assert!(matches!(err, AriaError::AudioFormatOverSpecified(_)));
    }

    #[test]
    fn under_specified_is_rejected() {
        let req = PagingRequest {
            explicit_samples: None,
            latency: None,
        };
        let err = resolve(AudioEncoding::G711Alaw, req).unwrap_err();
        assert!(matches!(err, AriaError::AudioFormatUnderSpecified(_)));
    }

    #[test]
    fn g711_defaults_to_8khz_mono_byte() {
        let enc = AudioEncoding::from_wire(AudioFormat::G711Ulaw, None);
        assert_eq!(enc.sample_rate(), 8_000);
        assert_eq!(enc.bytes_per_sample(), 1);
    }

    #[test]
    fn pcm_default_rate_is_24khz() {
        let enc = AudioEncoding::from_wire(AudioFormat::Pcm16, None);
        assert_eq!(enc.sample_rate(), DEFAULT_PCM_SAMPLE_RATE);
    }
}
