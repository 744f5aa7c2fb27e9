//! Audio format resolution and the paged low-latency buffer built on top of
//! it. Device I/O lives in [`player`], [`mic`], and [`backend`].

pub mod backend;
mod buffer;
mod format;
mod mic;
mod player;

pub use buffer::PageBuffer;
pub use format::{
    resolve, AudioEncoding, LatencyTarget, PagingRequest, ResolvedAudio, DEFAULT_PCM_SAMPLE_RATE,
};
pub use mic::MicStreamer;
pub use player::AudioPlayer;
