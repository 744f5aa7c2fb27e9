//! Microphone Streamer: opens an input device once the session format is
//! known, and forwards captured audio as `input_audio_buffer.append`
//! events. Assumes server-side or semantic voice-activity detection --
//! this component has no opinion about when the user is speaking, it just
//! streams.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use bytes::Bytes;
use openai_protocol::realtime::{RealtimeClientEvent, RealtimeServerEvent};
use parking_lot::Mutex;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;

use crate::audio::backend::{AudioBackend, StreamHandle};
use crate::audio::{AudioEncoding, PagingRequest};
use crate::error::AriaResult;
use crate::pipeline::{EventMeta, ServerMiddleware};

const NAME: &str = "mic_streamer";

/// 0.9 * 15 MiB -- the point at which the worker flushes even if the queue
/// hasn't momentarily drained.
const APPEND_THRESHOLD_BYTES: usize = 15 * 1024 * 1024 * 9 / 10;

pub struct MicStreamer {
    backend: Arc<dyn AudioBackend>,
    stream: Mutex<Option<Box<dyn StreamHandle>>>,
    frame_tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    outbound: mpsc::UnboundedSender<RealtimeClientEvent>,
    recording_path: Option<std::path::PathBuf>,
}

impl MicStreamer {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        outbound: mpsc::UnboundedSender<RealtimeClientEvent>,
        recording_path: Option<std::path::PathBuf>,
    ) -> Self {
        Self {
            backend,
            stream: Mutex::new(None),
            frame_tx: Mutex::new(None),
            outbound,
            recording_path,
        }
    }

    fn open_if_needed(&self, encoding: AudioEncoding) -> AriaResult<()> {
        if self.frame_tx.lock().is_some() {
            return Ok(());
        }
        let resolved = crate::audio::resolve(encoding, PagingRequest::target_latency(20.0))?;

        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<Bytes>();

        let push = Box::new({
            let frame_tx = frame_tx.clone();
            move |frame: Bytes| {
                let _ = frame_tx.send(frame);
            }
        });

        let stream = self
            .backend
            .open_input(resolved.sample_rate(), resolved.bytes_per_sample(), push)?;
        *self.stream.lock() = Some(stream);
        *self.frame_tx.lock() = Some(frame_tx);

        tokio::spawn(run_worker(frame_rx, self.outbound.clone(), encoding, self.recording_path.clone()));
        Ok(())
    }

    /// Stop the device stream and unblock the worker with the empty-bytes
    /// shutdown marker.
    pub fn shutdown(&self) {
        if let Some(stream) = self.stream.lock().take() {
            stream.close();
        }
        if let Some(tx) = self.frame_tx.lock().take() {
            let _ = tx.send(Bytes::new());
        }
    }
}

async fn run_worker(
    mut frame_rx: mpsc::UnboundedReceiver<Bytes>,
    outbound: mpsc::UnboundedSender<RealtimeClientEvent>,
    encoding: AudioEncoding,
    recording_path: Option<std::path::PathBuf>,
) {
    let mut recorder = match recording_path {
        Some(path) => match tokio::fs::File::create(&path).await {
            Ok(file) => Some(BufWriter::new(file)),
            Err(err) => {
                tracing::warn!("failed to open mic recording file {path:?}: {err}");
                None
            }
        },
        None => None,
    };

    let mut accumulated = Vec::new();
    loop {
        let Some(frame) = frame_rx.recv().await else {
            break;
        };
        if frame.is_empty() {
            // Shutdown marker.
            break;
        }
        accumulated.extend_from_slice(&frame);

        // Drain whatever else is already queued before deciding whether to
        // flush, so a burst of callbacks becomes one outbound event.
        while accumulated.len() < APPEND_THRESHOLD_BYTES {
            match frame_rx.try_recv() {
                Ok(more) if more.is_empty() => {
                    flush(&mut accumulated, &outbound, &mut recorder, encoding).await;
                    return;
                }
                Ok(more) => accumulated.extend_from_slice(&more),
                Err(_) => break,
            }
        }

        flush(&mut accumulated, &outbound, &mut recorder, encoding).await;
    }
    flush(&mut accumulated, &outbound, &mut recorder, encoding).await;
}

async fn flush(
    accumulated: &mut Vec<u8>,
    outbound: &mpsc::UnboundedSender<RealtimeClientEvent>,
    recorder: &mut Option<BufWriter<tokio::fs::File>>,
    encoding: AudioEncoding,
) {
    if accumulated.is_empty() {
        return;
    }

    if let Some(writer) = recorder.as_mut() {
        let pcm = match encoding {
            AudioEncoding::Pcm16 { .. } => std::borrow::Cow::Borrowed(accumulated.as_slice()),
            AudioEncoding::G711Ulaw => std::borrow::Cow::Owned(expand_ulaw(accumulated)),
            AudioEncoding::G711Alaw => std::borrow::Cow::Owned(expand_alaw(accumulated)),
        };
        if let Err(err) = writer.write_all(&pcm).await {
            tracing::warn!("mic recording write failed: {err}");
        }
    }

    let encoded = base64::engine::general_purpose::STANDARD.encode(&accumulated);
    let _ = outbound.send(RealtimeClientEvent::audio_append(encoded));
    accumulated.clear();
}

/// ITU-T G.711 mu-law to 16-bit linear PCM, for the recording file only.
fn expand_ulaw(samples: &[u8]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&b| ulaw_to_pcm16(b).to_le_bytes())
        .collect()
}

fn ulaw_to_pcm16(u_val: u8) -> i16 {
    const BIAS: i32 = 0x84;
    let u_val = !u_val;
    let sign = u_val & 0x80;
    let exponent = (u_val >> 4) & 0x07;
    let mantissa = u_val & 0x0F;
    let mut sample = ((mantissa as i32) << 3) + BIAS;
    sample <<= exponent as i32;
    sample -= BIAS;
    (if sign != 0 { -sample } else { sample }) as i16
}

/// ITU-T G.711 A-law to 16-bit linear PCM, for the recording file only.
fn expand_alaw(samples: &[u8]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&b| alaw_to_pcm16(b).to_le_bytes())
        .collect()
}

fn alaw_to_pcm16(a_val: u8) -> i16 {
    let a_val = a_val ^ 0x55;
    let sign = a_val & 0x80;
    let exponent = (a_val >> 4) & 0x07;
    let mantissa = a_val & 0x0F;
    let mut sample = ((mantissa as i32) << 4) + 8;
    if exponent != 0 {
        sample += 0x100;
    }
    if exponent > 1 {
        sample <<= (exponent - 1) as i32;
    }
    (if sign != 0 { -sample } else { sample }) as i16
}

#[async_trait]
impl ServerMiddleware for MicStreamer {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn on_server_event(
        &self,
        event: RealtimeServerEvent,
        meta: &mut EventMeta,
    ) -> AriaResult<Option<RealtimeServerEvent>> {
        meta.touch(NAME)?;
        if let RealtimeServerEvent::SessionUpdated { session, .. }
        | RealtimeServerEvent::SessionCreated { session, .. } = &event
        {
            let encoding = AudioEncoding::from_wire(session.input_audio_format, None);
            self.open_if_needed(encoding)?;
        }
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ulaw_silence_round_trips_to_near_zero() {
        assert!(ulaw_to_pcm16(0xFF).abs() < 16);
    }

    #[test]
    fn alaw_silence_round_trips_to_near_zero() {
        assert!(alaw_to_pcm16(0x55).abs() < 16);
    }
}
