//! Audio Player: the server-chain middleware that buffers streamed
//! assistant audio and drains it through a host output device.
//!
//! The device callback runs on a separate host thread under a short
//! critical section; anything beyond "pop a page, maybe schedule a
//! follow-up" is pushed onto the cooperative scheduler via
//! [`SchedulerHandle::call_soon`].

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use bytes::Bytes;
use openai_protocol::realtime::{ContentPart, RealtimeServerEvent};
use parking_lot::Mutex;

use crate::audio::backend::{AudioBackend, StreamHandle};
use crate::audio::format::{resolve, AudioEncoding, PagingRequest, ResolvedAudio};
use crate::audio::PageBuffer;
use crate::error::AriaResult;
use crate::pipeline::{EventMeta, PlaybackTracker, ServerMiddleware};
use crate::scheduler::SchedulerHandle;

const NAME: &str = "audio_player";

struct Speech {
    item_id: String,
    content_index: u32,
    buffer: PageBuffer,
    has_more_to_come: bool,
    played_ms: f64,
}

impl Speech {
    fn accomplished(&self) -> bool {
        !self.has_more_to_come && self.buffer.is_empty()
    }
}

#[derive(Default)]
struct Shared {
    speeches: VecDeque<Speech>,
    resolved: Option<ResolvedAudio>,
}

type SpeechEndHandler = Box<dyn Fn(&str, u32) + Send + Sync>;

pub struct AudioPlayer {
    shared: Arc<Mutex<Shared>>,
    backend: Arc<dyn AudioBackend>,
    stream: Mutex<Option<Box<dyn StreamHandle>>>,
    scheduler: SchedulerHandle,
    paging: PagingRequest,
    on_speech_end: Arc<Mutex<Vec<SpeechEndHandler>>>,
}

impl AudioPlayer {
    pub fn new(backend: Arc<dyn AudioBackend>, scheduler: SchedulerHandle, paging: PagingRequest) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            backend,
            stream: Mutex::new(None),
            scheduler,
            paging,
            on_speech_end: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn on_speech_end(&self, handler: impl Fn(&str, u32) + Send + Sync + 'static) {
        self.on_speech_end.lock().push(Box::new(handler));
    }

    fn open_if_needed(&self, encoding: AudioEncoding) -> AriaResult<()> {
        if self.shared.lock().resolved.is_some() {
            return Ok(());
        }
        let resolved = resolve(encoding, self.paging)?;
        let ms_per_byte = resolved.ms_per_byte();

        let shared = self.shared.clone();
        let scheduler = self.scheduler.clone();
        let on_speech_end = self.on_speech_end.clone();

        let pull = Box::new(move || -> Bytes {
            let mut guard = shared.lock();
            let Some(front) = guard.speeches.front_mut() else {
                return Bytes::new();
            };
            let (page, n_content_bytes) = front.buffer.pop();
            let item_id = front.item_id.clone();
            let content_index = front.content_index;
            drop(guard);

            if n_content_bytes > 0 {
                let shared = shared.clone();
                let on_speech_end = on_speech_end.clone();
                let ms = n_content_bytes as f64 * ms_per_byte;
                scheduler.call_soon(move || {
                    apply_play_update(&shared, &on_speech_end, &item_id, content_index, ms);
                });
            }
            page
        });

        let stream = self
            .backend
            .open_output(resolved.sample_rate(), resolved.bytes_per_sample(), pull)?;
        *self.stream.lock() = Some(stream);
        self.shared.lock().resolved = Some(resolved);
        Ok(())
    }
}

fn apply_play_update(
    shared: &Mutex<Shared>,
    on_speech_end: &Mutex<Vec<SpeechEndHandler>>,
    item_id: &str,
    content_index: u32,
    ms: f64,
) {
    let mut ended = Vec::new();
    {
        let mut guard = shared.lock();
        if let Some(front) = guard.speeches.front_mut() {
            if front.item_id == item_id && front.content_index == content_index {
                front.played_ms += ms;
            }
        }
        while matches!(guard.speeches.front(), Some(s) if s.accomplished()) {
            ended.push(guard.speeches.pop_front().unwrap());
        }
    }
    let handlers = on_speech_end.lock();
    for speech in &ended {
        for handler in handlers.iter() {
            handler(&speech.item_id, speech.content_index);
        }
    }
}

#[async_trait]
impl ServerMiddleware for AudioPlayer {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn on_server_event(
        &self,
        event: RealtimeServerEvent,
        meta: &mut EventMeta,
    ) -> AriaResult<Option<RealtimeServerEvent>> {
        meta.touch(NAME)?;

        match &event {
            RealtimeServerEvent::SessionUpdated { session, .. }
            | RealtimeServerEvent::SessionCreated { session, .. } => {
                let encoding = AudioEncoding::from_wire(session.output_audio_format, None);
                self.open_if_needed(encoding)?;
            }
            RealtimeServerEvent::ResponseAudioDelta { item_id, content_index, delta, .. } => {
                if !meta.flag("during_user_speech") {
                    let bytes = match meta.decoded_audio() {
                        Some(bytes) => Some(bytes.clone()),
                        None => base64::engine::general_purpose::STANDARD
                            .decode(delta)
                            .ok()
                            .map(Bytes::from),
                    };
                    if let Some(bytes) = bytes {
                        let mut guard = self.shared.lock();
                        if let Some(speech) = guard
                            .speeches
                            .iter_mut()
                            .find(|s| &s.item_id == item_id && s.content_index == *content_index)
                        {
                            speech.buffer.append(&bytes);
                        }
                    }
                }
            }
            RealtimeServerEvent::ResponseContentPartAdded {
                item_id,
                content_index,
                part: ContentPart::OutputAudio { .. },
                ..
            } => {
                let mut guard = self.shared.lock();
                if let Some(resolved) = guard.resolved {
                    guard.speeches.push_back(Speech {
                        item_id: item_id.clone(),
                        content_index: *content_index,
                        buffer: PageBuffer::new(resolved.bytes_per_page, resolved.silence_byte()),
                        has_more_to_come: true,
                        played_ms: 0.0,
                    });
                }
            }
            RealtimeServerEvent::ResponseContentPartDone {
                item_id,
                content_index,
                part: ContentPart::OutputAudio { .. },
                ..
            } => {
                let mut guard = self.shared.lock();
                if let Some(speech) = guard
                    .speeches
                    .iter_mut()
                    .find(|s| &s.item_id == item_id && s.content_index == *content_index)
                {
                    speech.has_more_to_come = false;
                }
            }
            _ => {}
        }

        Ok(Some(event))
    }
}

impl PlaybackTracker for AudioPlayer {
    fn now_playing(&self) -> Option<(String, u32)> {
        let guard = self.shared.lock();
        guard.speeches.front().map(|s| (s.item_id.clone(), s.content_index))
    }

    fn elapsed_ms(&self, item_id: &str, content_index: u32) -> u64 {
        let guard = self.shared.lock();
        guard
            .speeches
            .front()
            .filter(|s| s.item_id == item_id && s.content_index == content_index)
            .map(|s| s.played_ms.round() as u64)
            .unwrap_or(0)
    }

    fn on_interrupted(&self, _item_id: &str, _content_index: u32) {
        self.shared.lock().speeches.clear();
    }
}
