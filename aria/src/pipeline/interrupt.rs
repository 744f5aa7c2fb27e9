//! Interruption Coordinator: detects user speech over assistant speech (and
//! the reverse), truncates the playing item both locally and on the
//! server, and flags in-flight audio deltas so the Audio Player skips them
//! during the race window.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use openai_protocol::realtime::{AudioFormat, RealtimeClientEvent, RealtimeServerEvent};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::audio::AudioEncoding;
use crate::error::{AriaError, AriaResult};

use super::{ConfigTracker, EventMeta, ServerMiddleware, StateEngine};

const NAME: &str = "interrupt";

/// What the Audio Player exposes about the content it's currently playing.
/// Implemented by the Audio Player; queried here to decide whether an
/// interrupt is needed and how far into the clip playback had gotten.
pub trait PlaybackTracker: Send + Sync {
    /// The `(item_id, content_index)` of the speech currently at the head
    /// of the playback deque, if any.
    fn now_playing(&self) -> Option<(String, u32)>;

    /// Milliseconds of audio already consumed by the device for the given
    /// content, for proportional truncation.
    fn elapsed_ms(&self, item_id: &str, content_index: u32) -> u64;

    /// Stop playback of the given content and drop its buffered audio.
    fn on_interrupted(&self, item_id: &str, content_index: u32);
}

#[derive(Default)]
struct State {
    is_user_talking: bool,
    already_interrupted: HashSet<String>,
}

pub struct InterruptionCoordinator {
    state: Mutex<State>,
    config: Arc<ConfigTracker>,
    conversation: Arc<StateEngine>,
    playback: Arc<dyn PlaybackTracker>,
    outbound: mpsc::UnboundedSender<RealtimeClientEvent>,
}

impl InterruptionCoordinator {
    pub fn new(
        config: Arc<ConfigTracker>,
        conversation: Arc<StateEngine>,
        playback: Arc<dyn PlaybackTracker>,
        outbound: mpsc::UnboundedSender<RealtimeClientEvent>,
    ) -> Self {
        Self {
            state: Mutex::new(State::default()),
            config,
            conversation,
            playback,
            outbound,
        }
    }

    fn is_user_talking(&self) -> bool {
        self.state.lock().is_user_talking
    }

    fn set_user_talking(&self, talking: bool) {
        self.state.lock().is_user_talking = talking;
    }

    /// Runs the interrupt procedure at most once per item: stop local
    /// playback, notify the tracker, compute the truncation point, mark it
    /// on the conversation cell, and emit the cancel/truncate pair. Errors
    /// are swallowed here -- a send against a just-closed transport races
    /// normally and should not fail the caller.
    fn interrupt(&self, item_id: String, content_index: u32) {
        {
            let mut state = self.state.lock();
            if !state.already_interrupted.insert(item_id.clone()) {
                return;
            }
        }

        self.playback.on_interrupted(&item_id, content_index);

        let elapsed_ms = self.playback.elapsed_ms(&item_id, content_index);
        let transcript = self.conversation.transcript(&item_id, content_index as usize);
        let audio_total_bytes = self.conversation.audio_total_bytes(&item_id).unwrap_or(0);
        let output_format = self.config.audio_format_output().unwrap_or(AudioFormat::Pcm16);
        let ms_per_byte = ms_per_byte(output_format);
        let total_speech_ms = audio_total_bytes as f64 * ms_per_byte;

        let truncated_transcript = transcript.map(|full| {
            if total_speech_ms <= 0.0 {
                return String::new();
            }
            let fraction = (elapsed_ms as f64 / total_speech_ms).clamp(0.0, 1.0);
            let cut = (full.chars().count() as f64 * fraction).round() as usize;
            full.chars().take(cut).collect()
        });

        let audio_end_ms = elapsed_ms as u32;
        let _ = self
            .conversation
            .mark_truncated(&item_id, content_index, audio_end_ms, truncated_transcript);

        let _ = self.outbound.send(RealtimeClientEvent::response_cancel());
        let _ = self.outbound.send(RealtimeClientEvent::ConversationItemTruncate {
            event_id: None,
            item_id,
            content_index,
            audio_end_ms,
        });
    }
}

fn ms_per_byte(format: AudioFormat) -> f64 {
    let encoding = AudioEncoding::from_wire(format, None);
    1000.0 / (encoding.sample_rate() as f64 * encoding.bytes_per_sample() as f64)
}

#[async_trait]
impl ServerMiddleware for InterruptionCoordinator {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn on_server_event(
        &self,
        event: RealtimeServerEvent,
        meta: &mut EventMeta,
    ) -> AriaResult<Option<RealtimeServerEvent>> {
        meta.assert_not_yet("audio_player")?;
        meta.touch(NAME)?;

        match &event {
            RealtimeServerEvent::InputAudioBufferSpeechStarted { .. } => {
                self.set_user_talking(true);
                if let Some((item_id, content_index)) = self.playback.now_playing() {
                    self.interrupt(item_id, content_index);
                }
            }
            RealtimeServerEvent::InputAudioBufferSpeechStopped { .. } => {
                self.set_user_talking(false);
            }
            RealtimeServerEvent::ResponseAudioDelta {
                item_id,
                content_index,
                ..
            } if self.is_user_talking() => {
                let elapsed_ms = self.playback.elapsed_ms(item_id, *content_index);
                if elapsed_ms != 0 {
                    return Err(AriaError::ProtocolViolation(format!(
                        "response.audio.delta for {item_id}[{content_index}] arrived during user \
                         speech after {elapsed_ms}ms had already played; this speech must not have started yet"
                    )));
                }
                self.interrupt(item_id.clone(), *content_index);
                meta.set_flag("during_user_speech", true);
            }
            _ => {}
        }

        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakePlayback {
        playing: Mutex<Option<(String, u32)>>,
        interrupted: AtomicBool,
    }

    impl PlaybackTracker for FakePlayback {
        fn now_playing(&self) -> Option<(String, u32)> {
            self.playing.lock().clone()
        }

        fn elapsed_ms(&self, item_id: &str, _content_index: u32) -> u64 {
            // Only the content already at the head of playback has a nonzero
            // elapsed time; anything else (e.g. a brand new delta arriving
            // while the user talks) has not started playing yet.
            if self.playing.lock().as_ref().is_some_and(|(id, _)| id == item_id) {
                500
            } else {
                0
            }
        }

        fn on_interrupted(&self, _item_id: &str, _content_index: u32) {
            self.interrupted.store(true, Ordering::SeqCst);
            *self.playing.lock() = None;
        }
    }

    fn harness() -> (
        InterruptionCoordinator,
        Arc<FakePlayback>,
        mpsc::UnboundedReceiver<RealtimeClientEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let playback = Arc::new(FakePlayback {
            playing: Mutex::new(Some(("item_1".to_string(), 0))),
            interrupted: AtomicBool::new(false),
        });
        let coordinator = InterruptionCoordinator::new(
            Arc::new(ConfigTracker::new()),
            Arc::new(StateEngine::new()),
            playback.clone(),
            tx,
        );
        (coordinator, playback, rx)
    }

    #[tokio::test]
    async fn speech_started_interrupts_currently_playing_content() {
        let (coordinator, playback, mut rx) = harness();
        let mut meta = EventMeta::new();
        coordinator
            .on_server_event(
                RealtimeServerEvent::InputAudioBufferSpeechStarted {
                    event_id: "e1".to_string(),
                    audio_start_ms: 0,
                    item_id: "item_1".to_string(),
                },
                &mut meta,
            )
            .await
            .unwrap();
        assert!(playback.interrupted.load(Ordering::SeqCst));
        assert!(matches!(rx.recv().await, Some(RealtimeClientEvent::ResponseCancel { .. })));
        assert!(matches!(
            rx.recv().await,
            Some(RealtimeClientEvent::ConversationItemTruncate { .. })
        ));
    }

    #[tokio::test]
    async fn interrupt_runs_at_most_once_per_item() {
        let (coordinator, _playback, mut rx) = harness();
        coordinator.interrupt("item_1".to_string(), 0);
        coordinator.interrupt("item_1".to_string(), 0);
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn audio_delta_during_user_speech_sets_suppression_flag() {
        let (coordinator, _playback, mut rx) = harness();
        coordinator.set_user_talking(true);
        let mut meta = EventMeta::new();
        coordinator
            .on_server_event(
                RealtimeServerEvent::ResponseAudioDelta {
                    event_id: "e1".to_string(),
                    response_id: "r1".to_string(),
                    item_id: "item_2".to_string(),
                    output_index: 0,
                    content_index: 0,
                    delta: String::new(),
                },
                &mut meta,
            )
            .await
            .unwrap();
        assert!(meta.flag("during_user_speech"));
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
    }

    #[tokio::test]
    async fn audio_delta_during_user_speech_with_nonzero_elapsed_is_rejected() {
        let (coordinator, _playback, _rx) = harness();
        coordinator.set_user_talking(true);
        let mut meta = EventMeta::new();
        let err = coordinator
            .on_server_event(
                RealtimeServerEvent::ResponseAudioDelta {
                    event_id: "e1".to_string(),
                    response_id: "r1".to_string(),
                    // item_1 is already at the head of playback in the
                    // harness fixture, so its elapsed time is nonzero.
                    item_id: "item_1".to_string(),
                    output_index: 0,
                    content_index: 0,
                    delta: String::new(),
                },
                &mut meta,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::AriaError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn ordering_assertion_rejects_running_after_audio_player() {
        let (coordinator, _playback, _rx) = harness();
        let mut meta = EventMeta::new();
        meta.touch("audio_player").unwrap();
        let err = coordinator
            .on_server_event(
                RealtimeServerEvent::InputAudioBufferSpeechStopped {
                    event_id: "e1".to_string(),
                    audio_end_ms: 0,
                    item_id: "item_1".to_string(),
                },
                &mut meta,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::AriaError::ProtocolViolation(_)));
    }
}
