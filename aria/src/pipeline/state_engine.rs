//! State Engine: wraps the conversation reconciliation engine as a
//! pipeline stage, and gives the Interruption Coordinator a narrow,
//! lock-guarded window into cell truncation.

use async_trait::async_trait;
use base64::Engine as _;
use bytes::Bytes;
use openai_protocol::realtime::{ConversationItem, RealtimeClientEvent, RealtimeServerEvent};
use parking_lot::Mutex;

use crate::conversation::{ConversationEngine, TruncateInfo};
use crate::error::AriaResult;

use super::{ClientMiddleware, EventMeta, ServerMiddleware};

const NAME: &str = "state_engine";

pub struct StateEngine {
    engine: Mutex<ConversationEngine>,
}

impl Default for StateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateEngine {
    pub fn new() -> Self {
        Self {
            engine: Mutex::new(ConversationEngine::new()),
        }
    }

    /// The item's full accumulated transcript text for the given content
    /// part, used for proportional truncation on interrupt.
    pub fn transcript(&self, item_id: &str, content_index: usize) -> Option<String> {
        let engine = self.engine.lock();
        let cell = engine.group.get(item_id)?;
        match &cell.item {
            ConversationItem::Message { content, .. } => content
                .get(content_index)
                .and_then(|part| part.transcript().map(str::to_owned)),
            _ => None,
        }
    }

    pub fn audio_total_bytes(&self, item_id: &str) -> Option<u64> {
        Some(self.engine.lock().group.get(item_id)?.audio_total_bytes)
    }

    /// Mark a cell's audio content as truncated at `audio_end_ms`, with the
    /// proportional transcript prefix already computed by the caller.
    /// A no-op if the cell is already truncated or no longer present.
    pub fn mark_truncated(
        &self,
        item_id: &str,
        content_index: u32,
        audio_end_ms: u32,
        truncated_transcript: Option<String>,
    ) -> AriaResult<()> {
        let mut engine = self.engine.lock();
        if let Some(cell) = engine.group.get_mut(item_id) {
            if cell.truncate_info.is_none() {
                cell.truncate_info = Some(TruncateInfo {
                    content_index,
                    audio_end_ms,
                    truncated_transcript,
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ServerMiddleware for StateEngine {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn on_server_event(
        &self,
        event: RealtimeServerEvent,
        meta: &mut EventMeta,
    ) -> AriaResult<Option<RealtimeServerEvent>> {
        meta.assert_already("config_tracker")?;
        meta.touch(NAME)?;
        let event_id = event.event_id();

        // Decode the audio payload once here, first in the chain, and cache
        // it for the Audio Player instead of letting it decode the same
        // base64 delta again.
        let decoded_audio = if let RealtimeServerEvent::ResponseAudioDelta { delta, .. } = &event {
            base64::engine::general_purpose::STANDARD
                .decode(delta)
                .ok()
                .map(Bytes::from)
        } else {
            None
        };
        if let Some(bytes) = &decoded_audio {
            meta.cache_decoded_audio(bytes.clone());
        }

        self.engine
            .lock()
            .handle_server_event(&event, event_id, decoded_audio.as_ref())?;
        Ok(Some(event))
    }
}

#[async_trait]
impl ClientMiddleware for StateEngine {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn on_client_event(
        &self,
        mut event: RealtimeClientEvent,
        meta: &mut EventMeta,
    ) -> AriaResult<Option<RealtimeClientEvent>> {
        meta.touch(NAME)?;
        self.engine.lock().handle_outbound(&mut event)?;
        Ok(Some(event))
    }
}
