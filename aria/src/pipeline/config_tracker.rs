//! Configuration Tracker: the client-side mirror of session config, plus
//! the last known audio formats, which survive the "pending ack" window
//! where the snapshot itself goes null.

use async_trait::async_trait;
use openai_protocol::realtime::{
    AudioFormat, RealtimeClientEvent, RealtimeServerEvent, Session, SessionUpdateConfig,
};
use parking_lot::Mutex;

use crate::error::AriaResult;

use super::{ClientMiddleware, EventMeta, ServerMiddleware};

const NAME: &str = "config_tracker";

#[derive(Default)]
struct State {
    session: Option<Session>,
    audio_format_input: Option<AudioFormat>,
    audio_format_output: Option<AudioFormat>,
}

/// Downstream consumers must treat a `None` snapshot as "ambiguous -- use
/// the last-known format fields", per the tracker's contract.
pub struct ConfigTracker {
    state: Mutex<State>,
}

impl Default for ConfigTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// The last acknowledged session snapshot, or `None` during a pending
    /// `session.update` round trip.
    pub fn session(&self) -> Option<Session> {
        self.state.lock().session.clone()
    }

    pub fn audio_format_input(&self) -> Option<AudioFormat> {
        self.state.lock().audio_format_input
    }

    pub fn audio_format_output(&self) -> Option<AudioFormat> {
        self.state.lock().audio_format_output
    }
}

#[async_trait]
impl ServerMiddleware for ConfigTracker {
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
            let mut state = self.state.lock();
            state.audio_format_input = Some(session.input_audio_format);
            state.audio_format_output = Some(session.output_audio_format);
            state.session = Some(session.clone());
        }
        Ok(Some(event))
    }
}

#[async_trait]
impl ClientMiddleware for ConfigTracker {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn on_client_event(
        &self,
        event: RealtimeClientEvent,
        meta: &mut EventMeta,
    ) -> AriaResult<Option<RealtimeClientEvent>> {
        meta.touch(NAME)?;
        if let RealtimeClientEvent::SessionUpdate { session, .. } = &event {
            let mut state = self.state.lock();
            state.session = None;
            if let SessionUpdateConfig::Realtime(config) = session.as_ref() {
                if let Some(format) = config.input_audio_format {
                    state.audio_format_input = Some(format);
                }
                if let Some(format) = config.output_audio_format {
                    state.audio_format_output = Some(format);
                }
            }
        }
        Ok(Some(event))
    }
}
