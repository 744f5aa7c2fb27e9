//! Event Pipeline: ordered middleware chains for server-originated and
//! client-originated events, with per-event metadata and a handler roster
//! for runtime ordering assertions.
//!
//! Modeled on the gateway's stage pipeline (`execute(&mut ctx) -> StageResult`,
//! short-circuit on an early return), generalized from a single linear HTTP
//! request to two independent directions sharing one metadata shape.

mod config_tracker;
mod event_id;
mod interrupt;
mod logging;
mod state_engine;

pub use config_tracker::ConfigTracker;
pub use event_id::EventIdAllocator;
pub use interrupt::{InterruptionCoordinator, PlaybackTracker};
pub use logging::LoggingMiddleware;
pub use state_engine::StateEngine;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use openai_protocol::realtime::{RealtimeClientEvent, RealtimeServerEvent};

use crate::error::{AriaError, AriaResult};

/// Per-event metadata: the handler roster, a small flag bag middlewares use
/// to signal each other (e.g. the Interruption Coordinator's "during user
/// speech" suppression flag for the Audio Player), and a one-shot cache for
/// the decoded bytes of a `response.audio.delta` payload so the State Engine
/// and the Audio Player don't each base64-decode the same delta.
#[derive(Debug, Default)]
pub struct EventMeta {
    roster: Vec<&'static str>,
    flags: HashMap<&'static str, bool>,
    decoded_audio: Option<Bytes>,
}

impl EventMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roster(&self) -> &[&'static str] {
        &self.roster
    }

    /// Record that `middleware` has processed this event. A middleware must
    /// call this exactly once; a second call is a protocol bug.
    pub fn touch(&mut self, middleware: &'static str) -> AriaResult<()> {
        if self.roster.contains(&middleware) {
            return Err(AriaError::ProtocolViolation(format!(
                "middleware {middleware} touched the same event twice"
            )));
        }
        self.roster.push(middleware);
        Ok(())
    }

    /// Assert `middleware` has not yet run, for ordering preconditions like
    /// "the Interruption Coordinator must run before the Audio Player".
    pub fn assert_not_yet(&self, middleware: &'static str) -> AriaResult<()> {
        if self.roster.contains(&middleware) {
            return Err(AriaError::ProtocolViolation(format!(
                "ordering violation: {middleware} already ran"
            )));
        }
        Ok(())
    }

    /// Assert `middleware` has already run, for preconditions like "the
    /// Configuration Tracker must run before the State Engine".
    pub fn assert_already(&self, middleware: &'static str) -> AriaResult<()> {
        if !self.roster.contains(&middleware) {
            return Err(AriaError::ProtocolViolation(format!(
                "ordering violation: {middleware} has not run yet"
            )));
        }
        Ok(())
    }

    pub fn set_flag(&mut self, key: &'static str, value: bool) {
        self.flags.insert(key, value);
    }

    pub fn flag(&self, key: &'static str) -> bool {
        self.flags.get(key).copied().unwrap_or(false)
    }

    /// Cache the base64-decoded bytes of this event's audio payload, for a
    /// later middleware in the same chain to reuse instead of decoding
    /// again.
    pub fn cache_decoded_audio(&mut self, bytes: Bytes) {
        self.decoded_audio = Some(bytes);
    }

    pub fn decoded_audio(&self) -> Option<&Bytes> {
        self.decoded_audio.as_ref()
    }
}

/// Middleware for the server-in chain: every event decoded off the
/// transport passes through each of these, in order, before being
/// discarded.
#[async_trait]
pub trait ServerMiddleware: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returning `Ok(None)` vetoes the event -- later middlewares never see
    /// it. Returning `Ok(Some(event))` continues the chain, possibly with a
    /// transformed event. `Err` is a fatal protocol violation.
    async fn on_server_event(
        &self,
        event: RealtimeServerEvent,
        meta: &mut EventMeta,
    ) -> AriaResult<Option<RealtimeServerEvent>>;
}

/// Middleware for the client-out chain: every event passed to `send` goes
/// through each of these, in order, before being encoded and written to the
/// transport.
#[async_trait]
pub trait ClientMiddleware: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_client_event(
        &self,
        event: RealtimeClientEvent,
        meta: &mut EventMeta,
    ) -> AriaResult<Option<RealtimeClientEvent>>;
}

/// Forwards to the wrapped middleware, letting a single `Arc`-owned
/// instance (e.g. the Audio Player, also held as a `PlaybackTracker`) sit in
/// a pipeline's `Vec<Box<dyn ServerMiddleware>>` without a second copy.
#[async_trait]
impl<T: ServerMiddleware + ?Sized> ServerMiddleware for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn on_server_event(
        &self,
        event: RealtimeServerEvent,
        meta: &mut EventMeta,
    ) -> AriaResult<Option<RealtimeServerEvent>> {
        (**self).on_server_event(event, meta).await
    }
}

#[async_trait]
impl<T: ClientMiddleware + ?Sized> ClientMiddleware for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn on_client_event(
        &self,
        event: RealtimeClientEvent,
        meta: &mut EventMeta,
    ) -> AriaResult<Option<RealtimeClientEvent>> {
        (**self).on_client_event(event, meta).await
    }
}

/// Drives the server-in chain to completion for one event.
pub struct ServerPipeline {
    middlewares: Vec<Box<dyn ServerMiddleware>>,
}

impl ServerPipeline {
    pub fn new(middlewares: Vec<Box<dyn ServerMiddleware>>) -> Self {
        Self { middlewares }
    }

    pub async fn dispatch(&self, mut event: RealtimeServerEvent) -> AriaResult<()> {
        let mut meta = EventMeta::new();
        for mw in &self.middlewares {
            match mw.on_server_event(event, &mut meta).await? {
                Some(next) => event = next,
                None => return Ok(()),
            }
        }
        Ok(())
    }
}

/// Drives the client-out chain, then hands the surviving event to `sink`
/// for encoding and transmission.
pub struct ClientPipeline {
    middlewares: Vec<Box<dyn ClientMiddleware>>,
}

impl ClientPipeline {
    pub fn new(middlewares: Vec<Box<dyn ClientMiddleware>>) -> Self {
        Self { middlewares }
    }

    /// Run `event` through every middleware, returning the final event
    /// unless one of them vetoed it.
    pub async fn send(&self, mut event: RealtimeClientEvent) -> AriaResult<Option<RealtimeClientEvent>> {
        let mut meta = EventMeta::new();
        for mw in &self.middlewares {
            match mw.on_client_event(event, &mut meta).await? {
                Some(next) => event = next,
                None => return Ok(None),
            }
        }
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(&'static str, Vec<std::sync::Arc<std::sync::Mutex<Vec<&'static str>>>>);

    #[async_trait]
    impl ServerMiddleware for Recorder {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn on_server_event(
            &self,
            event: RealtimeServerEvent,
            meta: &mut EventMeta,
        ) -> AriaResult<Option<RealtimeServerEvent>> {
            meta.touch(self.0)?;
            for log in &self.1 {
                log.lock().unwrap().push(self.0);
            }
            Ok(Some(event))
        }
    }

    #[tokio::test]
    async fn server_chain_runs_in_registered_order() {
        let log = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let pipeline = ServerPipeline::new(vec![
            Box::new(Recorder("a", vec![log.clone()])),
            Box::new(Recorder("b", vec![log.clone()])),
        ]);
        pipeline
            .dispatch(RealtimeServerEvent::InputAudioBufferCleared {
                event_id: "e1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    struct Vetoer;

    #[async_trait]
    impl ServerMiddleware for Vetoer {
        fn name(&self) -> &'static str {
            "vetoer"
        }

        async fn on_server_event(
            &self,
            _event: RealtimeServerEvent,
            meta: &mut EventMeta,
        ) -> AriaResult<Option<RealtimeServerEvent>> {
            meta.touch(self.name())?;
            Ok(None)
        }
    }

    struct Unreachable;

    #[async_trait]
    impl ServerMiddleware for Unreachable {
        fn name(&self) -> &'static str {
            "unreachable"
        }

        async fn on_server_event(
            &self,
            _event: RealtimeServerEvent,
            _meta: &mut EventMeta,
        ) -> AriaResult<Option<RealtimeServerEvent>> {
            panic!("vetoed event reached a downstream middleware");
        }
    }

    #[tokio::test]
    async fn veto_short_circuits_the_chain() {
        let pipeline = ServerPipeline::new(vec![Box::new(Vetoer), Box::new(Unreachable)]);
        pipeline
            .dispatch(RealtimeServerEvent::InputAudioBufferCleared {
                event_id: "e1".to_string(),
            })
            .await
            .unwrap();
    }

    #[test]
    fn double_touch_is_rejected() {
        let mut meta = EventMeta::new();
        meta.touch("x").unwrap();
        let err = meta.touch("x").unwrap_err();
        assert!(matches!(err, AriaError::ProtocolViolation(_)));
    }

    #[test]
    fn ordering_assertions() {
        let mut meta = EventMeta::new();
        meta.assert_not_yet("audio_player").unwrap();
        meta.touch("interrupt").unwrap();
        meta.assert_already("interrupt").unwrap();
        meta.assert_not_yet("audio_player").unwrap();
        meta.touch("audio_player").unwrap();
        assert!(meta.assert_not_yet("audio_player").is_err());
    }
}
