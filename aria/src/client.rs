//! Top-level wiring: builds the server-in and client-out pipelines in the
//! order the rest of this crate assumes, owns the transport and the
//! scheduler, and drives both from one task so the transport is never
//! touched from two places at once.

use std::path::PathBuf;
use std::sync::Arc;

use openai_protocol::realtime::RealtimeClientEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::audio::backend::AudioBackend;
#[cfg(feature = "cpal-backend")]
use crate::audio::backend::CpalBackend;
use crate::audio::{AudioPlayer, MicStreamer, PagingRequest};
use crate::error::{AriaError, AriaResult};
use crate::pipeline::{
    ClientPipeline, ConfigTracker, EventIdAllocator, InterruptionCoordinator, LoggingMiddleware,
    ServerPipeline, StateEngine,
};
use crate::scheduler::Scheduler;
use crate::transport::{RecvOutcome, Transport, WebSocketTransport};

/// Knobs for [`Client::connect`]. The device backend defaults to
/// [`CpalBackend`] when the `cpal-backend` feature is enabled (the crate
/// default); headless builds must supply one.
pub struct ClientConfig {
    pub output_paging: PagingRequest,
    pub recording_path: Option<PathBuf>,
    pub backend: Option<Arc<dyn AudioBackend>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            output_paging: PagingRequest::target_latency(20.0),
            recording_path: None,
            #[cfg(feature = "cpal-backend")]
            backend: Some(Arc::new(CpalBackend::new())),
            #[cfg(not(feature = "cpal-backend"))]
            backend: None,
        }
    }
}

/// A live realtime session. Dropping it stops the driver task but leaves
/// the mic device open -- call [`Client::shutdown`] for a clean exit.
pub struct Client {
    outbound: mpsc::UnboundedSender<RealtimeClientEvent>,
    mic: Arc<MicStreamer>,
    driver: JoinHandle<AriaResult<()>>,
    _scheduler: JoinHandle<()>,
}

impl Client {
    pub async fn connect(url: &str, config: ClientConfig) -> AriaResult<Self> {
        let transport = WebSocketTransport::connect(url).await?;
        Self::start(Box::new(transport), config)
    }

    /// Build the pipelines and spawn the driver against an already-open
    /// transport. Split out from `connect` so it can be exercised against a
    /// fake transport.
    fn start(transport: Box<dyn Transport>, config: ClientConfig) -> AriaResult<Self> {
        let backend = config.backend.ok_or_else(|| {
            AriaError::AudioDevice(
                "no AudioBackend supplied and the cpal-backend feature is disabled".to_string(),
            )
        })?;

        let (scheduler_handle, scheduler) = Scheduler::new();
        let scheduler_task = tokio::spawn(scheduler.run());

        let config_tracker = Arc::new(ConfigTracker::new());
        let state_engine = Arc::new(StateEngine::new());
        let audio_player = Arc::new(AudioPlayer::new(
            backend.clone(),
            scheduler_handle,
            config.output_paging,
        ));

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<RealtimeClientEvent>();

        let interrupt = Arc::new(InterruptionCoordinator::new(
            config_tracker.clone(),
            state_engine.clone(),
            audio_player.clone(),
            outbound_tx.clone(),
        ));
        let mic = Arc::new(MicStreamer::new(
            backend,
            outbound_tx.clone(),
            config.recording_path,
        ));

        // Server-in order: Configuration Tracker, then State Engine (which
        // asserts the tracker already ran), then Interruption (which must
        // run before the Audio Player sees the same event), then the two
        // device-facing middlewares, then Logging last so it sees the final
        // event shape.
        let server_pipeline = Arc::new(ServerPipeline::new(vec![
            Box::new(config_tracker.clone()),
            Box::new(state_engine.clone()),
            Box::new(interrupt),
            Box::new(audio_player),
            Box::new(mic.clone()),
            Box::new(LoggingMiddleware::new()),
        ]));

        let client_pipeline = Arc::new(ClientPipeline::new(vec![
            Box::new(EventIdAllocator::new()),
            Box::new(config_tracker),
            Box::new(state_engine),
            Box::new(LoggingMiddleware::new()),
        ]));

        let driver = tokio::spawn(run_driver(transport, server_pipeline, client_pipeline, outbound_rx));

        Ok(Self {
            outbound: outbound_tx,
            mic,
            driver,
            _scheduler: scheduler_task,
        })
    }

    /// Queue an outbound event. It runs through the client-out chain on the
    /// driver task, same as events the Interruption Coordinator and the
    /// Microphone Streamer emit.
    pub fn send(&self, event: RealtimeClientEvent) -> AriaResult<()> {
        self.outbound
            .send(event)
            .map_err(|_| AriaError::ConnectionClosed("client driver has already exited".to_string()))
    }

    /// Close the mic device, stop accepting new outbound events, and wait
    /// for the driver to drain and exit.
    pub async fn shutdown(self) -> AriaResult<()> {
        self.mic.shutdown();
        drop(self.outbound);
        self.driver
            .await
            .map_err(|e| AriaError::ConnectionClosed(format!("driver task panicked: {e}")))?
    }
}

async fn run_driver(
    mut transport: Box<dyn Transport>,
    server_pipeline: Arc<ServerPipeline>,
    client_pipeline: Arc<ClientPipeline>,
    mut outbound_rx: mpsc::UnboundedReceiver<RealtimeClientEvent>,
) -> AriaResult<()> {
    loop {
        tokio::select! {
            recv = transport.recv() => {
                match recv? {
                    RecvOutcome::Event(event) => server_pipeline.dispatch(event).await?,
                    RecvOutcome::Closed => return Ok(()),
                }
            }
            outgoing = outbound_rx.recv() => {
                match outgoing {
                    Some(event) => {
                        if let Some(event) = client_pipeline.send(event).await? {
                            transport.send(event).await?;
                        }
                    }
                    None => return Ok(()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::FakeBackend;
    use openai_protocol::realtime::{Modality, Session, ToolChoice, Voice};
    use std::sync::Mutex;
    use tokio::sync::mpsc as tmpsc;

    /// One scripted inbound frame: either raw JSON text to decode (mirroring
    /// what a real socket hands the transport) or an explicit close.
    enum ScriptedFrame {
        Json(String),
        Closed,
    }

    /// An in-memory transport for driver tests: `recv` decodes a scripted
    /// queue of raw frames the same way [`WebSocketTransport`] decodes wire
    /// text, so a malformed frame exercises the same skip-and-continue path.
    /// `send` records what it was asked to send.
    struct ScriptedTransport {
        incoming: tmpsc::UnboundedReceiver<ScriptedFrame>,
        sent: Arc<Mutex<Vec<RealtimeClientEvent>>>,
    }

    #[async_trait::async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, event: RealtimeClientEvent) -> AriaResult<()> {
            self.sent.lock().unwrap().push(event);
            Ok(())
        }

        async fn recv(&mut self) -> AriaResult<RecvOutcome> {
            loop {
                match self.incoming.recv().await {
                    None | Some(ScriptedFrame::Closed) => return Ok(RecvOutcome::Closed),
                    Some(ScriptedFrame::Json(text)) => match serde_json::from_str(&text) {
                        Ok(event) => return Ok(RecvOutcome::Event(event)),
                        Err(e) => {
                            tracing::warn!("dropping malformed scripted frame: {e}");
                            continue;
                        }
                    },
                }
            }
        }
    }

    fn fixture_session() -> Session {
        Session {
            id: "sess_1".to_string(),
            object: "realtime.session".to_string(),
            model: "gpt-4o-realtime".to_string(),
            expires_at: 0,
            modalities: vec![Modality::Audio],
            instructions: String::new(),
            voice: Voice::Alloy,
            input_audio_format: openai_protocol::realtime::AudioFormat::Pcm16,
            output_audio_format: openai_protocol::realtime::AudioFormat::Pcm16,
            input_audio_transcription: None,
            turn_detection: None,
            tools: vec![],
            tool_choice: ToolChoice::auto(),
            temperature: 0.8,
            max_response_output_tokens: Default::default(),
        }
    }

    #[tokio::test]
    async fn caller_send_reaches_the_transport() {
        let (incoming_tx, incoming_rx) = tmpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transport = ScriptedTransport {
            incoming: incoming_rx,
            sent: sent.clone(),
        };

        let client = Client::start(
            Box::new(transport),
            ClientConfig {
                output_paging: PagingRequest::target_latency(20.0),
                recording_path: None,
                backend: Some(Arc::new(FakeBackend)),
            },
        )
        .unwrap();

        client.send(RealtimeClientEvent::response_create()).unwrap();
        drop(incoming_tx);
        client.shutdown().await.unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], RealtimeClientEvent::ResponseCreate { .. }));
        assert!(sent[0].event_id().is_some());
    }

    fn session_created_frame() -> String {
        serde_json::to_string(&openai_protocol::realtime::RealtimeServerEvent::SessionCreated {
            event_id: "evt_1".to_string(),
            session: fixture_session(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn server_session_created_is_dispatched_without_error() {
        let (incoming_tx, incoming_rx) = tmpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transport = ScriptedTransport {
            incoming: incoming_rx,
            sent,
        };

        let client = Client::start(
            Box::new(transport),
            ClientConfig {
                output_paging: PagingRequest::target_latency(20.0),
                recording_path: None,
                backend: Some(Arc::new(FakeBackend)),
            },
        )
        .unwrap();

        incoming_tx.send(ScriptedFrame::Json(session_created_frame())).unwrap();

        drop(incoming_tx);
        client.shutdown().await.unwrap();
    }

    /// A malformed frame must be logged and skipped, not torn the driver
    /// down -- the well-formed frame right behind it still gets dispatched.
    #[tokio::test]
    async fn malformed_frame_is_skipped_without_tearing_down_the_driver() {
        let (incoming_tx, incoming_rx) = tmpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transport = ScriptedTransport {
            incoming: incoming_rx,
            sent,
        };

        let client = Client::start(
            Box::new(transport),
            ClientConfig {
                output_paging: PagingRequest::target_latency(20.0),
                recording_path: None,
                backend: Some(Arc::new(FakeBackend)),
            },
        )
        .unwrap();

        incoming_tx
            .send(ScriptedFrame::Json("{ not valid json".to_string()))
            .unwrap();
        incoming_tx.send(ScriptedFrame::Json(session_created_frame())).unwrap();

        drop(incoming_tx);
        // If the malformed frame had torn the driver down, this `unwrap`
        // would fail on the error the driver exited with.
        client.shutdown().await.unwrap();
    }
}
