//! Logging Middleware: a pure observer. Never mutates an event; routes
//! known-benign server errors to `info`, other errors to `warning`, and
//! everything else to `debug`. Audio payloads are elided before rendering.

use async_trait::async_trait;
use openai_protocol::realtime::{RealtimeClientEvent, RealtimeServerEvent};

use crate::error::AriaResult;

use super::{ClientMiddleware, EventMeta, ServerMiddleware};

const NAME: &str = "logging";

/// Server error codes that are expected races, not failures.
const BENIGN_ERROR_CODES: &[&str] = &["response_cancel_not_active"];

type ServerFilter = Box<dyn Fn(&RealtimeServerEvent) -> bool + Send + Sync>;
type ClientFilter = Box<dyn Fn(&RealtimeClientEvent) -> bool + Send + Sync>;

#[derive(Default)]
pub struct LoggingMiddleware {
    filter_server: Option<ServerFilter>,
    filter_client: Option<ClientFilter>,
}

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server_filter(mut self, filter: impl Fn(&RealtimeServerEvent) -> bool + Send + Sync + 'static) -> Self {
        self.filter_server = Some(Box::new(filter));
        self
    }

    pub fn with_client_filter(mut self, filter: impl Fn(&RealtimeClientEvent) -> bool + Send + Sync + 'static) -> Self {
        self.filter_client = Some(Box::new(filter));
        self
    }
}

/// `true` for server error events with a known-benign code, e.g. the
/// `response.cancel` race against an already-finished response.
pub fn unexpected_error_only(event: &RealtimeServerEvent) -> bool {
    matches!(event.as_error(), Some(err) if !BENIGN_ERROR_CODES.contains(&err.code.as_deref().unwrap_or("")))
}

#[async_trait]
impl ServerMiddleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn on_server_event(
        &self,
        event: RealtimeServerEvent,
        meta: &mut EventMeta,
    ) -> AriaResult<Option<RealtimeServerEvent>> {
        meta.touch(NAME)?;
        let passes = self.filter_server.as_ref().map(|f| f(&event)).unwrap_or(true);
        if passes {
            let rendered = render_server_event(&event);
            if let Some(err) = event.as_error() {
                if BENIGN_ERROR_CODES.contains(&err.code.as_deref().unwrap_or("")) {
                    tracing::info!(roster = ?meta.roster(), "server: {rendered}");
                } else {
                    tracing::warn!(roster = ?meta.roster(), "server: {rendered}");
                }
            } else {
                tracing::debug!(roster = ?meta.roster(), "server: {rendered}");
            }
        }
        Ok(Some(event))
    }
}

#[async_trait]
impl ClientMiddleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn on_client_event(
        &self,
        event: RealtimeClientEvent,
        meta: &mut EventMeta,
    ) -> AriaResult<Option<RealtimeClientEvent>> {
        meta.touch(NAME)?;
        let passes = self.filter_client.as_ref().map(|f| f(&event)).unwrap_or(true);
        if passes {
            let rendered = render_client_event(&event);
            tracing::debug!(roster = ?meta.roster(), "client: {rendered}");
        }
        Ok(Some(event))
    }
}

fn render_server_event(event: &RealtimeServerEvent) -> String {
    render_elided(event)
}

fn render_client_event(event: &RealtimeClientEvent) -> String {
    render_elided(event)
}

fn render_elided(event: &impl serde::Serialize) -> String {
    match serde_json::to_value(event) {
        Ok(mut value) => {
            elide_audio(&mut value);
            value.to_string()
        }
        Err(e) => format!("<unrenderable event: {e}>"),
    }
}

/// Walk the serialized event and replace audio payload strings with
/// `"<omitted N bytes>"`, keyed off each object's own `type` tag so that a
/// text `delta` field (unrelated to audio) is left alone.
fn elide_audio(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            let type_tag = map.get("type").and_then(|v| v.as_str()).map(str::to_string);
            let audio_field = match type_tag.as_deref() {
                Some("input_audio") | Some("output_audio") | Some("input_audio_buffer.append") => {
                    Some("audio")
                }
                Some("response.audio.delta") => Some("delta"),
                _ => None,
            };
            if let Some(field) = audio_field {
                if let Some(v) = map.get_mut(field) {
                    elide_leaf(v);
                }
            }
            for v in map.values_mut() {
                elide_audio(v);
            }
        }
        serde_json::Value::Array(items) => {
            for v in items.iter_mut() {
                elide_audio(v);
            }
        }
        _ => {}
    }
}

fn elide_leaf(value: &mut serde_json::Value) {
    if let serde_json::Value::String(s) = value {
        use base64::Engine as _;
        let n_bytes = base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map(|b| b.len())
            .unwrap_or(s.len());
        *value = serde_json::Value::String(format!("<omitted {n_bytes} bytes>"));
    }
}
