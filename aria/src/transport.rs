//! The message-oriented bidirectional channel the event pipeline rides on:
//! one JSON-encoded event per message. Orderly close and error close are
//! signaled distinctly so the receiver loop can exit silently on the
//! former.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use openai_protocol::realtime::{RealtimeClientEvent, RealtimeServerEvent};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{AriaError, AriaResult};

/// What a `recv` call observed.
pub enum RecvOutcome {
    Event(RealtimeServerEvent),
    /// The transport closed normally; the receiver loop should exit without
    /// treating this as an error.
    Closed,
}

#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, event: RealtimeClientEvent) -> AriaResult<()>;
    async fn recv(&mut self) -> AriaResult<RecvOutcome>;
}

pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl WebSocketTransport {
    pub async fn connect(url: &str) -> AriaResult<Self> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(AriaError::Transport)?;
        Ok(Self { stream })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, event: RealtimeClientEvent) -> AriaResult<()> {
        let text = serde_json::to_string(&event)
            .map_err(|e| AriaError::ProtocolViolation(format!("failed to encode client event: {e}")))?;
        match self.stream.send(Message::Text(text.into())).await {
            Ok(()) => Ok(()),
            Err(e) if is_normal_close(&e) => Ok(()),
            Err(e) => Err(AriaError::Transport(e)),
        }
    }

    async fn recv(&mut self) -> AriaResult<RecvOutcome> {
        loop {
            match self.stream.next().await {
                None => return Ok(RecvOutcome::Closed),
                Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                    Ok(event) => return Ok(RecvOutcome::Event(event)),
                    Err(e) => {
                        tracing::warn!("dropping malformed server frame: {e}");
                        continue;
                    }
                },
                Some(Ok(Message::Close(_))) => return Ok(RecvOutcome::Closed),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {
                    continue;
                }
                Some(Err(e)) if is_normal_close(&e) => return Ok(RecvOutcome::Closed),
                Some(Err(e)) => return Err(AriaError::Transport(e)),
            }
        }
    }
}

fn is_normal_close(err: &tokio_tungstenite::tungstenite::Error) -> bool {
    matches!(
        err,
        tokio_tungstenite::tungstenite::Error::ConnectionClosed
            | tokio_tungstenite::tungstenite::Error::AlreadyClosed
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_close_variants_are_recognized() {
        assert!(is_normal_close(&tokio_tungstenite::tungstenite::Error::ConnectionClosed));
        assert!(is_normal_close(&tokio_tungstenite::tungstenite::Error::AlreadyClosed));
        assert!(!is_normal_close(&tokio_tungstenite::tungstenite::Error::Utf8));
    }
}
