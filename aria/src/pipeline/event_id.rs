//! Event ID Allocator: assigns `client-<00000>-auto` event ids to outbound
//! events that don't already carry one.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use openai_protocol::realtime::RealtimeClientEvent;

use crate::error::AriaResult;

use super::{ClientMiddleware, EventMeta};

const NAME: &str = "event_id";

pub struct EventIdAllocator {
    next: AtomicU32,
}

impl Default for EventIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl EventIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(0),
        }
    }

    fn allocate(&self) -> String {
        let serial = self.next.fetch_add(1, Ordering::Relaxed);
        format!("client-{serial:05}-auto")
    }
}

#[async_trait]
impl ClientMiddleware for EventIdAllocator {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn on_client_event(
        &self,
        mut event: RealtimeClientEvent,
        meta: &mut EventMeta,
    ) -> AriaResult<Option<RealtimeClientEvent>> {
        meta.touch(NAME)?;
        if event.event_id().is_none() {
            event = event.with_event_id(self.allocate());
        }
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fills_missing_id_with_zero_padded_serial() {
        let allocator = EventIdAllocator::new();
        let mut meta = EventMeta::new();
        let event = allocator
            .on_client_event(RealtimeClientEvent::response_create(), &mut meta)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_id(), Some("client-00000-auto"));

        let mut meta = EventMeta::new();
        let event = allocator
            .on_client_event(RealtimeClientEvent::response_create(), &mut meta)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_id(), Some("client-00001-auto"));
    }

    #[tokio::test]
    async fn leaves_existing_id_untouched() {
        let allocator = EventIdAllocator::new();
        let mut meta = EventMeta::new();
        let event = allocator
            .on_client_event(
                RealtimeClientEvent::response_create().with_event_id("evt_custom"),
                &mut meta,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_id(), Some("evt_custom"));
    }
}
