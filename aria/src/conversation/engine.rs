//! Conversation State Engine ("Impatience").
//!
//! Reconciles the three sources an item can enter the conversation from --
//! a local speculative create, a response output item bound to no
//! conversation (out-of-band), or one bound to this conversation (dangling,
//! awaiting the paired `conversation.item.added`) -- against the
//! authoritative `conversation.item.added` the server eventually sends, and
//! applies every subsequent streaming delta to the addressed cell.

use std::collections::{HashMap, HashSet};

use base64::Engine as _;
use openai_protocol::realtime::{
    ContentPart, ConversationItem, RealtimeClientEvent, RealtimeServerEvent, Response,
};

use crate::error::{AriaError, AriaResult};

use super::group::{ConversationCell, ConversationGroup, TruncateInfo};

/// Length a locally generated item id is truncated to, matching the
/// `client-set-<hex>` wire convention.
const ITEM_ID_MAX_LEN: usize = 31;

pub struct ConversationEngine {
    pub group: ConversationGroup,
    /// Local creates, keyed by the id we assigned, awaiting the server's
    /// `conversation.item.added` confirmation.
    awaiting_server_confirmation: HashMap<String, ConversationItem>,
    /// Response output items bound to this conversation, keyed by item id,
    /// dangling until the paired `conversation.item.added` arrives.
    awaiting_main_sequence: HashMap<String, (String, ConversationItem)>,
    responses: HashMap<String, Response>,
    seen_response_ids: HashSet<String>,
}

impl Default for ConversationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationEngine {
    pub fn new() -> Self {
        Self {
            group: ConversationGroup::new(),
            awaiting_server_confirmation: HashMap::new(),
            awaiting_main_sequence: HashMap::new(),
            responses: HashMap::new(),
            seen_response_ids: HashSet::new(),
        }
    }

    pub fn response(&self, response_id: &str) -> Option<&Response> {
        self.responses.get(response_id)
    }

    /// Rewrite an outbound `conversation.item.create` in place: fill a
    /// generated id and default `previous_item_id` if absent, then
    /// immediately insert the item into the main sequence as a speculative
    /// local create.
    pub fn handle_outbound(&mut self, event: &mut RealtimeClientEvent) -> AriaResult<()> {
        if let RealtimeClientEvent::ConversationItemCreate {
            previous_item_id,
            item,
            ..
        } = event
        {
            let id = item
                .id()
                .map(str::to_owned)
                .unwrap_or_else(generate_item_id);
            set_item_id(item, id.clone());

            if previous_item_id.is_none() {
                *previous_item_id = self.group.last_main_item_id().map(str::to_owned);
            }

            let mut cell = ConversationCell::new(id.clone(), item.clone());
            cell.touch(None);
            self.group
                .insert_main(cell, previous_item_id.as_deref())?;
            self.awaiting_server_confirmation.insert(id, item.clone());
        }
        Ok(())
    }

    /// Apply a server event's effect on conversation state. `event_id` is
    /// the event's own id (or `None` for events without one), recorded on
    /// the touch list of whichever cell it names. `decoded_audio`, if
    /// supplied, is the already-base64-decoded payload of a
    /// `response.audio.delta` event -- passing it avoids decoding the same
    /// delta a second time when a pipeline stage upstream already did.
    pub fn handle_server_event(
        &mut self,
        event: &RealtimeServerEvent,
        event_id: Option<&str>,
        decoded_audio: Option<&bytes::Bytes>,
    ) -> AriaResult<()> {
        let touch = event_id.map(str::to_owned);
        match event {
            RealtimeServerEvent::ConversationItemCreated { .. } => {
                Err(AriaError::ProtocolViolation(
                    "received conversation.item.created (beta API signature); \
                     this session expects conversation.item.added / .done"
                        .to_string(),
                ))
            }

            RealtimeServerEvent::ResponseCreated { response, .. } => {
                self.record_response(response)
            }
            RealtimeServerEvent::ResponseDone { response, .. } => {
                self.responses.insert(response.id.clone(), response.clone());
                Ok(())
            }

            RealtimeServerEvent::ResponseOutputItemAdded {
                response_id, item, ..
            } => self.handle_response_output_item_added(response_id, item),

            RealtimeServerEvent::ConversationItemAdded {
                previous_item_id,
                item,
                ..
            } => self.handle_item_added(normalize_previous_item_id(previous_item_id.as_deref()), item, touch),

            RealtimeServerEvent::ConversationItemDone { item, .. } => {
                let item_id = item.id().ok_or_else(|| {
                    AriaError::ProtocolViolation("conversation.item.done item has no id".into())
                })?;
                if let Some(cell) = self.group.get_mut(item_id) {
                    cell.item = item.clone();
                    cell.touch(touch);
                }
                Ok(())
            }

            RealtimeServerEvent::ConversationItemInputAudioTranscriptionCompleted {
                item_id,
                content_index,
                transcript,
                ..
            } => self.with_content_part_mut(item_id, *content_index, touch, |part| {
                if let ContentPart::InputAudio { transcript: t, .. } = part {
                    *t = transcript.clone();
                }
            }),

            RealtimeServerEvent::ConversationItemInputAudioTranscriptionFailed {
                item_id,
                content_index,
                error,
                ..
            } => self.with_content_part_mut(item_id, *content_index, touch, |part| {
                if let ContentPart::InputAudio { transcript: t, .. } = part {
                    *t = format!("<transcription failed: {}>", error.message);
                }
            }),

            RealtimeServerEvent::ConversationItemTruncated {
                item_id,
                content_index,
                audio_end_ms,
                ..
            } => {
                if let Some(cell) = self.group.get_mut(item_id) {
                    if cell.truncate_info.is_none() {
                        cell.truncate_info = Some(TruncateInfo {
                            content_index: *content_index,
                            audio_end_ms: *audio_end_ms,
                            truncated_transcript: None,
                        });
                    }
                    cell.touch(touch);
                }
                Ok(())
            }

            RealtimeServerEvent::ConversationItemDeleted { item_id, .. } => {
                if let Some(cell) = self.group.get_mut(item_id) {
                    cell.touch(touch);
                }
                self.group.trash_item(item_id)
            }

            RealtimeServerEvent::ResponseTextDelta {
                item_id,
                content_index,
                delta,
                ..
            } => self.with_content_part_mut(item_id, *content_index, touch, |part| {
                if let ContentPart::OutputText { text } = part {
                    text.push_str(delta);
                }
            }),

            RealtimeServerEvent::ResponseAudioTranscriptDelta {
                item_id,
                content_index,
                delta,
                ..
            } => self.with_content_part_mut(item_id, *content_index, touch, |part| {
                if let ContentPart::OutputAudio { transcript, .. } = part {
                    transcript.push_str(delta);
                }
            }),

            RealtimeServerEvent::ResponseAudioDelta {
                item_id,
                delta,
                ..
            } => {
                let n_bytes = match decoded_audio {
                    Some(bytes) => bytes.len() as u64,
                    None => base64::engine::general_purpose::STANDARD
                        .decode(delta)
                        .map(|b| b.len() as u64)
                        .unwrap_or(0),
                };
                if let Some(cell) = self.group.get_mut(item_id) {
                    cell.audio_total_bytes += n_bytes;
                    cell.touch(touch);
                }
                Ok(())
            }

            RealtimeServerEvent::ResponseContentPartAdded {
                item_id,
                content_index,
                part,
                ..
            } => {
                if let Some(cell) = self.group.get_mut(item_id) {
                    if let ConversationItem::Message { content, .. } = &mut cell.item {
                        let idx = *content_index as usize;
                        if idx == content.len() {
                            content.push(part.clone());
                        } else if idx < content.len() {
                            content[idx] = part.clone();
                        }
                    }
                    cell.touch(touch);
                }
                Ok(())
            }

            RealtimeServerEvent::ResponseContentPartDone {
                item_id,
                content_index,
                ..
            } => {
                if let Some(cell) = self.group.get_mut(item_id) {
                    if let ConversationItem::Message { content, .. } = &cell.item {
                        if (*content_index as usize) >= content.len() {
                            return Err(AriaError::ProtocolViolation(format!(
                                "response.content_part.done for {item_id}[{content_index}] with no such content part"
                            )));
                        }
                    }
                    cell.touch(touch);
                }
                Ok(())
            }

            _ => Ok(()),
        }
    }

    fn record_response(&mut self, response: &Response) -> AriaResult<()> {
        if !self.seen_response_ids.insert(response.id.clone()) {
            return Err(AriaError::ProtocolViolation(format!(
                "duplicate response id {}",
                response.id
            )));
        }
        self.responses.insert(response.id.clone(), response.clone());
        Ok(())
    }

    fn handle_response_output_item_added(
        &mut self,
        response_id: &str,
        item: &ConversationItem,
    ) -> AriaResult<()> {
        let item_id = item
            .id()
            .ok_or_else(|| {
                AriaError::ProtocolViolation("response output item has no id".to_string())
            })?
            .to_string();
        let bound = self
            .responses
            .get(response_id)
            .and_then(|r| r.conversation_id.clone());

        match bound {
            None => {
                let mut cell = ConversationCell::new(item_id, item.clone());
                cell.response_id = Some(response_id.to_string());
                self.group.insert_out_of_band(cell)
            }
            Some(_conversation_id) => {
                self.awaiting_main_sequence
                    .insert(item_id, (response_id.to_string(), item.clone()));
                Ok(())
            }
        }
    }

    fn handle_item_added(
        &mut self,
        previous_item_id: Option<String>,
        item: &ConversationItem,
        touch: Option<String>,
    ) -> AriaResult<()> {
        let item_id = item
            .id()
            .ok_or_else(|| AriaError::ProtocolViolation("conversation.item.added has no id".into()))?
            .to_string();

        let locally_pending = self.awaiting_server_confirmation.remove(&item_id);
        let response_pending = self.awaiting_main_sequence.remove(&item_id);

        match (locally_pending, response_pending) {
            (Some(_), Some(_)) => Err(AriaError::ProtocolViolation(format!(
                "item {item_id} is pending both as a local speculative create and a \
                 response-originated dangling item; the two sets must be mutually exclusive"
            ))),
            (Some(local_item), None) => {
                if !items_equal_ignoring_status(&local_item, item) {
                    return Err(AriaError::ProtocolViolation(format!(
                        "server confirmation for {item_id} does not match the locally created item"
                    )));
                }
                // the cell is already in the main sequence from the speculative
                // insert; move it to the server-specified position.
                self.group
                    .reposition_main(&item_id, previous_item_id.as_deref())?;
                if let Some(cell) = self.group.get_mut(&item_id) {
                    cell.item = item.clone();
                    cell.touch(touch);
                }
                Ok(())
            }
            (None, Some((response_id, dangling_item))) => {
                if !items_equal_ignoring_status(&dangling_item, item) {
                    return Err(AriaError::ProtocolViolation(format!(
                        "server-confirmed item {item_id} does not match the response output item"
                    )));
                }
                let mut cell = ConversationCell::new(item_id.clone(), item.clone());
                cell.response_id = Some(response_id);
                cell.touch(touch);
                self.group.insert_main(cell, previous_item_id.as_deref())
            }
            (None, None) => {
                let mut cell = ConversationCell::new(item_id, item.clone());
                cell.touch(touch);
                self.group.insert_main(cell, previous_item_id.as_deref())
            }
        }
    }

    fn with_content_part_mut(
        &mut self,
        item_id: &str,
        content_index: u32,
        touch: Option<String>,
        f: impl FnOnce(&mut ContentPart),
    ) -> AriaResult<()> {
        let cell = self.group.get_mut(item_id);
        if let Some(cell) = cell {
            if let ConversationItem::Message { content, .. } = &mut cell.item {
                if let Some(part) = content.get_mut(content_index as usize) {
                    f(part);
                }
            }
            cell.touch(touch);
        }
        Ok(())
    }
}

fn items_equal_ignoring_status(a: &ConversationItem, b: &ConversationItem) -> bool {
    let mut a = a.clone();
    let mut b = b.clone();
    clear_status(&mut a);
    clear_status(&mut b);
    a == b
}

fn clear_status(item: &mut ConversationItem) {
    match item {
        ConversationItem::Message { status, .. }
        | ConversationItem::FunctionCall { status, .. }
        | ConversationItem::FunctionCallOutput { status, .. } => *status = None,
        _ => {}
    }
}

fn set_item_id(item: &mut ConversationItem, id: String) {
    match item {
        ConversationItem::Message { id: slot, .. }
        | ConversationItem::FunctionCall { id: slot, .. }
        | ConversationItem::FunctionCallOutput { id: slot, .. }
        | ConversationItem::McpListTools { id: slot, .. }
        | ConversationItem::McpCall { id: slot, .. }
        | ConversationItem::McpApprovalResponse { id: slot, .. } => *slot = Some(id),
        ConversationItem::McpApprovalRequest { id: slot, .. } => *slot = id,
        ConversationItem::Unknown => {}
    }
}

/// A wire `previous_item_id` of `""` denotes [`ROOT`](super::ROOT).
pub fn normalize_previous_item_id(raw: Option<&str>) -> Option<String> {
    raw.filter(|s| !s.is_empty()).map(str::to_owned)
}

fn generate_item_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    let id = format!("client-set-{hex}");
    id.chars().take(ITEM_ID_MAX_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use openai_protocol::realtime::{ContentPart, ItemStatus, Role};

    fn item_with_id(id: &str) -> ConversationItem {
        let mut item = ConversationItem::user_text("hi");
        set_item_id(&mut item, id.to_string());
        item
    }

    #[test]
    fn outbound_create_gets_generated_id_and_speculative_insert() {
        let mut engine = ConversationEngine::new();
        let mut event = RealtimeClientEvent::item_create(ConversationItem::user_text("hello"));
        engine.handle_outbound(&mut event).unwrap();
        let RealtimeClientEvent::ConversationItemCreate { item, .. } = &event else {
            panic!("wrong variant")
        };
        let id = item.id().unwrap().to_string();
        assert!(id.starts_with("client-set-"));
        assert!(id.len() <= ITEM_ID_MAX_LEN);
        assert_eq!(engine.group.main_sequence().len(), 1);
    }

    #[test]
    fn local_speculative_reconciled_on_item_added() {
        let mut engine = ConversationEngine::new();
        let mut a = RealtimeClientEvent::item_create(ConversationItem::user_text("a"));
        engine.handle_outbound(&mut a).unwrap();
        let RealtimeClientEvent::ConversationItemCreate { item: a_item, .. } = &a else {
            unreachable!()
        };
        let a_id = a_item.id().unwrap().to_string();

        let mut b = RealtimeClientEvent::item_create(ConversationItem::user_text("b"));
        engine.handle_outbound(&mut b).unwrap();

        // server confirms A with status added
        let mut confirmed = a_item.clone();
        if let ConversationItem::Message { status, .. } = &mut confirmed {
            *status = Some(ItemStatus::Completed);
        }
        let server_event = RealtimeServerEvent::ConversationItemAdded {
            event_id: "evt_1".to_string(),
            previous_item_id: None,
            item: confirmed,
        };
        engine
            .handle_server_event(&server_event, Some("evt_1"), None)
            .unwrap();

        let cell = engine.group.get(&a_id).unwrap();
        assert!(cell.touched_by_event_ids.contains(&Some("evt_1".to_string())));
        assert!(cell.touched_by_event_ids.contains(&None));
    }

    #[test]
    fn mismatched_confirmation_is_protocol_violation() {
        let mut engine = ConversationEngine::new();
        let mut a = RealtimeClientEvent::item_create(ConversationItem::user_text("a"));
        engine.handle_outbound(&mut a).unwrap();
        let RealtimeClientEvent::ConversationItemCreate { item: a_item, .. } = &a else {
            unreachable!()
        };
        let a_id = a_item.id().unwrap().to_string();

        let server_event = RealtimeServerEvent::ConversationItemAdded {
            event_id: "evt_1".to_string(),
            previous_item_id: None,
            item: ConversationItem::Message {
                id: Some(a_id),
                object: None,
                status: None,
                role: Role::User,
                content: vec![ContentPart::input_text("totally different")],
            },
        };
        let err = engine
            .handle_server_event(&server_event, Some("evt_1"), None)
            .unwrap_err();
        assert!(matches!(err, AriaError::ProtocolViolation(_)));
    }

    #[test]
    fn out_of_band_response_item_not_in_main_sequence() {
        let mut engine = ConversationEngine::new();
        let response = Response {
            id: "R1".to_string(),
            object: "realtime.response".to_string(),
            status: openai_protocol::realtime::ResponseStatus::InProgress,
            status_details: None,
            conversation_id: None,
            output: vec![],
            usage: None,
            metadata: None,
        };
        engine
            .handle_server_event(
                &RealtimeServerEvent::ResponseCreated {
                    event_id: "evt_1".to_string(),
                    response,
                },
                Some("evt_1"),
                None,
            )
            .unwrap();

        engine
            .handle_server_event(
                &RealtimeServerEvent::ResponseOutputItemAdded {
                    event_id: "evt_2".to_string(),
                    response_id: "R1".to_string(),
                    output_index: 0,
                    item: item_with_id("Y"),
                },
                Some("evt_2"),
                None,
            )
            .unwrap();

        assert!(engine.group.get("Y").is_some());
        assert!(!engine.group.main_ids().contains("Y"));
    }

    #[test]
    fn duplicate_response_id_is_rejected() {
        let mut engine = ConversationEngine::new();
        let response = Response {
            id: "R1".to_string(),
            object: "realtime.response".to_string(),
            status: openai_protocol::realtime::ResponseStatus::InProgress,
            status_details: None,
            conversation_id: None,
            output: vec![],
            usage: None,
            metadata: None,
        };
        let event = RealtimeServerEvent::ResponseCreated {
            event_id: "evt_1".to_string(),
            response: response.clone(),
        };
        engine.handle_server_event(&event, Some("evt_1"), None).unwrap();
        let err = engine
            .handle_server_event(&event, Some("evt_2"), None)
            .unwrap_err();
        assert!(matches!(err, AriaError::ProtocolViolation(_)));
    }

    #[test]
    fn transcript_delta_accumulates_in_order() {
        let mut engine = ConversationEngine::new();
        let mut z = ConversationCell::new(
            "Z",
            ConversationItem::Message {
                id: Some("Z".to_string()),
                object: None,
                status: None,
                role: Role::Assistant,
                content: vec![ContentPart::output_audio("", "")],
            },
        );
        z.touch(None);
        engine.group.insert_main(z, None).unwrap();

        for (delta, evt) in [("He", "e1"), ("llo", "e2"), ("!", "e3")] {
            engine
                .handle_server_event(
                    &RealtimeServerEvent::ResponseAudioTranscriptDelta {
                        event_id: evt.to_string(),
                        response_id: "R1".to_string(),
                        item_id: "Z".to_string(),
                        output_index: 0,
                        content_index: 0,
                        delta: delta.to_string(),
                    },
                    Some(evt),
                    None,
                )
                .unwrap();
        }

        let cell = engine.group.get("Z").unwrap();
        let ConversationItem::Message { content, .. } = &cell.item else {
            panic!()
        };
        assert_eq!(content[0].transcript(), Some("Hello!"));
        let touched: Vec<_> = cell
            .touched_by_event_ids
            .iter()
            .filter_map(|e| e.clone())
            .collect();
        assert_eq!(touched, vec!["e1", "e2", "e3"]);
    }

    #[test]
    fn beta_api_item_created_is_fatal() {
        let mut engine = ConversationEngine::new();
        let event = RealtimeServerEvent::ConversationItemCreated {
            event_id: "evt_1".to_string(),
            previous_item_id: None,
            item: item_with_id("x"),
        };
        let err = engine
            .handle_server_event(&event, Some("evt_1"), None)
            .unwrap_err();
        assert!(matches!(err, AriaError::ProtocolViolation(_)));
    }

    #[test]
    fn empty_string_previous_item_id_normalizes_to_root() {
        assert_eq!(normalize_previous_item_id(Some("")), None);
        assert_eq!(normalize_previous_item_id(Some("x")), Some("x".to_string()));
        assert_eq!(normalize_previous_item_id(None), None);
    }
}
