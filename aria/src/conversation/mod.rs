//! Conversation state: the three-container group ([`group`]) plus the
//! reconciliation logic that resolves server and locally-created items into
//! it ([`engine`]).

mod engine;
mod group;

pub use engine::{normalize_previous_item_id, ConversationEngine};
pub use group::{CellLocation, ConversationCell, ConversationGroup, TruncateInfo};

/// Sentinel denoting "no previous item" -- insert at the front of the main
/// sequence. The wire's empty-string `previous_item_id` normalizes to this.
pub const ROOT: Option<&str> = None;
