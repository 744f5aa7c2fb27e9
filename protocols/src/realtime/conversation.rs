//! Conversation types for the Realtime API.
//!
//! This module contains types representing conversation items, including
//! messages, function calls, and function call outputs.

use serde::{Deserialize, Serialize};

// ============================================================================
// Conversation Item (Main Type)
// ============================================================================

/// A conversation item (message, function call, or function call output).
///
/// This is the main type for items in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    /// A message (user, assistant, or system)
    Message {
        /// Unique identifier for this item
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Object type (always "realtime.item")
        #[serde(skip_serializing_if = "Option::is_none")]
        object: Option<String>,
        /// Status of the item
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<ItemStatus>,
        /// Role of the message author
        role: Role,
        /// Content of the message
        content: Vec<ContentPart>,
    },
    /// A function call made by the assistant
    FunctionCall {
        /// Unique identifier for this item
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Object type (always "realtime.item")
        #[serde(skip_serializing_if = "Option::is_none")]
        object: Option<String>,
        /// Status of the item
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<ItemStatus>,
        /// ID for matching call with output
        #[serde(skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
        /// Name of the function being called
        name: String,
        /// JSON-encoded function arguments
        arguments: String,
    },
    /// Output from a function call
    FunctionCallOutput {
        /// Unique identifier for this item
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Object type (always "realtime.item")
        #[serde(skip_serializing_if = "Option::is_none")]
        object: Option<String>,
        /// Status of the item (has no effect on the conversation)
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<ItemStatus>,
        /// ID matching the function call
        call_id: String,
        /// Output from the function (JSON string)
        output: String,
    },

    // === MCP Events ===
    /// List of tools available on an MCP server
    McpListTools {
        /// Unique identifier for this item
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// The label of the MCP server
        server_label: String,
        /// The tools available on the server
        tools: Vec<McpListToolsTool>,
    },

    /// An invocation of a tool on an MCP server
    McpCall {
        /// Unique identifier for this item
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// The label of the MCP server running the tool
        server_label: String,
        /// The name of the tool being called
        name: String,
        /// JSON-encoded arguments passed to the tool
        arguments: String,
        /// ID of an associated approval request, if any
        #[serde(skip_serializing_if = "Option::is_none")]
        approval_request_id: Option<String>,
        /// Output from the tool call
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        /// Error from the tool call, if any
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<McpError>,
    },

    /// A request for human approval of an MCP tool invocation
    McpApprovalRequest {
        /// Unique identifier for this item
        id: String,
        /// The label of the MCP server making the request
        server_label: String,
        /// The name of the tool to run
        name: String,
        /// JSON-encoded arguments for the tool
        arguments: String,
    },

    /// A response to an MCP approval request
    McpApprovalResponse {
        /// Unique identifier for this item
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// The ID of the approval request being answered
        approval_request_id: String,
        /// Whether the request was approved
        approve: bool,
        /// Optional reason for the decision
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Unknown item type (for forward compatibility)
    #[serde(other)]
    Unknown,
}

impl ConversationItem {
    /// Create a new user message with text content
    pub fn user_message(content: Vec<ContentPart>) -> Self {
        Self::Message {
            id: None,
            object: None,
            status: None,
            role: Role::User,
            content,
        }
    }

    /// Create a new user message with simple text
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::user_message(vec![ContentPart::input_text(text)])
    }

    /// Create a new assistant message
    pub fn assistant_message(content: Vec<ContentPart>) -> Self {
        Self::Message {
            id: None,
            object: None,
            status: None,
            role: Role::Assistant,
            content,
        }
    }

    /// Create a new system message
    pub fn system_message(text: impl Into<String>) -> Self {
        Self::Message {
            id: None,
            object: None,
            status: None,
            role: Role::System,
            content: vec![ContentPart::input_text(text)],
        }
    }

    /// Create a new function call output
    pub fn function_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::FunctionCallOutput {
            id: None,
            object: None,
            status: None,
            call_id: call_id.into(),
            output: output.into(),
        }
    }

    /// Create an MCP approval response
    pub fn mcp_approval(
        approval_request_id: impl Into<String>,
        approve: bool,
        reason: Option<String>,
    ) -> Self {
        Self::McpApprovalResponse {
            id: None,
            approval_request_id: approval_request_id.into(),
            approve,
            reason,
        }
    }

    /// Get the item ID if present
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Message { id, .. }
            | Self::FunctionCall { id, .. }
            | Self::FunctionCallOutput { id, .. }
            | Self::McpListTools { id, .. }
            | Self::McpCall { id, .. }
            | Self::McpApprovalResponse { id, .. } => id.as_deref(),
            Self::McpApprovalRequest { id, .. } => Some(id),
            Self::Unknown => None,
        }
    }

    /// Get the role if this is a message
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::Message { role, .. } => Some(*role),
            _ => None,
        }
    }

    /// Check if this is a function call
    pub fn is_function_call(&self) -> bool {
        matches!(self, Self::FunctionCall { .. })
    }

    /// Check if this is an MCP tool call
    pub fn is_mcp_call(&self) -> bool {
        matches!(self, Self::McpCall { .. })
    }

    /// Check if this is an unknown item type
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Get function call details if this is a function call
    ///
    /// Returns (call_id, name, arguments) tuple. call_id may be None.
    pub fn as_function_call(&self) -> Option<(Option<&str>, &str, &str)> {
        match self {
            Self::FunctionCall {
                call_id,
                name,
                arguments,
                ..
            } => Some((call_id.as_deref(), name.as_str(), arguments.as_str())),
            _ => None,
        }
    }

    /// Get MCP call details if this is an MCP tool call
    pub fn as_mcp_call(&self) -> Option<(&str, &str, &str)> {
        match self {
            Self::McpCall {
                server_label,
                name,
                arguments,
                ..
            } => Some((server_label.as_str(), name.as_str(), arguments.as_str())),
            _ => None,
        }
    }
}

// ============================================================================
// Content Parts
// ============================================================================

/// Content part types for conversation items.
///
/// Content can be text, audio, or images, for both input and output.
/// - System messages: only `InputText`
/// - User messages: `InputText`, `InputAudio`, `InputImage`
/// - Assistant messages: `OutputText`, `OutputAudio`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text input (for system/user messages)
    InputText {
        /// The text content
        text: String,
    },
    /// Audio input (for user messages)
    InputAudio {
        /// Base64-encoded audio data
        audio: String,
        /// Transcript of the audio (client-provided, not sent to model)
        transcript: String,
    },
    /// Image input (for user messages)
    InputImage {
        /// Base64-encoded image as data URI (e.g., "data:image/png;base64,...")
        /// Supported formats: PNG, JPEG
        image_url: String,
        /// Detail level for image processing
        detail: ImageDetail,
    },
    /// Text output (for assistant messages)
    OutputText {
        /// The text content
        text: String,
    },
    /// Audio output (for assistant messages)
    OutputAudio {
        /// Base64-encoded audio data
        audio: String,
        /// Transcript of the audio (always present when output type is audio)
        transcript: String,
    },

    /// Unknown content part type (for forward compatibility)
    #[serde(other)]
    Unknown,
}

impl ContentPart {
    /// Create a new input text content part
    pub fn input_text(text: impl Into<String>) -> Self {
        Self::InputText { text: text.into() }
    }

    /// Create a new input audio content part
    pub fn input_audio(audio: impl Into<String>, transcript: impl Into<String>) -> Self {
        Self::InputAudio {
            audio: audio.into(),
            transcript: transcript.into(),
        }
    }

    /// Create a new input image content part
    pub fn input_image(image_url: impl Into<String>, detail: ImageDetail) -> Self {
        Self::InputImage {
            image_url: image_url.into(),
            detail,
        }
    }

    /// Create a new output text content part
    pub fn output_text(text: impl Into<String>) -> Self {
        Self::OutputText { text: text.into() }
    }

    /// Create a new output audio content part
    pub fn output_audio(audio: impl Into<String>, transcript: impl Into<String>) -> Self {
        Self::OutputAudio {
            audio: audio.into(),
            transcript: transcript.into(),
        }
    }

    /// Get the text content if this is a text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::InputText { text } | Self::OutputText { text } => Some(text),
            _ => None,
        }
    }

    /// Get the transcript if this part has one
    pub fn transcript(&self) -> Option<&str> {
        match self {
            Self::InputAudio { transcript, .. } | Self::OutputAudio { transcript, .. } => {
                Some(transcript.as_str())
            }
            _ => None,
        }
    }

    /// Check if this is an unknown content part type
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

// ============================================================================
// Supporting Types
// ============================================================================

// --- Role ---

/// Conversation item roles.
///
/// Represents who authored a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

// --- Item Status ---

/// Status of a conversation item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Item is complete
    Completed,
    /// Item is still being generated
    InProgress,
    /// Item generation was interrupted
    Incomplete,
}

// --- Image Detail ---

/// Detail level for image processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageDetail {
    /// Automatically choose detail level (defaults to high)
    #[default]
    Auto,
    /// Low detail - faster processing
    Low,
    /// High detail - better accuracy
    High,
}

// --- MCP Types ---

/// Error from an MCP tool call.
///
/// Represents one of three error types that can occur during MCP tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum McpError {
    /// HTTP-level error from the MCP server
    #[serde(rename = "http_error")]
    HttpError {
        /// HTTP status code
        code: i32,
        /// Error message
        message: String,
    },
    /// Protocol-level error from the MCP server
    #[serde(rename = "protocol_error")]
    ProtocolError {
        /// Error code
        code: i32,
        /// Error message
        message: String,
    },
    /// Error during tool execution
    #[serde(rename = "tool_execution_error")]
    ToolExecutionError {
        /// Error message
        message: String,
    },
}

/// A tool available on an MCP server.
///
/// Returned in `mcp_list_tools` items and `mcp.list_tools.completed` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpListToolsTool {
    /// The name of the tool
    pub name: String,
    /// Description of the tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema describing the tool's input (required)
    pub input_schema: serde_json::Value,
    /// Additional annotations about the tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<serde_json::Value>,
}

// ============================================================================
// Tests
// ============================================================================
