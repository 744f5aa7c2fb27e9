//! Transcription session types for the Realtime API.
//!
//! This module contains types specific to transcription sessions, which provide
//! speech-to-text functionality without full conversation capabilities.
//! Transcription sessions use a subset of the realtime session configuration.

use serde::{Deserialize, Serialize};

use super::session::{AudioFormat, InputAudioNoiseReduction, InputAudioTranscription};

// ============================================================================
// Main Types
// ============================================================================
/// Full transcription session object returned in server events.
///
/// Returned in `transcription_session.created` and `transcription_session.updated` events.
/// Matches the GA `RealtimeTranscriptionSessionCreateResponseGA` schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionSession {
    /// Unique identifier for the session
    pub id: String,
    /// Object type (always "realtime.transcription_session")
    #[serde(default = "transcription_session_object_type")]
    pub object: String,
    /// Session type (always "transcription")
    #[serde(rename = "type", default = "transcription_session_type_default")]
    pub session_type: String,
    /// Unix timestamp when the session expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// Additional fields included in outputs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
    /// Audio input configuration
    #[serde(default)]
    pub audio: TranscriptionAudioConfig,
}


/// Configuration for creating or updating a transcription session.
///
/// Used in `transcription_session.update` client events.
/// Matches the GA `RealtimeTranscriptionSessionCreateRequestGA` schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionSessionConfig {
    /// Session type (always "transcription", defaults to "transcription")
    #[serde(rename = "type", default = "transcription_session_object_type")]
    pub session_type: String,

    /// Audio input configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<TranscriptionAudioConfig>,

    /// Additional fields to include in server outputs
    /// (e.g., ["item.input_audio_transcription.logprobs"])
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
}

impl Default for TranscriptionSessionConfig {
    fn default() -> Self {
        Self {
            session_type: "transcription".to_string(),
            audio: None,
            include: None,
        }
    }
}

fn transcription_session_object_type() -> String {
    "realtime.transcription_session".to_string()
}

fn transcription_session_type_default() -> String {
    "transcription".to_string()
}


// ============================================================================
// Supporting Types
// ============================================================================

/// Audio configuration for transcription sessions (input only).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TranscriptionAudioConfig {
    /// Input audio configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<TranscriptionAudioInputConfig>,
}

/// Audio input configuration for transcription sessions.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TranscriptionAudioInputConfig {
    /// Input audio format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<AudioFormat>,
    /// Transcription configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<InputAudioTranscription>,
    /// Noise reduction configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noise_reduction: Option<InputAudioNoiseReduction>,
    /// Turn detection configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TranscriptionTurnDetection>,
}

/// Turn detection configuration for transcription sessions.
///
/// Only `server_vad` is supported for transcription sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptionTurnDetection {
    ServerVad {
        /// Activation threshold for VAD (0.0-1.0, default 0.5)
        #[serde(skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        /// Audio to include before speech starts (ms, default 300)
        #[serde(skip_serializing_if = "Option::is_none")]
        prefix_padding_ms: Option<u32>,
        /// Duration of silence to detect end of speech (ms, default 500)
        #[serde(skip_serializing_if = "Option::is_none")]
        silence_duration_ms: Option<u32>,
    },
}

/// A transcription segment returned in
/// `conversation.item.input_audio_transcription.segment` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionSegment {
    /// Segment identifier
    pub id: String,
    /// The transcription text for this segment
    pub text: String,
    /// Detected speaker label for this segment
    pub speaker: String,
    /// Start time of the segment in seconds
    pub start: f32,
    /// End time of the segment in seconds
    pub end: f32,
}

// ============================================================================
// Tests
// ============================================================================
