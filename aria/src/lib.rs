//! Client-side runtime for realtime, bidirectional, multimodal-assistant
//! conversations over a persistent connection.
//!
//! [`Client`] owns the transport and the device streams and drives two
//! independent middleware chains against them: a server-in chain
//! ([`pipeline::ServerPipeline`]) that reconciles conversation state, plays
//! assistant audio, and reacts to user speech; and a client-out chain
//! ([`pipeline::ClientPipeline`]) that every outbound event -- caller- or
//! device-originated -- passes through before it reaches the wire.

mod client;

pub mod audio;
pub mod conversation;
pub mod error;
pub mod pipeline;
pub mod scheduler;
pub mod transport;

pub use client::{Client, ClientConfig};
pub use error::{AriaError, AriaResult};
