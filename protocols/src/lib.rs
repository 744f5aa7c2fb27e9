//! Wire types for an OpenAI-style Realtime conversation protocol.
//!
//! This crate only defines the message shapes that cross the wire. It has
//! no opinion on transport, scheduling, or how a client reconciles the
//! events into local state -- see the `aria` crate for that.

pub mod realtime;
