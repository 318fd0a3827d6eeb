//! Human-in-the-loop agent client
//!
//! Streams agent turns from a backend over server-sent events, renders them as
//! they arrive, and lets a human answer when the agent suspends a turn. The
//! session logic is a pure state machine ([`state_machine`]) driven by an async
//! runtime ([`runtime`]).

pub mod config;
pub mod intervention;
pub mod protocol;
pub mod render;
pub mod runtime;
pub mod segment;
pub mod state_machine;
