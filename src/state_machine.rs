//! Session state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions: the
//! runtime feeds [`Event`]s in and executes the returned [`Effect`]s.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;
mod turn;


pub use effect::Effect;
pub use event::Event;
pub use state::{ConvContext, ConvState, SessionState, ThreadId, TurnKind, TurnPhase, TurnState};
pub use transition::{transition, IgnoreReason, TransitionError, TransitionResult};
pub use turn::{FALLBACK_MESSAGE, INTERRUPTED_MESSAGE};
