//! Streamed turns: what to send, how it is carried, and how it ends.

mod controller;
mod request;
mod state;

pub use controller::{CancelHandle, SessionController, StreamEvent, StreamHandle};
pub use request::{AgentEndpoint, ImageAttachment, TurnRequest};
pub use state::{SessionId, SessionState};
