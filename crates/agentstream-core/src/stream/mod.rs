//! Payload decoding shared by both transports.

mod decoder;
mod update;

pub use decoder::{Frame, FrameDecoder, DATA_PREFIX, DEFAULT_SENTINEL};
pub use update::{AgentUpdate, StructuredUpdate, UpdateKind};
