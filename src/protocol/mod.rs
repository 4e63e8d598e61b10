//! Coordinator/worker wire protocol
//!
//! [`wire`] provides the length-prefixed framing and the deterministic byte
//! codec; [`messages`] defines the typed schema exchanged over it.

pub mod messages;
pub mod wire;

pub use messages::{
    Architecture, Command, CommandType, HandshakeRequest, HandshakeResponse, OsType, ResultBatch,
    SystemInfo, Task, TaskBatch, TaskResult,
};
pub use wire::{read_frame, write_frame, WireError, MAX_FRAME_LEN};
