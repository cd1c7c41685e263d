//! Worker-to-worker IPC layer

pub mod frame;
pub mod transport;

// Re-exports
pub use frame::{FrameBuffer, FrameError, LEN_PREFIX_SIZE, MAX_FRAME_SIZE, READ_CHUNK_SIZE, encode_frame};
pub use transport::{
    FrameListener, NetError, Transport, TransportSnapshot, TransportStats, socket_path,
};
