// Hive Network Layer: Wire framing
// Distributed under the MIT software license.

//! Length-prefixed wire framing.
//!
//! Every byte stream between workers is a concatenation of frames:
//! a 4-byte big-endian payload length followed by exactly that many payload
//! bytes. No magic, no version, no checksum: the channel is local-only and
//! trusted. The read side reassembles frames through [`FrameBuffer`] so the
//! syscall count stays independent of message rate.

use thiserror::Error;

/// Hard ceiling on a frame payload. A length field above this is a framing
/// error: the connection is closed without any attempt to resync.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Bytes requested from the socket per read.
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Bytes of the length prefix.
pub const LEN_PREFIX_SIZE: usize = 4;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame payload of {0} bytes exceeds maximum {MAX_FRAME_SIZE}")]
    Oversize(usize),
}

/// Compose a complete frame for a single full-send: length prefix and
/// payload in one buffer, so no partial write can leave a half-frame behind.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(FrameError::Oversize(payload.len()));
    }
    let mut frame = Vec::with_capacity(LEN_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Per-connection frame reassembly.
///
/// Bytes arrive in whatever chunks the kernel hands out; `push` appends a
/// chunk and `next_frame` pops complete payloads in arrival order. Partial
/// frames stay buffered across reads.
#[derive(Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// True when no partial frame is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Pop the next complete frame payload, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        if self.buf.len() < LEN_PREFIX_SIZE {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(FrameError::Oversize(len));
        }
        if self.buf.len() < LEN_PREFIX_SIZE + len {
            return Ok(None);
        }
        let payload = self.buf[LEN_PREFIX_SIZE..LEN_PREFIX_SIZE + len].to_vec();
        self.buf.drain(..LEN_PREFIX_SIZE + len);
        Ok(Some(payload))
    }
}
