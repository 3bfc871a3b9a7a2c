//! Line-delimited JSON framing
//!
//! Each frame is one UTF-8 JSON value followed by `\n`. Compact JSON never
//! contains an unescaped newline, so the delimiter alone marks boundaries.
//!
//! Encoding is pure. Decoding is pure per frame; reassembly across reads is
//! handled by `FrameBuffer`.

use serde::Deserialize;

use crate::errors::CodecError;
use crate::message::UpdateMessage;

/// Byte that terminates every frame.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Serialize a message into one frame, delimiter included.
pub fn encode(message: &UpdateMessage) -> Result<Vec<u8>, CodecError> {
    let mut bytes =
        serde_json::to_vec(message).map_err(|e| CodecError::Encode(e.to_string()))?;
    bytes.push(FRAME_DELIMITER);
    Ok(bytes)
}

/// Decode a single-message frame (delimiter already stripped).
pub fn decode(frame: &[u8]) -> Result<UpdateMessage, CodecError> {
    let text = frame_text(frame)?;
    serde_json::from_str(text).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Decode a frame carrying either one message object or an array of them.
///
/// Older publishers sent the initial full book for both sides as one array
/// on a single line; both shapes are accepted.
pub fn decode_frame(frame: &[u8]) -> Result<Vec<UpdateMessage>, CodecError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FramePayload {
        One(UpdateMessage),
        Many(Vec<UpdateMessage>),
    }

    let text = frame_text(frame)?;
    match serde_json::from_str::<FramePayload>(text) {
        Ok(FramePayload::One(message)) => Ok(vec![message]),
        Ok(FramePayload::Many(messages)) => Ok(messages),
        // Re-run the strict decoder so the error names the actual problem
        Err(_) => decode(frame).map(|message| vec![message]),
    }
}

/// Whether a frame holds nothing but whitespace.
pub fn is_blank(frame: &[u8]) -> bool {
    frame.iter().all(|b| b.is_ascii_whitespace())
}

fn frame_text(frame: &[u8]) -> Result<&str, CodecError> {
    std::str::from_utf8(frame).map_err(|e| CodecError::InvalidUtf8(e.to_string()))
}

/// Accumulates raw bytes and yields complete frames in arrival order.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: Vec::with_capacity(capacity),
        }
    }

    /// Append bytes from one read.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Remove and return the next complete frame, without its delimiter.
    ///
    /// A trailing `\r` before the delimiter is stripped as well.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let end = self.pending.iter().position(|b| *b == FRAME_DELIMITER)?;
        let mut frame: Vec<u8> = self.pending.drain(..=end).collect();
        frame.pop();
        if frame.last() == Some(&b'\r') {
            frame.pop();
        }
        Some(frame)
    }

    /// Bytes buffered that do not yet form a complete frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
