use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint},
};

/// Size of the encoded [`FrameHeader`] in bytes.
pub const HEADER_SIZE: usize = 8;

/// Request id carried by frames the server pushes on its own.
pub const PUSH_REQUEST_ID: u32 = 0;

/// Default upper bound for a single payload (64 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 64 * 1024 * 1024;

/// Fixed header in front of every message: payload length, then request id.
#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub struct FrameHeader {
    pub message_size: u32,
    pub request_id: u32,
}

impl FrameHeader {
    pub fn new(request_id: u32, message_size: u32) -> Self {
        Self {
            message_size,
            request_id,
        }
    }
}

/// One message read off the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(request_id: u32, payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        Self {
            header: FrameHeader::new(request_id, frame_size(payload.len())),
            payload,
        }
    }

    pub fn request_id(&self) -> u32 {
        self.header.request_id
    }

    /// Frames with request id 0 are unsolicited pub/sub deliveries.
    pub fn is_push(&self) -> bool {
        self.header.request_id == PUSH_REQUEST_ID
    }
}

/// Payload length as carried in the header. Lengths past `u32::MAX` clamp to
/// it so the size limit check rejects them.
pub(crate) fn frame_size(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Header encoding shared by every reader and writer: big endian, fixed width.
pub(crate) fn wire_config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}
