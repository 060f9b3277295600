//! Client-server communication protocol.
//!
//! This module defines how commands and responses travel between a pubsubsql
//! client and server: the frame layout, the transport abstraction used to move
//! frames over a connection, and the response model decoded from a frame's
//! JSON payload.
//!
//! # Overview
//!
//! A single TCP connection carries two logical streams. Commands written by the
//! client are tagged with a request id that the server echoes back in the
//! matching response. Change notifications for live subscriptions are pushed by
//! the server at any time and carry request id `0`.
//!
//! # Key Components
//!
//! - [`Frame`]: one message, header plus payload.
//! - [`Transport`]: the connection seam the client talks to, implemented for TCP by
//!   [`TcpTransport`].
//! - [`ProtocolTransport`]: frame codec over any `Read + Write` stream.
//! - [`ResultSet`]: decoded rows and metadata of one response.
//!
//! # Binary Format
//!
//! ```text
//! +----------------+----------------+------------------+
//! | message size   | request id     | payload          |
//! | u32 big endian | u32 big endian | UTF-8 JSON / text|
//! +----------------+----------------+------------------+
//! ```
//!
//! Client payloads are the command text verbatim (`status`, `select * from T`,
//! `subscribe * from T`, ...). Server payloads are JSON documents, see
//! [`response`].
mod frame;
pub mod response;
mod transport;

#[cfg(test)]
pub(crate) mod mock_transport;

pub use frame::{DEFAULT_MAX_MESSAGE_SIZE, Frame, FrameHeader, HEADER_SIZE, PUSH_REQUEST_ID};
pub use response::{DecodeError, Reply, ResultSet};
pub use transport::{ProtocolTransport, TcpTransport, Transport, TransportError};
