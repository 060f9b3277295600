//! Synchronous pubsubsql client.
//!
//! A [`Client`] owns one connection and turns it into two logical channels:
//! ordered request/response execution ([`Client::execute`]) and out-of-band
//! change notifications ([`Client::wait_for_event`]). Every operation blocks the
//! caller; there is no background reader.
//!
//! # Example
//! ```no_run
//! use pubsubsql::Client;
//!
//! let mut client = Client::new();
//! client.connect("localhost:7777").unwrap();
//!
//! client.execute("select * from stocks").unwrap();
//! while client.next_row().unwrap() {
//!     println!("{}", client.value("ticker").unwrap());
//! }
//!
//! client.disconnect();
//! ```
//!
//! # Failure model
//!
//! Any read or write failure, including a read timeout during `execute`, closes
//! the connection and clears the current response before the error is returned.
//! The next call after such a failure must be [`Client::connect`].
mod correlator;
mod session;

use std::time::Duration;

use crate::protocol::{DEFAULT_MAX_MESSAGE_SIZE, ResultSet, TcpTransport, Transport};

pub use error::ClientError;
pub use session::Address;

pub mod error {
    use thiserror::Error;

    use crate::protocol::{DecodeError, TransportError};

    #[derive(Debug, Error)]
    pub enum ClientError {
        #[error("invalid network address '{address}': {reason}")]
        InvalidAddress {
            address: String,
            reason: &'static str,
        },

        #[error("connection error: {0}")]
        Connection(#[from] TransportError),

        #[error("read timed out")]
        Timeout,

        #[error("protocol error: {0}")]
        Protocol(String),

        #[error("server error: {0}")]
        Server(String),

        #[error("failed to decode response: {0}")]
        Decode(#[from] DecodeError),

        #[error("unknown column '{0}'")]
        UnknownColumn(String),

        #[error("cursor is not positioned on a row")]
        NoCurrentRow,

        #[error("column ordinal {0} is out of range")]
        OrdinalOutOfRange(usize),

        #[error("timeout must be greater than zero")]
        InvalidTimeout,
    }

    impl ClientError {
        /// A fatal error means client and server disagree about the conversation;
        /// retrying the same operation cannot succeed.
        pub fn is_fatal(&self) -> bool {
            matches!(self, ClientError::Protocol(_))
        }
    }
}

/// Client settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Read budget for each frame `execute` waits for. `None` blocks.
    pub read_timeout: Option<Duration>,
    /// Budget for establishing the TCP connection. `None` uses the OS default.
    pub connect_timeout: Option<Duration>,
    /// Largest payload accepted or sent in one frame.
    pub max_message_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_timeout: None,
            connect_timeout: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

pub struct Client<T: Transport = TcpTransport> {
    transport: T,
    config: ClientConfig,
    request_id: u32,
    response: Option<ResultSet>,
    /// Whether `response` answers `request_id` (as opposed to a push event).
    solicited: bool,
    raw_json: String,
}

impl Client<TcpTransport> {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let transport = TcpTransport::new(config.connect_timeout, config.max_message_size);
        Self::with_transport(transport, config)
    }
}

impl Default for Client<TcpTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            request_id: 1,
            response: None,
            solicited: false,
            raw_json: String::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Id of the most recently written request.
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// Raw JSON of the last processed response, empty if there is none.
    pub fn json(&self) -> &str {
        &self.raw_json
    }

    /// Action reported by the last response, empty if there is none.
    pub fn action(&self) -> &str {
        self.response.as_ref().map_or("", ResultSet::action)
    }

    pub fn pubsub_id(&self) -> Option<&str> {
        self.response.as_ref().and_then(ResultSet::pubsub_id)
    }

    /// Id the server assigned to the row of an `insert`.
    pub fn id(&self) -> Option<&str> {
        self.response.as_ref().and_then(ResultSet::id)
    }

    /// Total rows in the current result set across all batches.
    pub fn row_count(&self) -> usize {
        self.response.as_ref().map_or(0, ResultSet::row_count)
    }

    pub fn columns(&self) -> &[String] {
        self.response
            .as_ref()
            .map(ResultSet::columns)
            .unwrap_or_default()
    }

    pub fn column_count(&self) -> usize {
        self.columns().len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.response
            .as_ref()
            .and_then(|set| set.column_index(name))
            .is_some()
    }

    /// Value of `column` in the current row.
    pub fn value(&self, column: &str) -> Result<&str, ClientError> {
        let set = self
            .response
            .as_ref()
            .ok_or_else(|| ClientError::UnknownColumn(column.to_string()))?;
        let index = set
            .column_index(column)
            .ok_or_else(|| ClientError::UnknownColumn(column.to_string()))?;
        let row = set.current_row().ok_or(ClientError::NoCurrentRow)?;

        Ok(row.get(index).map_or("", String::as_str))
    }

    /// Value at `ordinal` (0-based column position) in the current row.
    pub fn value_at(&self, ordinal: usize) -> Result<&str, ClientError> {
        let row = self
            .response
            .as_ref()
            .and_then(ResultSet::current_row)
            .ok_or(ClientError::NoCurrentRow)?;

        row.get(ordinal)
            .map(String::as_str)
            .ok_or(ClientError::OrdinalOutOfRange(ordinal))
    }

    fn reset(&mut self) {
        self.response = None;
        self.solicited = false;
        self.raw_json.clear();
    }

    fn hard_disconnect(&mut self) {
        self.transport.close();
        self.reset();
    }
}

impl<T: Transport> Drop for Client<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
