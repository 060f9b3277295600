use std::{fmt, str::FromStr};

use log::debug;

use crate::protocol::Transport;

use super::{Client, ClientError};

/// Validated `host:port` connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl FromStr for Address {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| ClientError::InvalidAddress {
            address: s.to_string(),
            reason,
        };

        let (host, port) = s
            .split_once(':')
            .ok_or_else(|| invalid("expected host:port"))?;
        if host.is_empty() {
            return Err(invalid("host is not provided"));
        }
        if port.is_empty() {
            return Err(invalid("port is not provided"));
        }
        let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl<T: Transport> Client<T> {
    /// Connect to a server at `address` (`host:port`), dropping any previous connection.
    pub fn connect(&mut self, address: &str) -> Result<(), ClientError> {
        self.disconnect();

        let address: Address = address.parse()?;
        debug!("connecting to {address}");
        self.transport.open(&address.host, address.port)?;
        Ok(())
    }

    /// Close the connection. Never fails and is safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if self.is_connected() {
            if let Err(e) = self.write("close") {
                debug!("failed to send close: {e}");
            }
        }
        self.reset();
        self.transport.close();
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }
}
