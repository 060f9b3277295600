use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::{Duration, Instant},
};

use bincode::{decode_from_std_read, encode_into_std_write};
use log::{debug, trace};
use thiserror::Error;

use super::frame::{DEFAULT_MAX_MESSAGE_SIZE, Frame, FrameHeader, frame_size, wire_config};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode frame header: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode frame header: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("not connected")]
    NotConnected,
    #[error("connection closed by peer")]
    Closed,
    #[error("could not resolve '{0}'")]
    Resolve(String),
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    Oversized { size: u32, max: u32 },
}

/// Connection seam used by the client.
///
/// `read_timeout` returns `Ok(None)` when no frame arrived in time; a `None`
/// timeout blocks until a frame arrives.
pub trait Transport {
    fn open(&mut self, host: &str, port: u16) -> Result<(), TransportError>;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    fn is_closed(&self) -> bool {
        !self.is_open()
    }

    fn write_with_header(&mut self, request_id: u32, payload: &[u8])
    -> Result<(), TransportError>;

    fn read_timeout(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>, TransportError>;
}

/// Frame codec over any byte stream.
pub struct ProtocolTransport<T: Read + Write> {
    stream: T,
    max_message_size: u32,
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        Self::with_limit(stream, DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_limit(stream: T, max_message_size: u32) -> Self {
        Self {
            stream,
            max_message_size,
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn write_frame(&mut self, request_id: u32, payload: &[u8]) -> Result<(), TransportError> {
        let size = frame_size(payload.len());
        if size > self.max_message_size {
            return Err(TransportError::Oversized {
                size,
                max: self.max_message_size,
            });
        }

        let header = FrameHeader::new(request_id, size);
        encode_into_std_write(header, &mut self.stream, wire_config())?;
        self.stream.write_all(payload)?;
        self.stream.flush()?;
        trace!("wrote frame request_id={request_id} size={size}");
        Ok(())
    }

    pub fn read_frame(&mut self) -> Result<Frame, TransportError> {
        let header: FrameHeader = decode_from_std_read(&mut self.stream, wire_config())?;
        if header.message_size > self.max_message_size {
            return Err(TransportError::Oversized {
                size: header.message_size,
                max: self.max_message_size,
            });
        }

        let mut payload = vec![0; header.message_size as usize];
        self.stream.read_exact(&mut payload)?;
        trace!(
            "read frame request_id={} size={}",
            header.request_id, header.message_size
        );
        Ok(Frame { header, payload })
    }
}

/// TCP implementation of [`Transport`].
pub struct TcpTransport {
    inner: Option<ProtocolTransport<TcpStream>>,
    connect_timeout: Option<Duration>,
    max_message_size: u32,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(None, DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl TcpTransport {
    pub fn new(connect_timeout: Option<Duration>, max_message_size: u32) -> Self {
        Self {
            inner: None,
            connect_timeout,
            max_message_size,
        }
    }

    fn connect(&self, host: &str, port: u16) -> Result<TcpStream, TransportError> {
        let Some(timeout) = self.connect_timeout else {
            return Ok(TcpStream::connect((host, port))?);
        };

        let mut last = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last = Some(e),
            }
        }

        match last {
            Some(e) => Err(e.into()),
            None => Err(TransportError::Resolve(format!("{host}:{port}"))),
        }
    }
}

impl Transport for TcpTransport {
    fn open(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        self.close();

        let stream = self.connect(host, port)?;
        stream.set_nodelay(true)?;
        debug!("connected to {host}:{port}");

        self.inner = Some(ProtocolTransport::with_limit(stream, self.max_message_size));
        Ok(())
    }

    fn close(&mut self) {
        if let Some(transport) = self.inner.take() {
            // the peer may already be gone
            let _ = transport.get_ref().shutdown(Shutdown::Both);
            debug!("connection closed");
        }
    }

    fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn write_with_header(
        &mut self,
        request_id: u32,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        self.inner
            .as_mut()
            .ok_or(TransportError::NotConnected)?
            .write_frame(request_id, payload)
    }

    fn read_timeout(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>, TransportError> {
        let transport = self.inner.as_mut().ok_or(TransportError::NotConnected)?;

        // Wait for the first byte only, so a timeout never splits a frame.
        let stream = transport.get_ref();
        let mut first = [0; 1];
        let readable = await_readable(timeout.filter(|t| !t.is_zero()), |remaining| {
            stream.set_read_timeout(remaining)?;
            stream.peek(&mut first)
        })?;
        if !readable {
            return Ok(None);
        }
        stream.set_read_timeout(None)?;

        transport.read_frame().map(Some)
    }
}

/// Run `peek` until a byte is available or `timeout` elapses.
///
/// Signals interrupt a timed peek without restarting it; those are retried
/// with whatever remains of the budget.
fn await_readable<F>(timeout: Option<Duration>, mut peek: F) -> Result<bool, TransportError>
where
    F: FnMut(Option<Duration>) -> io::Result<usize>,
{
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        let remaining = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Ok(false);
                }
                Some(left)
            }
            None => None,
        };

        match peek(remaining) {
            Ok(0) => return Err(TransportError::Closed),
            Ok(_) => return Ok(true),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                trace!("peek interrupted, retrying");
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }
    }
}
