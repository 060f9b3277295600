//! Scripted transport for testing.
//!
//! Reads are served from a queue filled by the test; writes are recorded.
use std::{collections::VecDeque, io, time::Duration};

use super::{Frame, Transport, TransportError};

#[derive(Debug)]
pub(crate) enum Scripted {
    Frame(Frame),
    Timeout,
    Drop,
}

#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    open: bool,
    pub refuse_open: bool,
    pub fail_writes: bool,
    pub opened: Vec<(String, u16)>,
    pub written: Vec<(u32, String)>,
    pub read_timeouts: Vec<Option<Duration>>,
    script: VecDeque<Scripted>,
}

impl MockTransport {
    pub fn push(&mut self, request_id: u32, json: &str) -> &mut Self {
        self.script
            .push_back(Scripted::Frame(Frame::new(request_id, json)));
        self
    }

    pub fn push_scripted(&mut self, item: Scripted) -> &mut Self {
        self.script.push_back(item);
        self
    }

    pub fn pending(&self) -> usize {
        self.script.len()
    }
}

impl Transport for MockTransport {
    fn open(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        if self.refuse_open {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
        }
        self.opened.push((host.to_string(), port));
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn write_with_header(
        &mut self,
        request_id: u32,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotConnected);
        }
        if self.fail_writes {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe).into());
        }
        self.written
            .push((request_id, String::from_utf8_lossy(payload).into_owned()));
        Ok(())
    }

    fn read_timeout(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>, TransportError> {
        if !self.open {
            return Err(TransportError::NotConnected);
        }
        self.read_timeouts.push(timeout);
        match self.script.pop_front() {
            Some(Scripted::Frame(frame)) => Ok(Some(frame)),
            Some(Scripted::Timeout) | None => Ok(None),
            Some(Scripted::Drop) => Err(TransportError::Closed),
        }
    }
}
