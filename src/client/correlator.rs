//! Request/response correlation.
//!
//! Every command is written with a fresh request id. While a command waits for
//! its answer, each incoming frame is matched against the active id; frames
//! that belong to something else are dropped, never reordered.
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::protocol::{Frame, PUSH_REQUEST_ID, Reply, Transport, TransportError, response};

use super::{Client, ClientError};

/// What an incoming frame means relative to the request being waited on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// Answer to the active request.
    Answer,
    /// Unsolicited pub/sub delivery.
    Push,
    /// Leftover of an earlier, abandoned request.
    Stale,
    /// Id the client never issued.
    Ahead,
}

pub(crate) fn classify(incoming: u32, active: u32) -> Disposition {
    match incoming {
        PUSH_REQUEST_ID => Disposition::Push,
        id if id == active => Disposition::Answer,
        id if id < active => Disposition::Stale,
        _ => Disposition::Ahead,
    }
}

impl<T: Transport> Client<T> {
    /// Execute `command` and wait for its response.
    ///
    /// Push events and leftovers of earlier requests that arrive first are
    /// discarded. On success the response is available through the accessors,
    /// with the row cursor positioned before the first row.
    pub fn execute(&mut self, command: &str) -> Result<(), ClientError> {
        self.reset();
        self.write(command)?;
        self.await_answer()
    }

    /// Send `command` without waiting for, or expecting, a response.
    pub fn stream(&mut self, command: &str) -> Result<(), ClientError> {
        self.reset();
        self.write(&format!("stream {command}"))
    }

    /// Wait up to `timeout` for the next push event.
    ///
    /// Returns `true` when an event was received and decoded, `false` when the
    /// timeout elapsed first. Responses to earlier requests arriving in the
    /// meantime are discarded.
    pub fn wait_for_event(&mut self, timeout: Duration) -> Result<bool, ClientError> {
        if timeout.is_zero() {
            return Err(ClientError::InvalidTimeout);
        }

        let deadline = Instant::now() + timeout;
        loop {
            self.reset();
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }

            let Some(frame) = self.read(Some(remaining))? else {
                return Ok(false);
            };
            if frame.is_push() {
                self.load(&frame, false)?;
                return Ok(true);
            }
            debug!(
                "discarding response to request {} while waiting for push event",
                frame.request_id()
            );
        }
    }

    /// Advance the row cursor.
    ///
    /// When the current batch is exhausted and the server announced more rows
    /// for the same request, the next batch is read from the connection.
    pub fn next_row(&mut self) -> Result<bool, ClientError> {
        loop {
            let Some(set) = self.response.as_mut() else {
                return Ok(false);
            };
            if set.advance() {
                return Ok(true);
            }
            if !self.solicited || !set.has_more_batches() {
                return Ok(false);
            }

            let reached = set.to_row();
            debug!(
                "reading next batch of request {} after row {reached}",
                self.request_id
            );
            self.await_answer()?;

            let advanced = self
                .response
                .as_ref()
                .is_some_and(|next| next.to_row() > reached);
            if !advanced {
                self.hard_disconnect();
                return Err(ClientError::Protocol(format!(
                    "result set batch did not advance past row {reached}"
                )));
            }
        }
    }

    pub(super) fn write(&mut self, command: &str) -> Result<(), ClientError> {
        let res = self.try_write(command);
        if let Err(e) = &res {
            warn!("write failed, closing connection: {e}");
            self.hard_disconnect();
        }
        res
    }

    fn try_write(&mut self, command: &str) -> Result<(), ClientError> {
        if self.transport.is_closed() {
            return Err(TransportError::NotConnected.into());
        }

        self.request_id = self
            .request_id
            .checked_add(1)
            .ok_or_else(|| ClientError::Protocol("request id space exhausted".into()))?;
        trace!("request {}: {command}", self.request_id);
        self.transport
            .write_with_header(self.request_id, command.as_bytes())?;
        Ok(())
    }

    fn read(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>, ClientError> {
        let res = if self.transport.is_closed() {
            Err(TransportError::NotConnected)
        } else {
            self.transport.read_timeout(timeout)
        };

        res.map_err(|e| {
            warn!("read failed, closing connection: {e}");
            self.hard_disconnect();
            e.into()
        })
    }

    /// Read until the frame answering the active request arrives.
    fn await_answer(&mut self) -> Result<(), ClientError> {
        let active = self.request_id;
        loop {
            self.reset();
            let Some(frame) = self.read(self.config.read_timeout)? else {
                warn!("request {active} timed out, closing connection");
                self.hard_disconnect();
                return Err(ClientError::Timeout);
            };

            let incoming = frame.request_id();
            match classify(incoming, active) {
                Disposition::Answer => return self.load(&frame, true),
                Disposition::Push => {
                    debug!("discarding push event while waiting for request {active}")
                }
                Disposition::Stale => {
                    debug!("discarding stale response {incoming} while waiting for request {active}")
                }
                Disposition::Ahead => {
                    warn!("received request id {incoming} ahead of active request {active}");
                    self.hard_disconnect();
                    return Err(ClientError::Protocol(format!(
                        "invalid request id {incoming}, expected {active}"
                    )));
                }
            }
        }
    }

    fn load(&mut self, frame: &Frame, solicited: bool) -> Result<(), ClientError> {
        let (reply, json) = response::decode(&frame.payload)?;
        match reply {
            Reply::Ok(set) => {
                self.response = Some(set);
                self.solicited = solicited;
                self.raw_json = json;
                Ok(())
            }
            Reply::Err { message } => Err(ClientError::Server(message)),
        }
    }
}
