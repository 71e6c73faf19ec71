//! Outbound message buffer.
//!
//! Every line the controller produces during a tick lands in a `MessageSink` and
//! is flushed, in insertion order, to each attached `Transport` at the end of the
//! tick. The result is the user-visible transcript, so successes and errors share
//! one ordering.

use alloc::{string::String, vec::Vec};
use core::fmt;

/// One immutable line of transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message(String);

impl Message {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Message {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self(String::from(text))
    }
}

/// Destination for flushed messages (serial echo, wireless notify, ...).
pub trait Transport {
    /// Whether a peer is currently attached. The serial console always is.
    fn is_connected(&self) -> bool {
        true
    }

    /// Deliver one transcript line.
    fn send_line(
        &mut self,
        line: &str,
    );

    /// Deliver a JSON status snapshot. Transports without a data channel ignore it.
    fn send_status(
        &mut self,
        _status: &str,
    ) {
    }
}

/// Ordered, append-only buffer drained once per tick.
#[derive(Debug, Default)]
pub struct MessageSink {
    pending: Vec<Message>,
}

impl MessageSink {
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    pub fn push(
        &mut self,
        message: impl Into<Message>,
    ) {
        let message = message.into();
        tracing::debug!(message = message.as_str(), "queued");
        self.pending.push(message);
    }

    /// Messages waiting for the next flush, oldest first.
    pub fn pending(&self) -> &[Message] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take every pending message without delivering it.
    pub fn take(&mut self) -> Vec<Message> {
        core::mem::take(&mut self.pending)
    }

    /// Send every pending message to each connected transport, then clear.
    ///
    /// Messages are drained even when no transport is connected.
    pub fn flush(
        &mut self,
        transports: &mut [&mut dyn Transport],
    ) -> usize {
        let count = self.pending.len();
        for message in self.pending.drain(..) {
            for transport in transports.iter_mut() {
                if transport.is_connected() {
                    transport.send_line(message.as_str());
                }
            }
        }
        count
    }
}
