use parking_lot::Mutex;
use serde_json::{Value, json};
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

use super::codec::write_frame;
use super::message::{Event, Message};
use crate::error::ProtocolError;

/// Outbound half of the transport.
///
/// Every send takes the lock, assigns the next sequence number and writes
/// the frame before releasing it, so sequence numbers reach the wire in
/// order even when background threads emit events. Clones share the counter
/// and the writer.
#[derive(Clone)]
pub struct Outbound {
    inner: Arc<Mutex<OutboundState>>,
}

struct OutboundState {
    next_seq: i64,
    writer: Box<dyn Write + Send>,
}

impl fmt::Debug for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbound")
            .field("next_seq", &self.inner.lock().next_seq)
            .finish_non_exhaustive()
    }
}

impl Outbound {
    /// Wrap a writer; the first message sent gets sequence number 0.
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(OutboundState {
                next_seq: 0,
                writer: Box::new(writer),
            })),
        }
    }

    /// Build a message around the next sequence number and write it.
    pub fn send_with<F>(&self, build: F) -> Result<i64, ProtocolError>
    where
        F: FnOnce(i64) -> Message,
    {
        let mut state = self.inner.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let message = build(seq);
        debug!(seq, frame = ?message, "send");
        write_frame(&mut state.writer, &message)?;
        Ok(seq)
    }

    /// Send an event.
    pub fn event(&self, event: &str, body: Value) -> Result<i64, ProtocolError> {
        self.send_with(|seq| {
            Message::Event(Event {
                seq,
                event: event.to_string(),
                body,
            })
        })
    }

    /// Send an `output` event.
    pub fn output(&self, category: &str, output: &str) -> Result<i64, ProtocolError> {
        self.event("output", json!({ "category": category, "output": output }))
    }

    /// Sequence number the next message will carry.
    pub fn peek_seq(&self) -> i64 {
        self.inner.lock().next_seq
    }
}
