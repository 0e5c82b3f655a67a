use serde_json::Value;
use std::io::{BufRead, Write};

use super::message::Message;
use crate::error::ProtocolError;

/// Read one newline-delimited JSON frame, skipping blank lines.
///
/// End of input is [`ProtocolError::Closed`]; a line that is not JSON is
/// [`ProtocolError::Malformed`].
pub fn read_frame<R: BufRead + ?Sized>(reader: &mut R) -> Result<Value, ProtocolError> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(ProtocolError::Closed);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        return Ok(serde_json::from_str(trimmed)?);
    }
}

/// Write one message as a single JSON line and flush.
pub fn write_frame<W: Write + ?Sized>(writer: &mut W, message: &Message) -> Result<(), ProtocolError> {
    serde_json::to_writer(&mut *writer, message)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
