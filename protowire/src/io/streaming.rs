//! Defines the `StreamingWriter`, a writer that forwards large values to its sink without copying them.

use crate::io::stream::Write;
use crate::io::write::{CodedOutput, Result};

/// The default capacity of a streaming writer's staging buffer
pub const DEFAULT_STAGING_SIZE: usize = 256;

/// A protobuf coded writer optimized for outputs containing large byte strings.
///
/// Small values are staged in a small buffer and written to the sink when it fills.
/// A value larger than the buffer is never copied into it: pending bytes are written
/// first and then the value is handed to the sink as is.
pub struct StreamingWriter<'a> {
    output: &'a mut dyn Write,
    buf: Vec<u8>,
    capacity: usize,
    flushed: usize,
}

impl<'a> StreamingWriter<'a> {
    /// Creates a new streaming writer with the default staging capacity
    #[inline]
    pub fn new(output: &'a mut dyn Write) -> Self {
        Self::with_capacity(DEFAULT_STAGING_SIZE, output)
    }

    /// Creates a new streaming writer with the specified staging capacity
    pub fn with_capacity(capacity: usize, output: &'a mut dyn Write) -> Self {
        let capacity = capacity.max(1);
        StreamingWriter {
            output,
            buf: Vec::with_capacity(capacity),
            capacity,
            flushed: 0,
        }
    }

    /// Gets the number of bytes staged but not yet written to the sink
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn flush_pending(&mut self) -> Result {
        if !self.buf.is_empty() {
            self.output.write(&self.buf)?;
            self.flushed += self.buf.len();
            self.buf.clear();
        }
        Ok(())
    }
}

impl CodedOutput for StreamingWriter<'_> {
    fn write_raw_bytes(&mut self, value: &[u8]) -> Result {
        if value.len() > self.capacity {
            self.flush_pending()?;
            self.output.write(value)?;
            self.flushed += value.len();
            return Ok(());
        }

        if self.buf.len() + value.len() > self.capacity {
            self.flush_pending()?;
        }
        self.buf.extend_from_slice(value);
        Ok(())
    }

    fn flush(&mut self) -> Result {
        self.flush_pending()?;
        self.output.flush()?;
        Ok(())
    }

    fn total_bytes_written(&self) -> usize {
        self.flushed + self.buf.len()
    }
}
