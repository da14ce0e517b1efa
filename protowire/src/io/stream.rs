//! An abstraction around the byte sources and sinks consumed by coded readers and writers.
//!
//! Any [`std::io::Read`] is a source and any [`std::io::Write`] is a sink. Both are
//! retried on `Interrupted` so callers only see real failures.

use core::cmp;
use std::io::ErrorKind;
use thiserror::Error;

/// An error type returned when an error occurs while reading from or writing to a stream trait.
///
/// Encountering this error likely means the stream is invalidated and shouldn't continue to be used.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(#[from] std::io::Error);

impl Error {
    /// Gets the underlying IO error
    pub fn get_ref(&self) -> &std::io::Error {
        &self.0
    }

    /// Unwraps the underlying IO error
    pub fn into_inner(self) -> std::io::Error {
        self.0
    }
}

/// The result of reading or writing to a Read or Write instance
pub type Result<T> = core::result::Result<T, Error>;

/// A trait for reading bytes from a source.
///
/// Like the std::io::Read trait, implementors of this trait are called 'readers'.
pub trait Read {
    /// Reads from the input into the specified buffer, returning the number of bytes read.
    /// A return value of 0 means the source is exhausted.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Skips a certain number of bytes from the input, returning the number of bytes actually skipped.
    /// The value returned is only less than `len` if the source was exhausted.
    fn skip(&mut self, mut len: usize) -> Result<usize> {
        const BUF_SIZE: usize = 2 * 1024;

        let mut buf = [0; BUF_SIZE];
        let mut skipped = 0;
        while len != 0 {
            let amnt = cmp::min(len, buf.len());
            let read_len = self.read(&mut buf[..amnt])?;
            if read_len == 0 {
                break;
            }
            len -= read_len;
            skipped += read_len;
        }
        Ok(skipped)
    }
}

impl<T: ?Sized + std::io::Read> Read for T {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match std::io::Read::read(self, buf) {
                Ok(value) => return Ok(value),
                Err(ref err) if err.kind() == ErrorKind::Interrupted => { },
                Err(err) => return Err(Error(err)),
            }
        }
    }
}

/// A trait for writing bytes to a destination.
///
/// Like the std::io::Write trait, implementors of this trait are called 'writers'.
pub trait Write {
    /// Writes all data in the buffer to the output
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Flushes any data held by the destination itself
    fn flush(&mut self) -> Result<()>;
}

impl<T: ?Sized + std::io::Write> Write for T {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.write_all(buf).map_err(Error)
    }

    fn flush(&mut self) -> Result<()> {
        std::io::Write::flush(self).map_err(Error)
    }
}
