use std::io::{self, Read, Result as IoResult, Write};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::sync::{Arc, Mutex, PoisonError};

/// Create a synchronous, zero-capacity byte stream.
///
/// Every write on the [`ConnectorWriter`] blocks until the paired
/// [`ConnectorReader`] has taken the chunk. Dropping the writer shows up as
/// end-of-stream on the reader; dropping the reader makes further writes fail
/// with [`io::ErrorKind::BrokenPipe`].
pub fn connector() -> (ConnectorWriter, ConnectorReader) {
    let (tx, rx) = sync_channel(0);
    (
        ConnectorWriter { tx },
        ConnectorReader {
            rx,
            pending: Vec::new(),
            offset: 0,
        },
    )
}

/// Write end of a [`connector`].
pub struct ConnectorWriter {
    tx: SyncSender<Vec<u8>>,
}

impl ConnectorWriter {
    /// Close the stream. Equivalent to dropping the writer.
    pub fn close(self) {}
}

impl Write for ConnectorWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(data.to_vec())
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

/// Read end of a [`connector`].
pub struct ConnectorReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    offset: usize,
}

impl ConnectorReader {
    /// Read and discard everything until the writer closes.
    pub fn drain(&mut self) -> IoResult<u64> {
        io::copy(self, &mut io::sink())
    }
}

impl Read for ConnectorReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.offset == self.pending.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.offset = 0;
                }
                // Writer gone: end of stream.
                Err(_) => return Ok(0),
            }
        }
        let n = out.len().min(self.pending.len() - self.offset);
        out[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}

/// Memory-backed writer for capturing output.
///
/// Clones share the same buffer, so one handle can be given to a pipeline stage
/// while another is kept to inspect the collected bytes afterwards.
#[derive(Clone, Default)]
pub struct MemWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}
