//! Peek-and-push byte source used by the sync-scanning framers.

use std::io::{self, ErrorKind, Read};

/// Reads bytes from a reader with the ability to push unused bytes back.
/// Pushed-back bytes are returned in their original stream order.
pub struct Bytes<R> {
    reader: R,
    num_read: usize,
    cache: Vec<u8>,
    buf: [u8; 1],
}

impl<R: Read> Bytes<R> {
    pub fn new(reader: R) -> Self {
        Bytes {
            reader,
            num_read: 0,
            cache: Vec::new(),
            buf: [0u8; 1],
        }
    }

    pub fn next(&mut self) -> io::Result<u8> {
        if !self.cache.is_empty() {
            return Ok(self.cache.remove(0));
        }
        let n = self.reader.read(&mut self.buf)?;
        if n == 0 {
            return Err(io::Error::from(ErrorKind::UnexpectedEof));
        }
        self.num_read += 1;
        Ok(self.buf[0])
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if self.cache.is_empty() {
            self.reader.read_exact(buf)?;
            self.num_read += buf.len();
            return Ok(());
        }
        if self.cache.len() < buf.len() {
            let cached = self.cache.len();
            buf[..cached].copy_from_slice(&self.cache);
            self.cache.clear();
            self.reader.read_exact(&mut buf[cached..])?;
            self.num_read += buf.len() - cached;
            return Ok(());
        }
        buf.copy_from_slice(&self.cache[..buf.len()]);
        self.cache.drain(..buf.len());
        Ok(())
    }

    /// Push bytes back; they will be produced again, in order, before any
    /// further reads from the underlying reader.
    pub fn push(&mut self, dat: &[u8]) {
        let mut restored = dat.to_vec();
        restored.extend_from_slice(&self.cache);
        self.cache = restored;
    }

    pub fn offset(&self) -> usize {
        self.num_read - self.cache.len()
    }

    /// Scan forward until `marker` is found. Returns the number of bytes
    /// skipped before the marker, or `None` on end of stream. The stream
    /// position is left just after the marker.
    pub fn scan_sync(&mut self, marker: &[u8]) -> io::Result<Option<usize>> {
        let mut window = vec![0u8; marker.len()];
        let mut filled = 0usize;
        let mut skipped = 0usize;
        loop {
            let b = match self.next() {
                Ok(b) => b,
                Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
                Err(err) => return Err(err),
            };
            if filled < marker.len() {
                window[filled] = b;
                filled += 1;
            } else {
                window.rotate_left(1);
                *window.last_mut().expect("window is non-empty") = b;
                skipped += 1;
            }
            if filled == marker.len() && window == marker {
                return Ok(Some(skipped));
            }
        }
    }
}
