//! Render Output - Buffered Until Committed
//!
//! Nothing reaches the sink until the buffer passes its limit or the render
//! finishes. After that point the render is committed and can no longer be
//! replaced by a diagnostic page.

use std::io::{self, Write};

pub struct CommitWriter<'w> {
    sink: &'w mut dyn Write,
    buffer: Vec<u8>,
    limit: usize,
    committed: bool,
    written: usize,
}

impl<'w> CommitWriter<'w> {
    pub fn new(sink: &'w mut dyn Write, limit: usize) -> Self {
        Self {
            sink,
            buffer: Vec::new(),
            limit,
            committed: false,
            written: 0,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Bytes accepted so far, buffered or not.
    pub fn bytes_written(&self) -> usize {
        self.written
    }

    pub fn write_str(&mut self, text: &str) -> io::Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.buffer.extend_from_slice(text.as_bytes());
        self.written += text.len();
        if self.buffer.len() > self.limit {
            self.flush_buffer()?;
        }
        Ok(())
    }

    /// Drop everything not yet committed. Returns false once committed.
    pub fn discard(&mut self) -> bool {
        if self.committed {
            return false;
        }
        self.buffer.clear();
        self.written = 0;
        true
    }

    /// Commit whatever is buffered and flush the sink.
    pub fn finish(mut self) -> io::Result<usize> {
        self.flush_buffer()?;
        self.sink.flush()?;
        Ok(self.written)
    }

    fn flush_buffer(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.committed = true;
        self.sink.write_all(&self.buffer)?;
        self.buffer.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_until_finish() {
        let mut sink = Vec::new();
        let mut out = CommitWriter::new(&mut sink, 1024);
        out.write_str("hello ").unwrap();
        out.write_str("world").unwrap();
        assert!(!out.is_committed());
        assert_eq!(out.bytes_written(), 11);
        assert_eq!(out.finish().unwrap(), 11);
        assert_eq!(sink, b"hello world");
    }

    #[test]
    fn test_commit_past_limit() {
        let mut sink = Vec::new();
        let mut out = CommitWriter::new(&mut sink, 4);
        out.write_str("abc").unwrap();
        assert!(!out.is_committed());
        out.write_str("de").unwrap();
        assert!(out.is_committed());
        assert!(!out.discard());
        out.finish().unwrap();
        assert_eq!(sink, b"abcde");
    }

    #[test]
    fn test_discard_before_commit() {
        let mut sink = Vec::new();
        let mut out = CommitWriter::new(&mut sink, 1024);
        out.write_str("partial").unwrap();
        assert!(out.discard());
        assert_eq!(out.bytes_written(), 0);
        out.write_str("replacement").unwrap();
        out.finish().unwrap();
        assert_eq!(sink, b"replacement");
    }

    #[test]
    fn test_zero_limit_commits_on_first_byte() {
        let mut sink = Vec::new();
        let mut out = CommitWriter::new(&mut sink, 0);
        out.write_str("").unwrap();
        assert!(!out.is_committed());
        out.write_str("x").unwrap();
        assert!(out.is_committed());
    }
}
