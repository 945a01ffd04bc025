//! Reassembly of transport reads into protocol lines.
//!
//! Serial reads return arbitrary slices of the byte stream. [`LineBuffer`]
//! accumulates them and hands out complete lines. Either CR or LF ends a
//! line and runs of CR/LF count as one terminator, so empty lines never
//! reach the decoder.

use bytes::{Bytes, BytesMut};

/// Longest line the controller emits is well under this.
pub const MAX_LINE_LENGTH: usize = 1024;

#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: BytesMut,
    /// Bytes discarded because no terminator arrived in time.
    overflowed: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        LineBuffer {
            buffer: BytesMut::with_capacity(MAX_LINE_LENGTH),
            overflowed: 0,
        }
    }

    /// Append received bytes.
    ///
    /// If the unterminated tail grows past [`MAX_LINE_LENGTH`] it is dropped.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        let has_terminator = self.buffer.iter().any(|&b| is_terminator(b));
        if !has_terminator && self.buffer.len() > MAX_LINE_LENGTH {
            tracing::warn!(
                len = self.buffer.len(),
                "no line terminator within {MAX_LINE_LENGTH} bytes, discarding"
            );
            self.overflowed += self.buffer.len();
            self.buffer.clear();
        }
    }

    /// Take the next complete, non-empty line without its terminator.
    pub fn next_line(&mut self) -> Option<Bytes> {
        loop {
            let end = self.buffer.iter().position(|&b| is_terminator(b))?;
            let line = self.buffer.split_to(end).freeze();
            let skip = self
                .buffer
                .iter()
                .take_while(|&&b| is_terminator(b))
                .count();
            let _ = self.buffer.split_to(skip);
            if !line.is_empty() {
                return Some(line);
            }
        }
    }

    /// Number of buffered bytes not yet returned as a line.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes thrown away by overflow protection.
    pub fn overflowed(&self) -> usize {
        self.overflowed
    }
}

fn is_terminator(b: u8) -> bool {
    b == b'\r' || b == b'\n'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_newline() {
        let mut buf = LineBuffer::new();
        buf.push(b"<-5/2\n<+\n");
        assert_eq!(buf.next_line().as_deref(), Some(&b"<-5/2"[..]));
        assert_eq!(buf.next_line().as_deref(), Some(&b"<+"[..]));
        assert_eq!(buf.next_line(), None);
        assert_eq!(buf.buffered_len(), 0);
    }

    #[test]
    fn reassembles_partial_reads() {
        let mut buf = LineBuffer::new();
        buf.push(b"<A1:27598:9:0,6,");
        assert_eq!(buf.next_line(), None);
        buf.push(b"102,3,112,0,0,0,6\r");
        assert_eq!(
            buf.next_line().as_deref(),
            Some(&b"<A1:27598:9:0,6,102,3,112,0,0,0,6"[..])
        );
    }

    #[test]
    fn collapses_crlf_runs_and_skips_empty_lines() {
        let mut buf = LineBuffer::new();
        buf.push(b"\r\n\r\nfirst\r\n\r\nsecond\n");
        assert_eq!(buf.next_line().as_deref(), Some(&b"first"[..]));
        assert_eq!(buf.next_line().as_deref(), Some(&b"second"[..]));
        assert_eq!(buf.next_line(), None);
    }

    #[test]
    fn keeps_unterminated_tail() {
        let mut buf = LineBuffer::new();
        buf.push(b"done\npart");
        assert_eq!(buf.next_line().as_deref(), Some(&b"done"[..]));
        assert_eq!(buf.next_line(), None);
        assert_eq!(buf.buffered_len(), 4);
    }

    #[test]
    fn passes_invalid_utf8_through() {
        let mut buf = LineBuffer::new();
        buf.push(b"@-\xff\xfe\n");
        assert_eq!(buf.next_line().as_deref(), Some(&b"@-\xff\xfe"[..]));
    }

    #[test]
    fn discards_runaway_line() {
        let mut buf = LineBuffer::new();
        buf.push(&vec![b'x'; MAX_LINE_LENGTH + 1]);
        assert_eq!(buf.buffered_len(), 0);
        assert_eq!(buf.overflowed(), MAX_LINE_LENGTH + 1);

        buf.push(b"<+\n");
        assert_eq!(buf.next_line().as_deref(), Some(&b"<+"[..]));
    }
}
