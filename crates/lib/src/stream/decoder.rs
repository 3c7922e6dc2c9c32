//! Byte chunks to complete text lines.
//!
//! Buffering happens at the byte level so a multi-byte UTF-8 sequence split across two chunks
//! is only decoded once the whole line has arrived. A `\n` byte never occurs inside a
//! multi-byte sequence, so every complete line is whole UTF-8 (or genuinely invalid input,
//! which is decoded lossily).

/// Splits arriving response-body chunks into lines, keeping the unterminated tail for the next chunk.
///
/// The tail buffer is unbounded: a peer that never sends `\n` grows it until the body ends.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    pending: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns every line completed by it, in order, without the terminator.
    /// A trailing `\r` is stripped so `\r\n` framed streams decode the same as `\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut scan_from = self.pending.len();
        self.pending.extend_from_slice(chunk);
        while let Some(offset) = self.pending[scan_from..].iter().position(|&b| b == b'\n') {
            let end = scan_from + offset;
            let mut line: Vec<u8> = self.pending.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
            scan_from = 0;
        }
        lines
    }

    /// Bytes currently held back waiting for a terminator.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// End of stream: an unterminated tail is never processed. Returns how many bytes were dropped.
    pub fn finish(&mut self) -> usize {
        let dropped = self.pending.len();
        if dropped > 0 {
            log::debug!("stream: discarding {} byte(s) of unterminated trailing line", dropped);
        }
        self.pending.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_complete_lines_and_keeps_tail() {
        let mut d = ChunkDecoder::new();
        assert_eq!(d.push(b"data: a\n\ndata: b"), vec!["data: a", ""]);
        assert_eq!(d.buffered(), 7);
        assert_eq!(d.push(b"c\n"), vec!["data: bc"]);
        assert_eq!(d.buffered(), 0);
    }

    #[test]
    fn tail_without_newline_keeps_growing_until_finish() {
        let mut d = ChunkDecoder::new();
        for _ in 0..64 {
            assert!(d.push(b"data: xxxxxxxx").is_empty());
        }
        assert_eq!(d.buffered(), 64 * 14);
        assert_eq!(d.finish(), 64 * 14);
        assert_eq!(d.buffered(), 0);
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let text = "data: 思考\n".as_bytes();
        // cut inside the first three-byte character
        let (a, b) = text.split_at(8);
        let mut d = ChunkDecoder::new();
        assert!(d.push(a).is_empty());
        assert_eq!(d.push(b), vec!["data: 思考"]);
    }

    #[test]
    fn crlf_terminators_are_stripped() {
        let mut d = ChunkDecoder::new();
        assert_eq!(d.push(b"one\r\ntwo\r"), vec!["one"]);
        assert_eq!(d.push(b"\n"), vec!["two"]);
    }

    #[test]
    fn unterminated_tail_is_discarded_on_finish() {
        let mut d = ChunkDecoder::new();
        assert!(d.push(b"data: {\"type\":\"end\"}").is_empty());
        assert_eq!(d.finish(), 20);
        assert_eq!(d.buffered(), 0);
        assert!(d.push(b"\n").iter().all(|l| l.is_empty()));
    }

    #[test]
    fn empty_chunk_yields_nothing() {
        let mut d = ChunkDecoder::new();
        assert!(d.push(b"").is_empty());
        assert_eq!(d.finish(), 0);
    }
}
