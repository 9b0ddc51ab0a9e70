//! Splits an inbound byte stream into CRLF- (or bare LF-) terminated lines.

use super::MAX_LINE_LEN;

/// Accumulates bytes read from a socket and yields complete lines.
///
/// Lines longer than [`MAX_LINE_LEN`] are truncated rather than rejected, matching
/// real-world ircd leniency. Empty lines (after trimming a trailing CR) are skipped
/// by the caller, not by the framer, so callers can still observe them if they care.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Feed freshly-read bytes in. Call `next_line` in a loop afterward to drain
    /// whatever complete lines are now available.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete line, if any, as a truncated, CR-trimmed `String`.
    /// Invalid UTF-8 is replaced lossily; IRC is nominally ASCII but clients lie.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop(); // trailing \n
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.len() > MAX_LINE_LEN {
            line.truncate(MAX_LINE_LEN);
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_multiple_lines_in_one_feed() {
        let mut framer = LineFramer::new();
        framer.feed(b"NICK alice\r\nUSER alice * * :Alice\r\n");
        assert_eq!(framer.next_line().as_deref(), Some("NICK alice"));
        assert_eq!(
            framer.next_line().as_deref(),
            Some("USER alice * * :Alice")
        );
        assert_eq!(framer.next_line(), None);
    }

    #[test]
    fn handles_bare_lf() {
        let mut framer = LineFramer::new();
        framer.feed(b"PING hello\n");
        assert_eq!(framer.next_line().as_deref(), Some("PING hello"));
    }

    #[test]
    fn reassembles_split_across_reads() {
        let mut framer = LineFramer::new();
        framer.feed(b"NI");
        assert_eq!(framer.next_line(), None);
        framer.feed(b"CK alice\r\n");
        assert_eq!(framer.next_line().as_deref(), Some("NICK alice"));
    }

    #[test]
    fn truncates_overlong_lines() {
        let mut framer = LineFramer::new();
        let body = "a".repeat(600);
        framer.feed(format!("PRIVMSG #x :{body}\r\n").as_bytes());
        let line = framer.next_line().unwrap();
        assert_eq!(line.len(), MAX_LINE_LEN);
    }

    #[test]
    fn skips_are_caller_responsibility_but_empty_line_is_yielded() {
        let mut framer = LineFramer::new();
        framer.feed(b"\r\nPING x\r\n");
        assert_eq!(framer.next_line().as_deref(), Some(""));
        assert_eq!(framer.next_line().as_deref(), Some("PING x"));
    }
}
