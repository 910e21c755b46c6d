//! Length-prefixed framing: `#<decimal-length>\n<body>` repeated back to back.
//!
//! The length counts UTF-8 bytes of the body. Decoding is incremental: feed
//! arbitrary chunks with [`FrameCodec::append`] and drain with
//! [`FrameCodec::try_read_message`] until it yields `None`.

use crate::error::FrameError;

/// Buffered bytes without a newline after which a header is reported as
/// suspicious.
pub const HEADER_SLACK: usize = 32;

/// Buffered bytes without a newline after which the stream is abandoned.
pub const MAX_HEADER_BYTES: usize = 64;

#[derive(Debug, Default)]
pub struct FrameCodec {
    buf: Vec<u8>,
    anomalies: u64,
    long_header_reported: bool,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes received but not yet consumed by a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Number of malformed headers skipped so far.
    pub fn anomalies(&self) -> u64 {
        self.anomalies
    }

    /// Decode at most one frame.
    ///
    /// Returns `Ok(None)` when more input is needed. Malformed headers are
    /// skipped and counted; only an unbounded header or a non UTF-8 body is an
    /// error.
    pub fn try_read_message(&mut self) -> Result<Option<String>, FrameError> {
        loop {
            // `#0\n` is the shortest possible frame.
            if self.buf.len() < 3 {
                return Ok(None);
            }

            let Some(newline) = self.buf.iter().position(|&b| b == b'\n') else {
                if self.buf.len() > MAX_HEADER_BYTES {
                    return Err(FrameError::HeaderTooLong {
                        buffered: self.buf.len(),
                        limit: MAX_HEADER_BYTES,
                    });
                }
                if self.buf.len() > HEADER_SLACK && !self.long_header_reported {
                    self.long_header_reported = true;
                    self.note_anomaly("frame header has no terminating newline yet");
                }
                return Ok(None);
            };
            self.long_header_reported = false;

            if newline == 0 {
                self.note_anomaly("empty frame header");
                self.buf.drain(..1);
                continue;
            }

            let hash = match self.buf.iter().position(|&b| b == b'#') {
                Some(hash) if hash < newline => hash,
                Some(hash) => {
                    // The line before the next `#` is junk; keep the `#` since it
                    // most likely starts the next frame.
                    self.note_anomaly("frame header without `#` marker");
                    self.buf.drain(..hash);
                    continue;
                }
                None => {
                    self.note_anomaly("frame header without `#` marker");
                    self.buf.drain(..=newline);
                    continue;
                }
            };
            if hash > 0 {
                self.note_anomaly("garbage before frame header");
            }

            let length = std::str::from_utf8(&self.buf[hash + 1..newline])
                .ok()
                .and_then(|digits| digits.trim().parse::<usize>().ok());
            let end = length.and_then(|length| (newline + 1).checked_add(length));
            let (Some(length), Some(end)) = (length, end) else {
                self.note_anomaly("frame length is not a decimal integer");
                self.buf.drain(..=newline);
                continue;
            };

            if self.buf.len() < end {
                return Ok(None);
            }

            let body = self.buf[newline + 1..end].to_vec();
            self.buf.drain(..end);
            debug_assert_eq!(body.len(), length);
            return String::from_utf8(body)
                .map(Some)
                .map_err(|_| FrameError::InvalidUtf8);
        }
    }

    fn note_anomaly(&mut self, what: &'static str) {
        self.anomalies += 1;
        tracing::warn!(
            target: "mobdebug.wire",
            anomaly = what,
            buffered = self.buf.len(),
            "debuggee protocol anomaly"
        );
    }
}

/// Frame `message` for the wire.
pub fn encode(message: &str) -> Vec<u8> {
    let header = format!("#{}\n", message.len());
    let mut out = Vec::with_capacity(header.len() + message.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(message.as_bytes());
    out
}
