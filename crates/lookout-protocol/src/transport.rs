//! Content-Length message framing for CDP traffic over byte streams.
//!
//! Each frame is `Content-Length: <n>\r\n\r\n` followed by `n` bytes of
//! UTF-8 JSON. Frames are kept as strings because the adapter consumes
//! raw JSON text.

use crate::error::ProtocolError;

const HEADER_SEPARATOR: &[u8] = b"\r\n\r\n";

/// Frame a JSON message body.
pub fn encode_message(body: &str) -> Vec<u8> {
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut buf = Vec::with_capacity(header.len() + body.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(body.as_bytes());
    buf
}

/// Incremental decoder for a stream of framed messages.
///
/// Bytes are appended with [`FrameDecoder::push`] as they arrive; complete
/// frames are taken out with [`FrameDecoder::next_frame`].
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet returned as a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Take the next complete frame, or `Ok(None)` if more bytes are needed.
    ///
    /// # Errors
    ///
    /// A malformed header or a non-UTF-8 body is reported as
    /// [`ProtocolError::Transport`]; the stream cannot be resynchronised
    /// after that.
    pub fn next_frame(&mut self) -> Result<Option<String>, ProtocolError> {
        let Some(sep) = find(&self.buf, HEADER_SEPARATOR) else {
            return Ok(None);
        };
        let header = std::str::from_utf8(&self.buf[..sep])
            .map_err(|e| ProtocolError::Transport(format!("invalid UTF-8 in header: {e}")))?;
        let length = parse_content_length(header)?;

        let body_start = sep + HEADER_SEPARATOR.len();
        let body_end = body_start + length;
        if self.buf.len() < body_end {
            return Ok(None);
        }

        let body = String::from_utf8(self.buf[body_start..body_end].to_vec())
            .map_err(|e| ProtocolError::Transport(format!("invalid UTF-8 in body: {e}")))?;
        self.buf.drain(..body_end);
        Ok(Some(body))
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_content_length(header: &str) -> Result<usize, ProtocolError> {
    header
        .split("\r\n")
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim())
        })
        .ok_or_else(|| ProtocolError::Transport("missing Content-Length header".into()))?
        .parse::<usize>()
        .map_err(|e| ProtocolError::Transport(format!("invalid Content-Length: {e}")))
}
