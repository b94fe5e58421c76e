//! `Content-Length` message framing for the stdio transport.
//!
//! Bytes arrive in arbitrary chunks. [`FrameDecoder`] buffers them and yields
//! complete bodies; it never waits for more than is already buffered.

/// Header blocks larger than this without a terminator are discarded.
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Bodies declaring a larger `Content-Length` are skipped unread.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("frame header has no valid Content-Length: {0:?}")]
    MissingContentLength(String),
    #[error("frame header exceeds {0} bytes without a terminator")]
    HeaderTooLarge(usize),
    #[error("frame body of {0} bytes exceeds the {limit} byte limit", limit = MAX_BODY_BYTES)]
    BodyTooLarge(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    AwaitingHeader,
    AwaitingBody { len: usize },
    Discarding { remaining: usize },
}

#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    state: DecodeState,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            state: DecodeState::AwaitingHeader,
        }
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes held that do not yet form a complete frame. An oversized body
    /// being skipped is never buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Next complete frame body, if one is buffered.
    ///
    /// A header without a usable `Content-Length` is dropped and reported as an
    /// error; the following call resumes at the next header.
    pub fn next_frame(&mut self) -> Option<Result<Vec<u8>, FramingError>> {
        loop {
            match self.state {
                DecodeState::AwaitingHeader => {
                    let leading = self
                        .buf
                        .iter()
                        .take_while(|b| **b == b'\r' || **b == b'\n')
                        .count();
                    self.buf.drain(..leading);

                    let Some((end, terminator)) = find_header_end(&self.buf) else {
                        if self.buf.len() > MAX_HEADER_BYTES {
                            self.buf.clear();
                            return Some(Err(FramingError::HeaderTooLarge(MAX_HEADER_BYTES)));
                        }
                        return None;
                    };

                    let header = String::from_utf8_lossy(&self.buf[..end]).into_owned();
                    self.buf.drain(..end + terminator);
                    match content_length(&header) {
                        Some(len) if len > MAX_BODY_BYTES => {
                            self.state = DecodeState::Discarding { remaining: len };
                            return Some(Err(FramingError::BodyTooLarge(len)));
                        }
                        Some(len) => self.state = DecodeState::AwaitingBody { len },
                        None => return Some(Err(FramingError::MissingContentLength(header))),
                    }
                }
                DecodeState::Discarding { remaining } => {
                    let skip = remaining.min(self.buf.len());
                    self.buf.drain(..skip);
                    if skip < remaining {
                        self.state = DecodeState::Discarding {
                            remaining: remaining - skip,
                        };
                        return None;
                    }
                    self.state = DecodeState::AwaitingHeader;
                }
                DecodeState::AwaitingBody { len } => {
                    if self.buf.len() < len {
                        return None;
                    }
                    let body: Vec<u8> = self.buf.drain(..len).collect();
                    self.state = DecodeState::AwaitingHeader;
                    return Some(Ok(body));
                }
            }
        }
    }
}

/// Position and length of the blank line ending the header block.
fn find_header_end(buf: &[u8]) -> Option<(usize, usize)> {
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn content_length(header: &str) -> Option<usize> {
    header.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Frame a body for writing.
pub fn encode_frame(body: &[u8]) -> Vec<u8> {
    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(body);
    frame
}
