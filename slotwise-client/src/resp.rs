//! RESP2 reply framing
//!
//! Only what a request/response client needs: the five RESP2 reply types and
//! an incremental decoder over a `BytesMut` read buffer.

use crate::transport::TransportError;
use bytes::{Buf, BytesMut};

/// One raw reply frame as read off the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<Frame>>),
}

impl Frame {
    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }

    /// Append the wire form of this frame to `out`
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Frame::Simple(s) => write_line(out, b'+', s.as_bytes()),
            Frame::Error(s) => write_line(out, b'-', s.as_bytes()),
            Frame::Integer(n) => write_line(out, b':', n.to_string().as_bytes()),
            Frame::Bulk(None) => out.extend_from_slice(b"$-1\r\n"),
            Frame::Bulk(Some(data)) => {
                write_line(out, b'$', data.len().to_string().as_bytes());
                out.extend_from_slice(data);
                out.extend_from_slice(b"\r\n");
            }
            Frame::Array(None) => out.extend_from_slice(b"*-1\r\n"),
            Frame::Array(Some(items)) => {
                write_line(out, b'*', items.len().to_string().as_bytes());
                for item in items {
                    item.encode(out);
                }
            }
        }
    }
}

fn write_line(out: &mut Vec<u8>, tag: u8, body: &[u8]) {
    out.push(tag);
    out.extend_from_slice(body);
    out.extend_from_slice(b"\r\n");
}

/// Incremental frame decoder.
///
/// `decode` consumes one complete frame from the front of the buffer, or
/// leaves the buffer untouched and returns `Ok(None)` when more bytes are
/// needed. Scan progress through an incomplete frame is kept between calls,
/// so a large reply arriving over many reads is walked once.
#[derive(Debug, Default, Clone)]
pub struct FrameDecoder {
    // Offset of the first element header not yet scanned
    scanned: usize,
    // Elements still owed by each open array, innermost last
    open: Vec<i64>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, TransportError> {
        let end = match self.scan(&buf[..]) {
            Ok(Some(end)) => end,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };
        self.reset();
        match parse(&buf[..end], 0)? {
            Some((frame, consumed)) => {
                buf.advance(consumed);
                Ok(Some(frame))
            }
            None => Err(TransportError::Protocol(
                "frame ended before its scanned length".to_string(),
            )),
        }
    }

    /// Forget progress on a partially received frame
    pub fn reset(&mut self) {
        self.scanned = 0;
        self.open.clear();
    }

    /// Advance over complete element headers and payloads. Returns the end
    /// offset once the top-level frame is complete.
    fn scan(&mut self, data: &[u8]) -> Result<Option<usize>, TransportError> {
        loop {
            let pos = self.scanned;
            let Some(&tag) = data.get(pos) else {
                return Ok(None);
            };
            let Some(line_end) = find_crlf(data, pos + 1) else {
                return Ok(None);
            };
            let line = &data[pos + 1..line_end];
            let mut next = line_end + 2;

            match tag {
                b'+' | b'-' => {}
                b':' => {
                    integer(line)?;
                }
                b'$' => {
                    let len = integer(line)?;
                    if len >= 0 {
                        let end = next + len as usize + 2;
                        if data.len() < end {
                            return Ok(None);
                        }
                        next = end;
                    }
                }
                b'*' => {
                    let count = integer(line)?;
                    if count > 0 {
                        self.open.push(count);
                        self.scanned = next;
                        continue;
                    }
                }
                other => return Err(unexpected_tag(other)),
            }
            self.scanned = next;

            loop {
                match self.open.last_mut() {
                    None => return Ok(Some(self.scanned)),
                    Some(remaining) => {
                        *remaining -= 1;
                        if *remaining > 0 {
                            break;
                        }
                        self.open.pop();
                    }
                }
            }
        }
    }
}

fn unexpected_tag(tag: u8) -> TransportError {
    TransportError::Protocol(format!("unexpected frame type byte 0x{tag:02x}"))
}

type Parsed = Option<(Frame, usize)>;

fn parse(data: &[u8], pos: usize) -> Result<Parsed, TransportError> {
    let Some(&tag) = data.get(pos) else {
        return Ok(None);
    };
    let Some(line_end) = find_crlf(data, pos + 1) else {
        return Ok(None);
    };
    let line = &data[pos + 1..line_end];
    let next = line_end + 2;

    match tag {
        b'+' => Ok(Some((Frame::Simple(text(line)), next))),
        b'-' => Ok(Some((Frame::Error(text(line)), next))),
        b':' => Ok(Some((Frame::Integer(integer(line)?), next))),
        b'$' => {
            let len = integer(line)?;
            if len < 0 {
                return Ok(Some((Frame::Bulk(None), next)));
            }
            let end = next + len as usize;
            if data.len() < end + 2 {
                return Ok(None);
            }
            if &data[end..end + 2] != b"\r\n" {
                return Err(TransportError::Protocol(
                    "bulk string not terminated by CRLF".to_string(),
                ));
            }
            Ok(Some((Frame::Bulk(Some(data[next..end].to_vec())), end + 2)))
        }
        b'*' => {
            let count = integer(line)?;
            if count < 0 {
                return Ok(Some((Frame::Array(None), next)));
            }
            let mut items = Vec::with_capacity((count as usize).min(1024));
            let mut cursor = next;
            for _ in 0..count {
                match parse(data, cursor)? {
                    Some((item, after)) => {
                        items.push(item);
                        cursor = after;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((Frame::Array(Some(items)), cursor)))
        }
        other => Err(unexpected_tag(other)),
    }
}

fn find_crlf(data: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|i| from + i)
}

fn text(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

fn integer(line: &[u8]) -> Result<i64, TransportError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| TransportError::Protocol(format!("invalid integer '{}'", text(line))))
}
