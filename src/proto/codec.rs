use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::errors::{Error, Result};
use crate::proto::frame::Frame;

// A reply larger than this is treated as a protocol violation rather than
// buffered indefinitely.
const MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

/// Streaming frame codec.
///
/// Bytes arrive incrementally via [`push`](FrameCodec::push); complete
/// frames come back out of [`decode`](FrameCodec::decode), which returns
/// `Ok(None)` until enough data has accumulated.
///
/// # Example
///
/// ```
/// use slotwise::proto::codec::FrameCodec;
/// use slotwise::proto::frame::Frame;
///
/// let mut codec = FrameCodec::new();
/// codec.push(b"+OK\r\n");
/// let frame = codec.decode().unwrap().unwrap();
/// assert_eq!(frame, Frame::SimpleString("OK".to_string()));
/// ```
#[derive(Debug, Default)]
pub struct FrameCodec {
    buf: BytesMut,
}

impl FrameCodec {
    /// Creates a codec with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes received from the network.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Attempts to decode one complete frame from the buffer.
    pub fn decode(&mut self) -> Result<Option<Frame>> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        if self.buf.len() > MAX_FRAME_SIZE {
            return Err(protocol("frame exceeds maximum size"));
        }

        let mut pos = 0;
        match parse_frame(&self.buf, &mut pos)? {
            Some(frame) => {
                self.buf.advance(pos);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Encodes a frame onto an output buffer.
    pub fn encode(frame: &Frame, out: &mut BytesMut) {
        match frame {
            Frame::SimpleString(text) => {
                out.put_u8(b'+');
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Frame::Error(text) => {
                out.put_u8(b'-');
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Frame::Integer(value) => {
                out.put_u8(b':');
                out.extend_from_slice(value.to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Frame::BulkString(Some(data)) => {
                out.put_u8(b'$');
                out.extend_from_slice(data.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(data);
                out.extend_from_slice(b"\r\n");
            }
            Frame::BulkString(None) | Frame::Null => {
                out.extend_from_slice(b"$-1\r\n");
            }
            Frame::Array(items) => {
                out.put_u8(b'*');
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    Self::encode(item, out);
                }
            }
        }
    }
}

// Parses one frame starting at `*pos`, advancing `*pos` past it. Returns
// Ok(None) when the buffer ends before the frame does.
fn parse_frame(buf: &[u8], pos: &mut usize) -> Result<Option<Frame>> {
    let Some(line) = read_line(buf, pos) else {
        return Ok(None);
    };
    if line.is_empty() {
        return Err(protocol("empty frame header"));
    }

    let (tag, body) = (line[0], &line[1..]);
    match tag {
        b'+' => Ok(Some(Frame::SimpleString(lossy(body)))),
        b'-' => Ok(Some(Frame::Error(lossy(body)))),
        b':' => {
            let value = parse_int(body)?;
            Ok(Some(Frame::Integer(value)))
        }
        b'$' => {
            let len = parse_int(body)?;
            if len < 0 {
                return Ok(Some(Frame::BulkString(None)));
            }
            let len = len as usize;
            if len > MAX_FRAME_SIZE {
                return Err(protocol("bulk string exceeds maximum size"));
            }
            if buf.len() < *pos + len + 2 {
                return Ok(None);
            }
            let data = Bytes::copy_from_slice(&buf[*pos..*pos + len]);
            *pos += len + 2;
            Ok(Some(Frame::BulkString(Some(data))))
        }
        b'*' => {
            let len = parse_int(body)?;
            if len < 0 {
                return Ok(Some(Frame::Null));
            }
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                match parse_frame(buf, pos)? {
                    Some(item) => items.push(item),
                    None => return Ok(None),
                }
            }
            Ok(Some(Frame::Array(items)))
        }
        other => Err(protocol(&format!("unknown frame tag: {}", other as char))),
    }
}

// Returns the line starting at `*pos` without its CRLF terminator, and
// advances `*pos` past the terminator. None when no CRLF is buffered yet.
fn read_line<'a>(buf: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    let start = *pos;
    let mut i = start;
    while i + 1 < buf.len() {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            *pos = i + 2;
            return Some(&buf[start..i]);
        }
        i += 1;
    }
    None
}

fn parse_int(body: &[u8]) -> Result<i64> {
    std::str::from_utf8(body)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| protocol("malformed integer in frame header"))
}

fn lossy(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

fn protocol(message: &str) -> Error {
    Error::Protocol {
        message: message.to_string(),
    }
}
