use bytes::Bytes;

/// A single protocol frame.
///
/// Covers the reply types a cluster node can produce: status strings,
/// errors, integers, binary-safe bulk strings, arrays, and the null reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Status reply (`+OK`).
    SimpleString(String),
    /// Error reply (`-MOVED 3999 10.0.0.2:6379`).
    Error(String),
    /// Integer reply (`:1000`).
    Integer(i64),
    /// Bulk string reply; `None` is the null bulk string.
    BulkString(Option<Bytes>),
    /// Array reply.
    Array(Vec<Frame>),
    /// Null array reply.
    Null,
}

impl Frame {
    /// Builds a bulk string frame.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Frame::BulkString(Some(data.into()))
    }

    /// Returns the error text when this frame is an error reply.
    pub fn as_error(&self) -> Option<&str> {
        match self {
            Frame::Error(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the bulk payload when this frame is a non-null bulk string.
    pub fn as_bulk(&self) -> Option<&Bytes> {
        match self {
            Frame::BulkString(Some(data)) => Some(data),
            _ => None,
        }
    }

    /// Returns the integer value when this frame is an integer reply.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Frame::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the elements when this frame is an array reply.
    pub fn as_array(&self) -> Option<&[Frame]> {
        match self {
            Frame::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns true for the null bulk string and null array replies.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null | Frame::BulkString(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_error() {
        let frame = Frame::Error("ERR wrong type".to_string());
        assert_eq!(frame.as_error(), Some("ERR wrong type"));
        assert_eq!(Frame::Integer(1).as_error(), None);
    }

    #[test]
    fn test_as_bulk() {
        let frame = Frame::bulk("hello");
        assert_eq!(frame.as_bulk(), Some(&Bytes::from("hello")));
        assert_eq!(Frame::BulkString(None).as_bulk(), None);
    }

    #[test]
    fn test_is_null() {
        assert!(Frame::Null.is_null());
        assert!(Frame::BulkString(None).is_null());
        assert!(!Frame::bulk("x").is_null());
    }
}
