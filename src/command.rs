//! Command construction.
//!
//! A [`Command`] is an ordered name + argument tuple; free functions build
//! the common ones. Anything not covered here goes through
//! [`Command::new`] and routes exactly the same way.

use bytes::Bytes;

use crate::proto::frame::Frame;

/// A command ready to be routed to a cluster node.
///
/// Commands keep their name and arguments separate until dispatch so the
/// adapter can inspect key arguments for slot derivation.
///
/// # Example
///
/// ```
/// use slotwise::Command;
///
/// let cmd = Command::new("SET").arg("key").arg("value");
/// assert_eq!(cmd.name(), "SET");
/// ```
#[derive(Debug, Clone)]
pub struct Command {
    name: String,
    args: Vec<Bytes>,
}

impl Command {
    /// Creates a new command with the given name.
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Appends an argument to the command.
    #[inline]
    pub fn arg<T: Into<Bytes>>(mut self, arg: T) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Returns the command name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the command arguments.
    #[inline]
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Encodes the command as a wire-level array frame.
    pub fn to_frame(&self) -> Frame {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(Frame::BulkString(Some(Bytes::from(self.name.clone()))));
        parts.extend(
            self.args
                .iter()
                .map(|arg| Frame::BulkString(Some(arg.clone()))),
        );
        Frame::Array(parts)
    }
}

/// Creates a GET command.
#[inline]
pub fn get(key: impl Into<Bytes>) -> Command {
    Command::new("GET").arg(key)
}

/// Creates a SET command.
#[inline]
pub fn set(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Command {
    Command::new("SET").arg(key).arg(value)
}

/// Creates a DEL command for a single key.
#[inline]
pub fn del(key: impl Into<Bytes>) -> Command {
    Command::new("DEL").arg(key)
}

/// Creates an EXISTS command for a single key.
#[inline]
pub fn exists(key: impl Into<Bytes>) -> Command {
    Command::new("EXISTS").arg(key)
}

/// Creates a KEYS command.
#[inline]
pub fn keys(pattern: impl Into<Bytes>) -> Command {
    Command::new("KEYS").arg(pattern)
}

/// Creates an INFO command.
#[inline]
pub fn info() -> Command {
    Command::new("INFO")
}

/// Creates a FLUSHDB command.
#[inline]
pub fn flushdb() -> Command {
    Command::new("FLUSHDB")
}

/// Creates a PING command.
#[inline]
pub fn ping() -> Command {
    Command::new("PING")
}

/// Creates a MULTI command.
#[inline]
pub fn multi() -> Command {
    Command::new("MULTI")
}

/// Creates an EXEC command.
#[inline]
pub fn exec() -> Command {
    Command::new("EXEC")
}

/// Creates an ASKING directive.
#[inline]
pub fn asking() -> Command {
    Command::new("ASKING")
}

/// Creates the topology probe command.
#[inline]
pub fn cluster_slots() -> Command {
    Command::new("CLUSTER").arg("SLOTS")
}
