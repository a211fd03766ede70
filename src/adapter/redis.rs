//! Built-in RESP-over-TCP adapter.

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::adapter::{parse_redirect, AdapterOptions, ConnectionAdapter, NodeLink, Reply};
use crate::command::{self, Command};
use crate::errors::{Error, Result};
use crate::proto::codec::FrameCodec;
use crate::proto::frame::Frame;

/// Adapter speaking RESP2 over plain TCP.
///
/// One [`NodeLink`] wraps one socket; batch execution serializes on an
/// internal mutex so replies stay paired with their commands.
#[derive(Debug, Default)]
pub struct RedisAdapter;

impl RedisAdapter {
    /// Creates the adapter.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConnectionAdapter for RedisAdapter {
    fn keys_of(&self, command: &Command) -> Vec<String> {
        key_arguments(command)
    }

    async fn open(
        &self,
        host: &str,
        port: u16,
        options: &AdapterOptions,
    ) -> Result<Box<dyn NodeLink>> {
        let connect = TcpStream::connect((host, port));
        let stream = match options.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| timeout_error("connect timeout"))??,
            None => connect.await?,
        };

        Ok(Box::new(RedisLink {
            io: Mutex::new(RespStream {
                stream,
                codec: FrameCodec::new(),
                read_timeout: options.read_timeout,
                write_timeout: options.write_timeout,
            }),
        }))
    }
}

/// Returns the key arguments of a command, in argument order.
///
/// Commands absent from the keyless and multi-key tables take their first
/// argument as the key, which covers the single-key bulk of the command
/// set. Keyless commands yield an empty list and are rejected by slot
/// derivation; they belong on the fan-out path.
pub(crate) fn key_arguments(command: &Command) -> Vec<String> {
    let name = command.name().to_ascii_uppercase();
    let args = command.args();
    let arg_str = |index: usize| String::from_utf8_lossy(&args[index]).into_owned();

    match name.as_str() {
        "MGET" | "DEL" | "UNLINK" | "EXISTS" | "TOUCH" | "WATCH" | "PFCOUNT" | "PFMERGE"
        | "SUNION" | "SINTER" | "SDIFF" => (0..args.len()).map(arg_str).collect(),
        "MSET" | "MSETNX" => (0..args.len()).step_by(2).map(arg_str).collect(),
        "PING" | "ECHO" | "TIME" | "MULTI" | "EXEC" | "DISCARD" | "ASKING" | "AUTH"
        | "SELECT" | "INFO" | "KEYS" | "SCAN" | "DBSIZE" | "FLUSHDB" | "FLUSHALL"
        | "CLUSTER" | "CLIENT" | "CONFIG" | "COMMAND" | "READONLY" | "READWRITE"
        | "SHUTDOWN" | "SCRIPT" => Vec::new(),
        _ if !args.is_empty() => vec![arg_str(0)],
        _ => Vec::new(),
    }
}

struct RespStream {
    stream: TcpStream,
    codec: FrameCodec,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl RespStream {
    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let write = self.stream.write_all(data);
        match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .map_err(|_| timeout_error("write timeout"))??,
            None => write.await?,
        }
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.codec.decode()? {
                return Ok(frame);
            }

            let mut buf = [0u8; 4096];
            let read = self.stream.read(&mut buf);
            let n = match self.read_timeout {
                Some(limit) => tokio::time::timeout(limit, read)
                    .await
                    .map_err(|_| timeout_error("read timeout"))??,
                None => read.await?,
            };
            if n == 0 {
                return Err(Error::Io {
                    source: std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed by peer",
                    ),
                });
            }
            self.codec.push(&buf[..n]);
        }
    }
}

struct RedisLink {
    io: Mutex<RespStream>,
}

impl RedisLink {
    async fn try_execute(&self, commands: &[Command], asking: bool) -> Result<Reply> {
        let mut io = self.io.lock().await;

        let mut out = BytesMut::new();
        if asking {
            FrameCodec::encode(&command::asking().to_frame(), &mut out);
        }
        for cmd in commands {
            FrameCodec::encode(&cmd.to_frame(), &mut out);
        }
        io.write_all(&out).await?;

        // Read every expected reply before classifying so a redirect in the
        // middle of a batch cannot leave unread frames on the stream.
        let preamble = usize::from(asking);
        let mut frames = Vec::with_capacity(commands.len() + preamble);
        for _ in 0..commands.len() + preamble {
            frames.push(io.read_frame().await?);
        }

        for frame in &frames {
            if let Some(text) = frame.as_error() {
                if let Some((kind, host, port)) = parse_redirect(text) {
                    return Ok(Reply::Redirect { kind, host, port });
                }
            }
        }

        Ok(Reply::Value(frames.split_off(preamble)))
    }
}

#[async_trait]
impl NodeLink for RedisLink {
    async fn execute(&self, commands: &[Command], asking: bool) -> Reply {
        match self.try_execute(commands, asking).await {
            Ok(reply) => reply,
            Err(err) => Reply::ConnError(err),
        }
    }

    async fn close(&self) {
        let mut io = self.io.lock().await;
        let _ = io.stream.shutdown().await;
    }
}

fn timeout_error(what: &str) -> Error {
    Error::Io {
        source: std::io::Error::new(std::io::ErrorKind::TimedOut, what),
    }
}
