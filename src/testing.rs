//! Scripted mock adapter for exercising routing without a live cluster.
//!
//! Each node gets a queue of scripted replies plus an optional fallback;
//! `CLUSTER SLOTS` probes are answered from a separate per-node script so
//! topology refreshes never consume command replies. Every open, batch
//! execution, and close is recorded for assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::adapter::{
    AdapterOptions, ConnectionAdapter, NodeLink, RedirectKind, Reply,
};
use crate::command::Command;
use crate::errors::{Error, Result};
use crate::proto::frame::Frame;

/// A scripted reply, cloned into a [`Reply`] each time it is served.
#[derive(Debug, Clone)]
pub enum ReplyScript {
    /// Serve these frames as a successful batch result.
    Value(Vec<Frame>),
    /// Serve a redirect hint.
    Redirect {
        /// Redirect kind.
        kind: RedirectKind,
        /// Target host.
        host: String,
        /// Target port.
        port: u16,
    },
    /// Serve a connection error.
    ConnError,
}

impl ReplyScript {
    /// Shorthand for a single-frame value reply.
    pub fn frame(frame: Frame) -> Self {
        ReplyScript::Value(vec![frame])
    }

    /// Shorthand for a MOVED redirect.
    pub fn moved(host: &str, port: u16) -> Self {
        ReplyScript::Redirect {
            kind: RedirectKind::Moved,
            host: host.to_string(),
            port,
        }
    }

    /// Shorthand for an ASK redirect.
    pub fn ask(host: &str, port: u16) -> Self {
        ReplyScript::Redirect {
            kind: RedirectKind::Ask,
            host: host.to_string(),
            port,
        }
    }

    fn materialize(&self) -> Reply {
        match self {
            ReplyScript::Value(frames) => Reply::Value(frames.clone()),
            ReplyScript::Redirect { kind, host, port } => Reply::Redirect {
                kind: *kind,
                host: host.clone(),
                port: *port,
            },
            ReplyScript::ConnError => Reply::ConnError(Error::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "scripted connection error",
                ),
            }),
        }
    }
}

/// One recorded batch execution.
#[derive(Debug, Clone)]
pub struct ExecutedBatch {
    /// Canonical name of the node that served the batch.
    pub node: String,
    /// Rendered commands (`"GET x"`), in batch order.
    pub commands: Vec<String>,
    /// Whether the batch carried the `ASKING` preamble.
    pub asking: bool,
}

#[derive(Default)]
struct MockNode {
    refuse: bool,
    replies: VecDeque<ReplyScript>,
    fallback: Option<ReplyScript>,
    slots: Option<ReplyScript>,
}

#[derive(Default)]
struct MockState {
    nodes: Mutex<HashMap<String, MockNode>>,
    log: Mutex<Vec<ExecutedBatch>>,
    opens: Mutex<Vec<String>>,
    closed: Mutex<Vec<String>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Adapter whose nodes serve scripted replies.
#[derive(Clone, Default)]
pub struct MockAdapter {
    state: Arc<MockState>,
}

impl MockAdapter {
    /// Creates an adapter with no scripted nodes.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_node<R>(&self, node: &str, f: impl FnOnce(&mut MockNode) -> R) -> R {
        let mut nodes = locked(&self.state.nodes);
        f(nodes.entry(node.to_string()).or_default())
    }

    /// Queues one scripted reply on a node.
    pub fn script(&self, node: &str, reply: ReplyScript) {
        self.with_node(node, |n| n.replies.push_back(reply));
    }

    /// Sets the reply a node serves once its queue is empty.
    pub fn fallback(&self, node: &str, reply: ReplyScript) {
        self.with_node(node, |n| n.fallback = Some(reply));
    }

    /// Makes every connection attempt to a node fail.
    pub fn refuse(&self, node: &str) {
        self.with_node(node, |n| n.refuse = true);
    }

    /// Scripts the node's `CLUSTER SLOTS` reply from `(start, end, host,
    /// port)` ranges. Unscripted nodes answer probes with a connection
    /// error.
    pub fn slots_reply(&self, node: &str, layout: &[(u16, u16, &str, u16)]) {
        let ranges = layout
            .iter()
            .map(|(start, end, host, port)| {
                Frame::Array(vec![
                    Frame::Integer(i64::from(*start)),
                    Frame::Integer(i64::from(*end)),
                    Frame::Array(vec![
                        Frame::bulk(host.to_string()),
                        Frame::Integer(i64::from(*port)),
                    ]),
                ])
            })
            .collect();
        self.with_node(node, |n| {
            n.slots = Some(ReplyScript::frame(Frame::Array(ranges)));
        });
    }

    /// Scripts a raw `CLUSTER SLOTS` reply (for misbehaving-node tests).
    pub fn slots_script(&self, node: &str, reply: ReplyScript) {
        self.with_node(node, |n| n.slots = Some(reply));
    }

    /// Returns every recorded batch execution, probes included.
    pub fn log(&self) -> Vec<ExecutedBatch> {
        locked(&self.state.log).clone()
    }

    /// Returns recorded executions of regular commands (probes excluded).
    pub fn command_log(&self) -> Vec<ExecutedBatch> {
        self.log()
            .into_iter()
            .filter(|entry| !entry.commands.iter().any(|c| c.starts_with("CLUSTER")))
            .collect()
    }

    /// Returns how many `CLUSTER SLOTS` probes were served.
    pub fn probe_count(&self) -> usize {
        self.log().len() - self.command_log().len()
    }

    /// Returns how often a node was opened.
    pub fn open_count(&self, node: &str) -> usize {
        locked(&self.state.opens)
            .iter()
            .filter(|name| name.as_str() == node)
            .count()
    }

    /// Returns every node open, in order.
    pub fn opens(&self) -> Vec<String> {
        locked(&self.state.opens).clone()
    }

    /// Returns the nodes whose links were closed, in order.
    pub fn closed(&self) -> Vec<String> {
        locked(&self.state.closed).clone()
    }
}

#[async_trait]
impl ConnectionAdapter for MockAdapter {
    fn keys_of(&self, command: &Command) -> Vec<String> {
        crate::adapter::redis::key_arguments(command)
    }

    async fn open(
        &self,
        host: &str,
        port: u16,
        _options: &AdapterOptions,
    ) -> Result<Box<dyn NodeLink>> {
        let node = format!("{}:{}", host, port);
        let refuse = self.with_node(&node, |n| n.refuse);
        locked(&self.state.opens).push(node.clone());
        if refuse {
            return Err(Error::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    format!("connection refused: {}", node),
                ),
            });
        }
        Ok(Box::new(MockLink {
            node,
            state: self.state.clone(),
        }))
    }
}

struct MockLink {
    node: String,
    state: Arc<MockState>,
}

#[async_trait]
impl NodeLink for MockLink {
    async fn execute(&self, commands: &[Command], asking: bool) -> Reply {
        let rendered = commands
            .iter()
            .map(|cmd| {
                let mut text = cmd.name().to_string();
                for arg in cmd.args() {
                    text.push(' ');
                    text.push_str(&String::from_utf8_lossy(arg));
                }
                text
            })
            .collect::<Vec<_>>();
        locked(&self.state.log).push(ExecutedBatch {
            node: self.node.clone(),
            commands: rendered,
            asking,
        });

        let is_probe = commands
            .first()
            .is_some_and(|cmd| cmd.name().eq_ignore_ascii_case("CLUSTER"));

        let mut nodes = locked(&self.state.nodes);
        let entry = nodes.entry(self.node.clone()).or_default();
        let script = if is_probe {
            entry.slots.clone().unwrap_or(ReplyScript::ConnError)
        } else if let Some(front) = entry.replies.pop_front() {
            front
        } else if let Some(fallback) = entry.fallback.clone() {
            fallback
        } else {
            ReplyScript::Value(vec![
                Frame::SimpleString("OK".to_string());
                commands.len()
            ])
        };
        script.materialize()
    }

    async fn close(&self) {
        locked(&self.state.closed).push(self.node.clone());
    }
}
