//! The pluggable connection adapter seam.
//!
//! The router knows nothing about sockets or wire encoding; it hands a
//! batch of [`Command`]s to a [`NodeLink`] and acts on the resulting
//! [`Reply`] classification. Adapters are selected by symbolic name through
//! a process-wide registry; the built-in `"redis"` adapter speaks RESP over
//! TCP.

pub(crate) mod redis;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::command::Command;
use crate::errors::{Error, Result};
use crate::proto::frame::Frame;

pub use redis::RedisAdapter;

/// The two redirect hints a cluster node can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// Durable redirect: slot ownership changed, refresh the topology.
    Moved,
    /// Transient redirect: retry this one request elsewhere with an
    /// `ASKING` preamble; ownership has not changed.
    Ask,
}

/// Classification of a batch execution's overall outcome.
#[derive(Debug)]
pub enum Reply {
    /// Normal success; one frame per command in the batch.
    Value(Vec<Frame>),
    /// The node redirected the request.
    Redirect {
        /// Whether the redirect is durable (MOVED) or transient (ASK).
        kind: RedirectKind,
        /// Target host.
        host: String,
        /// Target port.
        port: u16,
    },
    /// The connection failed at the socket level.
    ConnError(Error),
}

/// Connection options handed to adapters when opening node links.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct AdapterOptions {
    /// Maximum time to wait for connection establishment.
    pub connect_timeout: Option<Duration>,
    /// Maximum time to wait for a reply.
    pub read_timeout: Option<Duration>,
    /// Maximum time to wait for writes.
    pub write_timeout: Option<Duration>,
}

/// A transport implementation the router can dispatch through.
#[async_trait]
pub trait ConnectionAdapter: Send + Sync {
    /// Returns the ordered key arguments of a command.
    ///
    /// An empty result means the command cannot be routed by key.
    fn keys_of(&self, command: &Command) -> Vec<String>;

    /// Opens a link to a node.
    async fn open(
        &self,
        host: &str,
        port: u16,
        options: &AdapterOptions,
    ) -> Result<Box<dyn NodeLink>>;
}

/// A live connection to one node.
#[async_trait]
pub trait NodeLink: Send + Sync {
    /// Executes a non-empty batch of commands in order on this node.
    ///
    /// When `asking` is set, an `ASKING` directive precedes the batch and
    /// applies to this execution only. Any MOVED or ASK reply from the
    /// server short-circuits the classification into [`Reply::Redirect`];
    /// socket-level failures surface as [`Reply::ConnError`].
    async fn execute(&self, commands: &[Command], asking: bool) -> Reply;

    /// Closes the link. Further use is an error.
    async fn close(&self);
}

/// Parses a redirect hint (`MOVED <slot> <ip>:<port>` or
/// `ASK <slot> <ip>:<port>`) from an error reply.
pub fn parse_redirect(message: &str) -> Option<(RedirectKind, String, u16)> {
    let message = message.trim();
    let (kind, rest) = if let Some(rest) = message.strip_prefix("MOVED ") {
        (RedirectKind::Moved, rest)
    } else if let Some(rest) = message.strip_prefix("ASK ") {
        (RedirectKind::Ask, rest)
    } else {
        return None;
    };

    let mut parts = rest.split_whitespace();
    let _slot: u16 = parts.next()?.parse().ok()?;
    let (host, port) = parts.next()?.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some((kind, host.to_string(), port))
}

/// Factory producing a fresh adapter instance.
pub type AdapterFactory = fn() -> Arc<dyn ConnectionAdapter>;

fn registry() -> &'static Mutex<HashMap<String, AdapterFactory>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, AdapterFactory>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<String, AdapterFactory> = HashMap::new();
        map.insert("redis".to_string(), || Arc::new(RedisAdapter::new()));
        Mutex::new(map)
    })
}

fn registry_guard() -> MutexGuard<'static, HashMap<String, AdapterFactory>> {
    match registry().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Registers an adapter under a symbolic name, replacing any previous
/// registration for that name.
pub fn register_adapter(name: impl Into<String>, factory: AdapterFactory) {
    registry_guard().insert(name.into(), factory);
}

/// Instantiates the adapter registered under `name`.
pub(crate) fn adapter_by_name(name: &str) -> Option<Arc<dyn ConnectionAdapter>> {
    registry_guard().get(name).map(|factory| factory())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_moved_redirect() {
        let (kind, host, port) = parse_redirect("MOVED 3999 127.0.0.1:7000").unwrap();
        assert_eq!(kind, RedirectKind::Moved);
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, 7000);
    }

    #[test]
    fn test_parse_ask_redirect() {
        let (kind, host, port) = parse_redirect("ASK 12345 192.168.1.100:6379").unwrap();
        assert_eq!(kind, RedirectKind::Ask);
        assert_eq!(host, "192.168.1.100");
        assert_eq!(port, 6379);
    }

    #[test]
    fn test_parse_redirect_with_hostname() {
        let (_, host, port) = parse_redirect("MOVED 999 redis-master.local:6379").unwrap();
        assert_eq!(host, "redis-master.local");
        assert_eq!(port, 6379);
    }

    #[test]
    fn test_parse_redirect_with_ipv6() {
        let (_, host, port) = parse_redirect("MOVED 1234 [::1]:7000").unwrap();
        assert_eq!(host, "::1");
        assert_eq!(port, 7000);
    }

    #[test]
    fn test_parse_redirect_with_whitespace() {
        let (kind, host, port) = parse_redirect("  MOVED 100 localhost:7001  ").unwrap();
        assert_eq!(kind, RedirectKind::Moved);
        assert_eq!(host, "localhost");
        assert_eq!(port, 7001);
    }

    #[test]
    fn test_parse_redirect_rejects_other_errors() {
        assert!(parse_redirect("ERR unknown command").is_none());
        assert!(parse_redirect("CLUSTERDOWN Hash slot not served").is_none());
        assert!(parse_redirect("").is_none());
        // Case-sensitive, as the server emits them.
        assert!(parse_redirect("moved 3999 127.0.0.1:7000").is_none());
    }

    #[test]
    fn test_parse_redirect_rejects_malformed() {
        assert!(parse_redirect("MOVED 3999").is_none());
        assert!(parse_redirect("MOVED invalid 127.0.0.1:7000").is_none());
        assert!(parse_redirect("MOVED 3999 noport").is_none());
        assert!(parse_redirect("MOVED 3999 host:notaport").is_none());
    }

    #[test]
    fn test_registry_has_builtin_redis() {
        assert!(adapter_by_name("redis").is_some());
        assert!(adapter_by_name("no-such-adapter").is_none());
    }
}
