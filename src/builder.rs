use std::sync::Arc;
use std::time::Duration;

use crate::adapter::{self, AdapterOptions, ConnectionAdapter};
use crate::client::ClusterClient;
use crate::errors::{Error, Result};
use crate::pool::ConnectionPool;
use crate::router::{Router, RouterConfig};
use crate::topology::{ClusterTopology, SharedTopology};

const DEFAULT_PORT: u16 = 6379;

/// Builder for configuring and creating a [`ClusterClient`].
///
/// Construction is lazy: no connection is opened until the first command,
/// so a client can be built while the cluster is still coming up.
///
/// # Example
///
/// ```
/// use slotwise::ClusterClient;
/// use std::time::Duration;
///
/// let client = ClusterClient::builder()
///     .node("127.0.0.1:7000")
///     .node("127.0.0.1:7001")
///     .max_redirection(5)
///     .connect_timeout(Duration::from_secs(1))
///     .build()
///     .unwrap();
/// # let _ = client;
/// ```
pub struct ClusterClientBuilder {
    nodes: Vec<String>,
    max_redirection: u32,
    max_connection_error: u32,
    connect_retry_interval: Duration,
    connect_retry_random_factor: f64,
    adapter: String,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    adapter_override: Option<Arc<dyn ConnectionAdapter>>,
}

impl Default for ClusterClientBuilder {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            max_redirection: 10,
            max_connection_error: 5,
            connect_retry_interval: Duration::from_millis(1),
            connect_retry_random_factor: 0.1,
            adapter: "redis".to_string(),
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            adapter_override: None,
        }
    }
}

impl ClusterClientBuilder {
    /// Creates a builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a seed node, given as `"host:port"`, `"host"` (port defaults to
    /// 6379), or a `redis://` URL.
    pub fn node(mut self, address: impl Into<String>) -> Self {
        self.nodes.push(address.into());
        self
    }

    /// Adds several seed nodes at once.
    pub fn nodes<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nodes.extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Adds a seed node from separate host and port.
    pub fn node_addr(mut self, host: impl Into<String>, port: u16) -> Self {
        self.nodes.push(format!("{}:{}", host.into(), port));
        self
    }

    /// Caps the MOVED+ASK chain length per call (default 10).
    pub fn max_redirection(mut self, limit: u32) -> Self {
        self.max_redirection = limit;
        self
    }

    /// Caps connection errors per call before surfacing (default 5).
    pub fn max_connection_error(mut self, limit: u32) -> Self {
        self.max_connection_error = limit;
        self
    }

    /// Sets the base backoff interval (default 1 ms).
    pub fn connect_retry_interval(mut self, interval: Duration) -> Self {
        self.connect_retry_interval = interval;
        self
    }

    /// Sets the backoff jitter fraction, in `[0, 1]` (default 0.1).
    pub fn connect_retry_random_factor(mut self, factor: f64) -> Self {
        self.connect_retry_random_factor = factor;
        self
    }

    /// Selects the connection adapter by registered name (default
    /// `"redis"`).
    pub fn connection_adapter(mut self, name: impl Into<String>) -> Self {
        self.adapter = name.into();
        self
    }

    /// Sets the connection-establishment timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the reply read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Sets the write timeout.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Uses the given adapter instance instead of a registry lookup.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn with_adapter(mut self, adapter: Arc<dyn ConnectionAdapter>) -> Self {
        self.adapter_override = Some(adapter);
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the seed list is empty or
    /// malformed, the jitter factor is out of range, or the adapter name is
    /// unknown.
    pub fn build(self) -> Result<ClusterClient> {
        if self.nodes.is_empty() {
            return Err(Error::Configuration {
                message: "at least one seed node is required".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.connect_retry_random_factor) {
            return Err(Error::Configuration {
                message: format!(
                    "connect_retry_random_factor must be in [0, 1], got {}",
                    self.connect_retry_random_factor
                ),
            });
        }

        let mut seeds = Vec::with_capacity(self.nodes.len());
        for raw in &self.nodes {
            seeds.push(parse_seed(raw)?);
        }

        let adapter = match self.adapter_override {
            Some(adapter) => adapter,
            None => adapter::adapter_by_name(&self.adapter).ok_or_else(|| {
                Error::Configuration {
                    message: format!("unknown connection adapter: {}", self.adapter),
                }
            })?,
        };

        let options = AdapterOptions {
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            ..AdapterOptions::default()
        };

        let topology = SharedTopology::new(ClusterTopology::from_seeds(seeds));
        let pool = Arc::new(ConnectionPool::new(adapter.clone(), options));
        let router = Router::new(
            topology,
            pool,
            adapter,
            RouterConfig {
                max_redirection: self.max_redirection,
                max_connection_error: self.max_connection_error,
                connect_retry_interval: self.connect_retry_interval,
                connect_retry_random_factor: self.connect_retry_random_factor,
            },
        );
        Ok(ClusterClient::from_router(router))
    }
}

fn parse_seed(raw: &str) -> Result<(String, u16)> {
    let malformed = || Error::Configuration {
        message: format!("malformed seed node: {:?}", raw),
    };

    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix("redis://").unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(malformed());
    }

    let parsed = url::Url::parse(&format!("redis://{}", trimmed)).map_err(|_| malformed())?;
    let host = parsed.host_str().ok_or_else(malformed)?.to_string();
    let port = parsed.port().unwrap_or(DEFAULT_PORT);
    Ok((host, port))
}
