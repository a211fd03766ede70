use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;

use crate::adapter::{NodeLink, Reply};
use crate::command::{self, Command};
use crate::errors::{Error, Result};
use crate::pipeline::Pipeline;
use crate::proto::frame::Frame;
use crate::router::Router;

/// Slot-routed cluster client.
///
/// One instance is shared across tasks; commands are routed to the node
/// owning their key slot, MOVED/ASK redirects are followed transparently,
/// and transient connection failures rotate through the remaining known
/// nodes with bounded backoff.
///
/// # Example
///
/// ```no_run
/// use slotwise::ClusterClient;
///
/// # #[tokio::main]
/// # async fn main() -> slotwise::Result<()> {
/// let client = ClusterClient::builder()
///     .node("127.0.0.1:7000")
///     .node("127.0.0.1:7001")
///     .build()?;
///
/// client.set("key", "value").await?;
/// let value = client.get("key").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ClusterClient {
    router: Arc<Router>,
}

impl ClusterClient {
    pub(crate) fn from_router(router: Router) -> Self {
        Self {
            router: Arc::new(router),
        }
    }

    /// Starts configuring a client.
    pub fn builder() -> crate::builder::ClusterClientBuilder {
        crate::builder::ClusterClientBuilder::new()
    }

    /// Routes one command by its key slot and returns its reply.
    ///
    /// Any command name works as long as the adapter can extract a key from
    /// it; keyless commands are rejected with a routing error and belong on
    /// [`each_node`](Self::each_node).
    pub async fn call(&self, command: Command) -> Result<Frame> {
        let batch = std::slice::from_ref(&command);
        let slot = self.router.derive_slot(batch)?;
        let mut frames = self.router.dispatch(slot, batch).await?;
        let frame = frames.pop().ok_or_else(|| Error::Protocol {
            message: "empty reply batch".to_string(),
        })?;
        reject_error_frame(frame)
    }

    /// Accumulates commands in a pipeline block, then sends them as one
    /// batch to the node owning their common slot.
    ///
    /// Every key across the batch must hash to the same slot, otherwise a
    /// routing error is returned before any network I/O.
    pub async fn pipelined<F>(&self, block: F) -> Result<Vec<Frame>>
    where
        F: FnOnce(&mut Pipeline),
    {
        let mut pipe = Pipeline::new();
        block(&mut pipe);
        let commands = pipe.into_commands();
        let slot = self.router.derive_slot(&commands)?;
        self.router.dispatch(slot, &commands).await
    }

    /// Like [`pipelined`](Self::pipelined), wrapping the batch in
    /// `MULTI`/`EXEC`. The slot is derived from the accumulated commands
    /// only.
    pub async fn multi<F>(&self, block: F) -> Result<Vec<Frame>>
    where
        F: FnOnce(&mut Pipeline),
    {
        let mut pipe = Pipeline::new();
        block(&mut pipe);
        let commands = pipe.into_commands();
        let slot = self.router.derive_slot(&commands)?;

        let mut batch = Vec::with_capacity(commands.len() + 2);
        batch.push(command::multi());
        batch.extend(commands);
        batch.push(command::exec());
        self.router.dispatch(slot, &batch).await
    }

    /// Invokes the visitor once per known node with that node's raw
    /// connection.
    ///
    /// A topology refresh is forced first: administrative fan-outs should
    /// see current membership, not the cached view.
    pub async fn each_node<F, Fut, T>(&self, mut visitor: F) -> Result<Vec<T>>
    where
        F: FnMut(String, RawConnection) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.router.schedule_refresh();
        self.router.maybe_refresh().await?;

        let snapshot = self.router.shared_topology().snapshot().await;
        let mut results = Vec::with_capacity(snapshot.len());
        for node in snapshot.nodes() {
            let link = self.router.pool().fetch(node).await?;
            let connection = RawConnection { link };
            results.push(visitor(node.name().to_string(), connection).await?);
        }
        Ok(results)
    }

    /// Returns the keys matching a pattern, merged across all nodes.
    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = pattern.to_string();
        let groups = self
            .each_node(move |_, conn| {
                let pattern = pattern.clone();
                async move {
                    let frame = conn.command(command::keys(pattern)).await?;
                    let mut found = Vec::new();
                    if let Some(items) = frame.as_array() {
                        for item in items {
                            if let Some(data) = item.as_bulk() {
                                found.push(String::from_utf8_lossy(data).into_owned());
                            }
                        }
                    }
                    Ok(found)
                }
            })
            .await?;
        Ok(groups.into_iter().flatten().collect())
    }

    /// Returns each node's INFO text, keyed by node name.
    pub async fn info(&self) -> Result<HashMap<String, String>> {
        let pairs = self
            .each_node(|name, conn| async move {
                let frame = conn.command(command::info()).await?;
                let text = frame
                    .as_bulk()
                    .map(|data| String::from_utf8_lossy(data).into_owned())
                    .unwrap_or_default();
                Ok((name, text))
            })
            .await?;
        Ok(pairs.into_iter().collect())
    }

    /// Flushes the current database on every node.
    pub async fn flushdb(&self) -> Result<()> {
        self.each_node(|_, conn| async move {
            conn.command(command::flushdb()).await?;
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Pings every node.
    pub async fn ping(&self) -> Result<()> {
        self.each_node(|_, conn| async move {
            conn.command(command::ping()).await?;
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Fetches multiple keys, one slot-routed GET per key.
    ///
    /// Keys may live on different slots; this is the cluster-safe spelling
    /// of MGET.
    pub async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Bytes>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            let frame = self.call(command::get(key.to_string())).await?;
            values.push(frame.as_bulk().cloned());
        }
        Ok(values)
    }

    /// Gets a key's value, or `None` when it does not exist.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let frame = self.call(command::get(key.to_string())).await?;
        Ok(frame.as_bulk().cloned())
    }

    /// Sets a key to a value.
    pub async fn set(&self, key: &str, value: impl Into<Bytes>) -> Result<()> {
        self.call(command::set(key.to_string(), value)).await?;
        Ok(())
    }

    /// Deletes a key, returning how many keys were removed.
    pub async fn del(&self, key: &str) -> Result<i64> {
        let frame = self.call(command::del(key.to_string())).await?;
        frame.as_int().ok_or_else(|| Error::Protocol {
            message: "unexpected reply type for DEL".to_string(),
        })
    }

    /// Checks whether a key exists.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let frame = self.call(command::exists(key.to_string())).await?;
        match frame.as_int() {
            Some(count) => Ok(count > 0),
            None => Err(Error::Protocol {
                message: "unexpected reply type for EXISTS".to_string(),
            }),
        }
    }

    /// Drops every pooled connection and schedules a topology refresh, so
    /// the next command reconnects against current membership.
    pub async fn reconnect(&self) {
        self.router.pool().close_all().await;
        self.router.schedule_refresh();
    }

    /// Closes every pooled connection. Idempotent; the client can be used
    /// again afterwards and will reconnect lazily.
    pub async fn close(&self) {
        self.router.pool().close_all().await;
    }

    #[cfg(test)]
    pub(crate) fn router(&self) -> &Router {
        &self.router
    }
}

/// Raw per-node connection handed to [`ClusterClient::each_node`] visitors.
///
/// Commands issued here bypass slot routing entirely; redirects are treated
/// as protocol violations because fan-out commands carry no keys.
pub struct RawConnection {
    link: Arc<dyn NodeLink>,
}

impl RawConnection {
    /// Executes one command on this node.
    pub async fn command(&self, command: Command) -> Result<Frame> {
        match self.link.execute(std::slice::from_ref(&command), false).await {
            Reply::Value(mut frames) => {
                let frame = frames.pop().ok_or_else(|| Error::Protocol {
                    message: "empty reply batch".to_string(),
                })?;
                reject_error_frame(frame)
            }
            Reply::Redirect { .. } => Err(Error::Assertion {
                message: "redirect in reply to a keyless fan-out command".to_string(),
            }),
            Reply::ConnError(err) => Err(err),
        }
    }
}

fn reject_error_frame(frame: Frame) -> Result<Frame> {
    if let Some(text) = frame.as_error() {
        return Err(Error::Server {
            message: text.to_string(),
        });
    }
    Ok(frame)
}
