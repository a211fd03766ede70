//! Slot routing and the redirection state machine.
//!
//! A dispatch resolves a slot to its owning node (or a random known node on
//! cold start), executes the batch there, and reacts to the reply: values
//! return, redirects re-aim the next attempt, connection errors rotate
//! through untried nodes and finally back off with jittered exponential
//! delays. MOVED redirects latch a refresh flag that the next attempt (of
//! any caller) converts into a `CLUSTER SLOTS` probe and a freshly
//! published topology snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::adapter::{ConnectionAdapter, RedirectKind, Reply};
use crate::command::{self, Command};
use crate::errors::{Error, Result};
use crate::pool::ConnectionPool;
use crate::proto::frame::Frame;
use crate::slot::key_slot;
use crate::topology::{ClusterTopology, NodeDescriptor, SharedTopology};

/// Per-call budgets and backoff tuning.
pub(crate) struct RouterConfig {
    pub max_redirection: u32,
    pub max_connection_error: u32,
    pub connect_retry_interval: Duration,
    pub connect_retry_random_factor: f64,
}

pub(crate) struct Router {
    topology: SharedTopology,
    pool: Arc<ConnectionPool>,
    adapter: Arc<dyn ConnectionAdapter>,
    config: RouterConfig,
    refresh_pending: AtomicBool,
    refresh_gate: Mutex<()>,
}

impl Router {
    pub(crate) fn new(
        topology: SharedTopology,
        pool: Arc<ConnectionPool>,
        adapter: Arc<dyn ConnectionAdapter>,
        config: RouterConfig,
    ) -> Self {
        Self {
            topology,
            pool,
            adapter,
            config,
            refresh_pending: AtomicBool::new(false),
            refresh_gate: Mutex::new(()),
        }
    }

    pub(crate) fn shared_topology(&self) -> &SharedTopology {
        &self.topology
    }

    pub(crate) fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Maps a batch to the single slot it belongs on.
    ///
    /// Keys are collected across every command, deduplicated, and hashed;
    /// the batch is routable iff exactly one distinct slot remains. Keyless
    /// batches are rejected the same way: keyless commands belong on the
    /// fan-out path, not slot routing.
    pub(crate) fn derive_slot(&self, commands: &[Command]) -> Result<u16> {
        let mut slots: Vec<u16> = commands
            .iter()
            .flat_map(|cmd| self.adapter.keys_of(cmd))
            .map(|key| key_slot(&key))
            .collect();
        slots.sort_unstable();
        slots.dedup();

        match slots.as_slice() {
            [slot] => Ok(*slot),
            [] => Err(Error::Routing {
                message: "no way to dispatch this command to the cluster (no key arguments)"
                    .to_string(),
            }),
            _ => Err(Error::Routing {
                message:
                    "no way to dispatch this command to the cluster (keys span multiple slots)"
                        .to_string(),
            }),
        }
    }

    /// Executes a batch against the node owning `slot`, following redirects
    /// and recovering from connection failures within the configured
    /// budgets.
    pub(crate) async fn dispatch(&self, slot: u16, commands: &[Command]) -> Result<Vec<Frame>> {
        let snapshot = self.topology.snapshot().await;
        let mut candidates: Vec<NodeDescriptor> = snapshot.nodes().cloned().collect();
        let mut current = match snapshot.slot_owner(slot) {
            Some(owner) => owner.clone(),
            None => candidates
                .choose(&mut StdRng::from_entropy())
                .cloned()
                .ok_or_else(|| Error::Configuration {
                    message: "no known cluster nodes".to_string(),
                })?,
        };
        drop(snapshot);

        let mut redirections = 0u32;
        let mut connection_errors = 0u32;
        let mut connect_retries = 0u32;
        let mut asking = false;

        loop {
            self.maybe_refresh().await?;
            candidates.retain(|node| node != &current);

            let reply = match self.pool.fetch(&current).await {
                Ok(link) => link.execute(commands, asking).await,
                Err(err) => Reply::ConnError(err),
            };
            asking = false;

            match reply {
                Reply::Value(frames) => return Ok(frames),
                Reply::Redirect { kind, host, port } => {
                    redirections += 1;
                    if redirections > self.config.max_redirection {
                        return Err(Error::Redirection { redirections });
                    }
                    debug!(slot, from = %current, to = %host, port, ?kind, "following redirect");
                    asking = kind == RedirectKind::Ask;
                    current = self.topology.ensure_node(&host, port).await;
                    // ASK is slot-local and transient; only MOVED means the
                    // topology view is stale.
                    if kind == RedirectKind::Moved {
                        self.schedule_refresh();
                    }
                }
                Reply::ConnError(cause) => {
                    connection_errors += 1;
                    self.pool.discard(current.name()).await;
                    if connection_errors > self.config.max_connection_error {
                        return Err(Error::Connection {
                            source: Box::new(cause),
                        });
                    }
                    debug!(node = %current, error = %cause, "connection error");
                    match candidates.choose(&mut StdRng::from_entropy()) {
                        Some(next) => current = next.clone(),
                        // The candidate set is never refilled within a call:
                        // once every known node has been tried, keep backing
                        // off against the same node instead of spinning.
                        None => {
                            connect_retries += 1;
                            self.backoff(connect_retries).await;
                        }
                    }
                }
            }
        }
    }

    /// Latches the refresh flag; the next attempt performs the reload.
    pub(crate) fn schedule_refresh(&self) {
        self.refresh_pending.store(true, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub(crate) fn refresh_scheduled(&self) -> bool {
        self.refresh_pending.load(Ordering::SeqCst)
    }

    /// Reloads the topology when the refresh flag is set.
    ///
    /// The flag swap is guarded by a dedicated mutex, so of N concurrent
    /// callers exactly one observes it set and probes; the rest see it
    /// cleared and skip.
    pub(crate) async fn maybe_refresh(&self) -> Result<()> {
        let due = {
            let _gate = self.refresh_gate.lock().await;
            self.refresh_pending.swap(false, Ordering::SeqCst)
        };
        if !due {
            return Ok(());
        }
        self.reload_topology().await
    }

    /// Probes nodes of the current snapshot for the slot layout and
    /// publishes a fresh topology from the first success.
    ///
    /// When every probe fails the warning log is the only trace: topology
    /// stays as it was and later calls keep working off stale data via
    /// random-node sampling and redirects.
    async fn reload_topology(&self) -> Result<()> {
        let snapshot = self.topology.snapshot().await;
        let probe = command::cluster_slots();

        for node in snapshot.nodes() {
            let link = match self.pool.fetch(node).await {
                Ok(link) => link,
                Err(err) => {
                    warn!(node = %node, error = %err, "topology probe: connect failed");
                    continue;
                }
            };
            match link.execute(std::slice::from_ref(&probe), false).await {
                Reply::Value(frames) => {
                    let Some(frame) = frames.first() else {
                        warn!(node = %node, "topology probe: empty reply");
                        continue;
                    };
                    let layout = match ClusterTopology::parse_slot_layout(frame) {
                        Ok(layout) => layout,
                        Err(err) => {
                            warn!(node = %node, error = %err, "topology probe: malformed layout");
                            continue;
                        }
                    };
                    let rebuilt = ClusterTopology::from_layout(&layout);
                    let names = rebuilt.node_names();
                    debug!(nodes = names.len(), "publishing refreshed topology");
                    self.topology.publish(rebuilt).await;
                    self.pool.evict_missing(&names).await;
                    return Ok(());
                }
                Reply::ConnError(err) => {
                    warn!(node = %node, error = %err, "topology probe failed");
                    self.pool.discard(node.name()).await;
                }
                // The probe carries no key; a redirect here means the node
                // is not speaking the protocol we know.
                Reply::Redirect { .. } => {
                    return Err(Error::Assertion {
                        message: "redirect in reply to a keyless topology probe".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn backoff(&self, retry: u32) {
        let factor = self.config.connect_retry_random_factor;
        let jitter = if factor > 0.0 {
            StdRng::from_entropy().gen_range(-factor..=factor)
        } else {
            0.0
        };
        let base = self.config.connect_retry_interval.as_secs_f64()
            * 2f64.powi(retry.saturating_sub(1) as i32);
        let delay = Duration::from_secs_f64((base * (1.0 + jitter)).max(0.0));
        debug!(retry, delay_us = delay.as_micros() as u64, "cluster unreachable, backing off");
        tokio::time::sleep(delay).await;
    }
}
