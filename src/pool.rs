//! Per-node connection pool.
//!
//! The pool keeps at most one live link per node, created lazily on first
//! use. Lookups take a shared read lock; creation serializes on a single
//! mutex with a double-check so a burst of callers hitting a new node opens
//! exactly one connection instead of a thundering herd. Links are closed
//! when their node drops out of a reloaded topology or when the client
//! closes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::adapter::{AdapterOptions, ConnectionAdapter, NodeLink};
use crate::errors::Result;
use crate::topology::NodeDescriptor;

pub(crate) struct ConnectionPool {
    adapter: Arc<dyn ConnectionAdapter>,
    options: AdapterOptions,
    links: RwLock<HashMap<String, Arc<dyn NodeLink>>>,
    create: Mutex<()>,
}

impl ConnectionPool {
    pub(crate) fn new(adapter: Arc<dyn ConnectionAdapter>, options: AdapterOptions) -> Self {
        Self {
            adapter,
            options,
            links: RwLock::new(HashMap::new()),
            create: Mutex::new(()),
        }
    }

    /// Returns the link for a node, opening it on first use.
    pub(crate) async fn fetch(&self, node: &NodeDescriptor) -> Result<Arc<dyn NodeLink>> {
        {
            let links = self.links.read().await;
            if let Some(link) = links.get(node.name()) {
                return Ok(link.clone());
            }
        }

        // Connection setup may block on a handshake; serialize creation and
        // re-check so a concurrent insert wins.
        let _create = self.create.lock().await;
        {
            let links = self.links.read().await;
            if let Some(link) = links.get(node.name()) {
                return Ok(link.clone());
            }
        }

        let link: Arc<dyn NodeLink> = Arc::from(
            self.adapter
                .open(node.host(), node.port(), &self.options)
                .await?,
        );
        self.links
            .write()
            .await
            .insert(node.name().to_string(), link.clone());
        Ok(link)
    }

    /// Drops and closes the link for one node, if present.
    pub(crate) async fn discard(&self, name: &str) {
        let removed = self.links.write().await.remove(name);
        if let Some(link) = removed {
            link.close().await;
        }
    }

    /// Evicts every link whose node is not in `valid_names`.
    ///
    /// Removal happens under the map lock; closing happens after it is
    /// released so slow closes never stall lookups.
    pub(crate) async fn evict_missing(&self, valid_names: &[String]) {
        let removed: Vec<Arc<dyn NodeLink>> = {
            let mut links = self.links.write().await;
            let stale: Vec<String> = links
                .keys()
                .filter(|name| !valid_names.contains(name))
                .cloned()
                .collect();
            stale.into_iter().filter_map(|name| links.remove(&name)).collect()
        };
        for link in removed {
            link.close().await;
        }
    }

    /// Drains the pool, closing every link. Idempotent.
    pub(crate) async fn close_all(&self) {
        let removed: Vec<Arc<dyn NodeLink>> = {
            let mut links = self.links.write().await;
            links.drain().map(|(_, link)| link).collect()
        };
        for link in removed {
            link.close().await;
        }
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.links.read().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn contains(&self, name: &str) -> bool {
        self.links.read().await.contains_key(name)
    }
}
