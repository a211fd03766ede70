//! Cluster topology snapshots.
//!
//! A topology maps hash slots to owning nodes. Snapshots are immutable once
//! published: a refresh builds a fresh [`ClusterTopology`] and swaps it in
//! behind [`SharedTopology`], so concurrent callers keep reading whichever
//! snapshot they started with.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::errors::{Error, Result};
use crate::proto::frame::Frame;

/// A cluster node, identified by its canonical `host:port` name.
#[derive(Debug, Clone, Eq)]
pub struct NodeDescriptor {
    host: String,
    port: u16,
    name: String,
}

impl NodeDescriptor {
    /// Creates a descriptor; the canonical name is `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let name = format!("{}:{}", host, port);
        Self { host, port, name }
    }

    /// Returns the node host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the node port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the canonical `host:port` name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for NodeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl std::hash::Hash for NodeDescriptor {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// One record of a slot layout: an inclusive slot range and its master.
///
/// Replica addresses are carried through parsing but ignored by routing;
/// all traffic goes to masters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAssignment {
    /// First slot of the range (inclusive).
    pub start: u16,
    /// Last slot of the range (inclusive).
    pub end: u16,
    /// Master `(host, port)` serving the range.
    pub master: (String, u16),
    /// Replica `(host, port)` addresses, unused by routing.
    pub replicas: Vec<(String, u16)>,
}

/// An immutable view of slot ownership.
#[derive(Debug, Clone, Default)]
pub struct ClusterTopology {
    slot_owner: HashMap<u16, String>,
    nodes: BTreeMap<String, NodeDescriptor>,
}

impl ClusterTopology {
    /// Creates a topology that knows the given nodes but owns no slots.
    ///
    /// This is the cold-start state: commands go to a random known node
    /// until redirects and refreshes fill in slot ownership.
    pub fn from_seeds<I>(seeds: I) -> Self
    where
        I: IntoIterator<Item = (String, u16)>,
    {
        let mut topology = Self::default();
        for (host, port) in seeds {
            topology.add_node(&host, port);
        }
        topology
    }

    /// Builds a topology from an ordered slot layout.
    ///
    /// Every slot in each record's inclusive range is assigned to the
    /// record's master. Overlapping records follow last-write-wins, which
    /// matches the server's semantics mid-migration.
    pub fn from_layout(layout: &[SlotAssignment]) -> Self {
        let mut topology = Self::default();
        for record in layout {
            let (host, port) = &record.master;
            let name = topology.add_node(host, *port);
            for slot in record.start..=record.end {
                topology.slot_owner.insert(slot, name.clone());
            }
        }
        topology
    }

    /// Adds a node, returning its canonical name. Idempotent.
    pub fn add_node(&mut self, host: &str, port: u16) -> String {
        let node = NodeDescriptor::new(host, port);
        let name = node.name().to_string();
        self.nodes.entry(name.clone()).or_insert(node);
        name
    }

    /// Returns a copy of this topology with the given node added.
    pub(crate) fn with_node(&self, host: &str, port: u16) -> (Self, NodeDescriptor) {
        let mut next = self.clone();
        next.add_node(host, port);
        let node = NodeDescriptor::new(host, port);
        (next, node)
    }

    /// Looks up the node owning a slot, if known.
    pub fn slot_owner(&self, slot: u16) -> Option<&NodeDescriptor> {
        self.slot_owner
            .get(&slot)
            .and_then(|name| self.nodes.get(name))
    }

    /// Enumerates known nodes in stable (name) order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeDescriptor> {
        self.nodes.values()
    }

    /// Returns the canonical names of all known nodes.
    pub fn node_names(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Returns the descriptor for a canonical name.
    pub fn node(&self, name: &str) -> Option<&NodeDescriptor> {
        self.nodes.get(name)
    }

    /// Returns the number of known nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true when no nodes are known.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Parses a `CLUSTER SLOTS` reply into layout records.
    ///
    /// Malformed range entries are skipped; only a reply that is not an
    /// array at the top level is rejected outright.
    pub fn parse_slot_layout(frame: &Frame) -> Result<Vec<SlotAssignment>> {
        let ranges = frame.as_array().ok_or_else(|| Error::Protocol {
            message: "slot layout reply must be an array".to_string(),
        })?;

        let mut layout = Vec::with_capacity(ranges.len());
        for range in ranges {
            let Some(entry) = range.as_array() else {
                continue;
            };
            if entry.len() < 3 {
                continue;
            }

            let (Some(start), Some(end)) = (entry[0].as_int(), entry[1].as_int()) else {
                continue;
            };
            let slot_range = 0..i64::from(crate::slot::SLOT_COUNT);
            if !slot_range.contains(&start) || !slot_range.contains(&end) || start > end {
                continue;
            }
            let Some(master) = parse_endpoint(&entry[2]) else {
                continue;
            };
            let replicas = entry[3..].iter().filter_map(parse_endpoint).collect();

            layout.push(SlotAssignment {
                start: start as u16,
                end: end as u16,
                master,
                replicas,
            });
        }
        Ok(layout)
    }
}

fn parse_endpoint(frame: &Frame) -> Option<(String, u16)> {
    let parts = frame.as_array()?;
    if parts.len() < 2 {
        return None;
    }
    let host = String::from_utf8_lossy(parts[0].as_bulk()?).into_owned();
    if host.is_empty() {
        return None;
    }
    let port = parts[1].as_int()?;
    Some((host, port as u16))
}

/// Shared holder for the published topology snapshot.
///
/// Readers clone out the current `Arc` and keep working on that snapshot;
/// writers build a fresh topology and swap the pointer.
#[derive(Clone)]
pub(crate) struct SharedTopology {
    inner: Arc<RwLock<Arc<ClusterTopology>>>,
}

impl SharedTopology {
    pub(crate) fn new(topology: ClusterTopology) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(topology))),
        }
    }

    /// Returns the current snapshot.
    pub(crate) async fn snapshot(&self) -> Arc<ClusterTopology> {
        self.inner.read().await.clone()
    }

    /// Publishes a freshly built snapshot, replacing the current one.
    pub(crate) async fn publish(&self, topology: ClusterTopology) {
        *self.inner.write().await = Arc::new(topology);
    }

    /// Makes sure a node is known, returning its descriptor.
    ///
    /// Copy-on-write: when the node is new, a snapshot with it added is
    /// published so the pool can service connections to it.
    pub(crate) async fn ensure_node(&self, host: &str, port: u16) -> NodeDescriptor {
        let name = format!("{}:{}", host, port);
        {
            let current = self.inner.read().await;
            if let Some(node) = current.node(&name) {
                return node.clone();
            }
        }

        let mut guard = self.inner.write().await;
        if let Some(node) = guard.node(&name) {
            return node.clone();
        }
        let (next, node) = guard.with_node(host, port);
        *guard = Arc::new(next);
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(host: &str, port: i64) -> Frame {
        Frame::Array(vec![Frame::bulk(host.to_string()), Frame::Integer(port)])
    }

    #[test]
    fn test_node_descriptor_name_and_equality() {
        let a = NodeDescriptor::new("10.0.0.1", 6379);
        let b = NodeDescriptor::new("10.0.0.1", 6379);
        let c = NodeDescriptor::new("10.0.0.2", 6379);
        assert_eq!(a.name(), "10.0.0.1:6379");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_from_seeds_owns_no_slots() {
        let topology =
            ClusterTopology::from_seeds(vec![("a".to_string(), 6379), ("b".to_string(), 6379)]);
        assert_eq!(topology.len(), 2);
        assert!(topology.slot_owner(0).is_none());
        assert!(topology.slot_owner(16383).is_none());
    }

    #[test]
    fn test_add_node_idempotent() {
        let mut topology = ClusterTopology::default();
        let first = topology.add_node("a", 6379);
        let second = topology.add_node("a", 6379);
        assert_eq!(first, second);
        assert_eq!(topology.len(), 1);
    }

    #[test]
    fn test_from_layout_assigns_inclusive_ranges() {
        let layout = vec![
            SlotAssignment {
                start: 0,
                end: 5460,
                master: ("a".to_string(), 6379),
                replicas: vec![],
            },
            SlotAssignment {
                start: 5461,
                end: 16383,
                master: ("b".to_string(), 6379),
                replicas: vec![],
            },
        ];
        let topology = ClusterTopology::from_layout(&layout);

        assert_eq!(topology.slot_owner(0).map(|n| n.name()), Some("a:6379"));
        assert_eq!(topology.slot_owner(5460).map(|n| n.name()), Some("a:6379"));
        assert_eq!(topology.slot_owner(5461).map(|n| n.name()), Some("b:6379"));
        assert_eq!(
            topology.slot_owner(16383).map(|n| n.name()),
            Some("b:6379")
        );
    }

    #[test]
    fn test_from_layout_last_write_wins() {
        let layout = vec![
            SlotAssignment {
                start: 0,
                end: 100,
                master: ("a".to_string(), 6379),
                replicas: vec![],
            },
            SlotAssignment {
                start: 50,
                end: 100,
                master: ("b".to_string(), 6379),
                replicas: vec![],
            },
        ];
        let topology = ClusterTopology::from_layout(&layout);

        assert_eq!(topology.slot_owner(49).map(|n| n.name()), Some("a:6379"));
        assert_eq!(topology.slot_owner(50).map(|n| n.name()), Some("b:6379"));
        assert_eq!(topology.slot_owner(100).map(|n| n.name()), Some("b:6379"));
    }

    #[test]
    fn test_nodes_enumerate_in_stable_order() {
        let topology = ClusterTopology::from_seeds(vec![
            ("c".to_string(), 6379),
            ("a".to_string(), 6379),
            ("b".to_string(), 6379),
        ]);
        let names: Vec<&str> = topology.nodes().map(|n| n.name()).collect();
        assert_eq!(names, vec!["a:6379", "b:6379", "c:6379"]);
    }

    #[test]
    fn test_parse_slot_layout() {
        let frame = Frame::Array(vec![Frame::Array(vec![
            Frame::Integer(0),
            Frame::Integer(5460),
            endpoint("10.0.0.1", 6379),
            endpoint("10.0.0.2", 6379),
        ])]);

        let layout = ClusterTopology::parse_slot_layout(&frame).unwrap();
        assert_eq!(layout.len(), 1);
        assert_eq!(layout[0].start, 0);
        assert_eq!(layout[0].end, 5460);
        assert_eq!(layout[0].master, ("10.0.0.1".to_string(), 6379));
        assert_eq!(layout[0].replicas, vec![("10.0.0.2".to_string(), 6379)]);
    }

    #[test]
    fn test_parse_slot_layout_skips_malformed_entries() {
        let frame = Frame::Array(vec![
            Frame::Integer(7),
            Frame::Array(vec![Frame::Integer(0)]),
            Frame::Array(vec![
                Frame::Integer(0),
                Frame::Integer(100),
                endpoint("a", 6379),
            ]),
        ]);

        let layout = ClusterTopology::parse_slot_layout(&frame).unwrap();
        assert_eq!(layout.len(), 1);
        assert_eq!(layout[0].master.0, "a");
    }

    #[test]
    fn test_parse_slot_layout_skips_out_of_range_entries() {
        let frame = Frame::Array(vec![
            // Slot outside the keyspace.
            Frame::Array(vec![
                Frame::Integer(0),
                Frame::Integer(70000),
                endpoint("a", 6379),
            ]),
            // Negative start.
            Frame::Array(vec![
                Frame::Integer(-1),
                Frame::Integer(100),
                endpoint("a", 6379),
            ]),
            // Inverted range.
            Frame::Array(vec![
                Frame::Integer(200),
                Frame::Integer(100),
                endpoint("a", 6379),
            ]),
            Frame::Array(vec![
                Frame::Integer(0),
                Frame::Integer(16383),
                endpoint("b", 6379),
            ]),
        ]);

        let layout = ClusterTopology::parse_slot_layout(&frame).unwrap();
        assert_eq!(layout.len(), 1);
        assert_eq!(layout[0].master.0, "b");
        assert_eq!((layout[0].start, layout[0].end), (0, 16383));
    }

    #[test]
    fn test_parse_slot_layout_rejects_non_array() {
        let result = ClusterTopology::parse_slot_layout(&Frame::Integer(1));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_shared_topology_publish_replaces_snapshot() {
        let shared = SharedTopology::new(ClusterTopology::from_seeds(vec![(
            "a".to_string(),
            6379,
        )]));
        let before = shared.snapshot().await;

        shared
            .publish(ClusterTopology::from_layout(&[SlotAssignment {
                start: 0,
                end: 16383,
                master: ("b".to_string(), 6379),
                replicas: vec![],
            }]))
            .await;

        // The old snapshot is untouched; the new one is visible to fresh reads.
        assert!(before.slot_owner(0).is_none());
        let after = shared.snapshot().await;
        assert_eq!(after.slot_owner(0).map(|n| n.name()), Some("b:6379"));
    }

    #[tokio::test]
    async fn test_shared_topology_ensure_node() {
        let shared = SharedTopology::new(ClusterTopology::from_seeds(vec![(
            "a".to_string(),
            6379,
        )]));

        let node = shared.ensure_node("b", 6380).await;
        assert_eq!(node.name(), "b:6380");

        let again = shared.ensure_node("b", 6380).await;
        assert_eq!(node, again);
        assert_eq!(shared.snapshot().await.len(), 2);
    }
}
