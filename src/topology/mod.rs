//! NUMA topology
//!
//! A [`Topology`] is a registry of [`Node`]s, indexed by [`NodeId`], which
//! also keeps track of aggregate statistics about these nodes: how many there
//! are, which range of ids they span, how many CPUs and memory blocks they
//! own in total.
//!
//! Topologies are built from scratch by [`Topology::acquire()`], either from
//! a live [`NumaPlatform`] or from a static [`Description`].

mod acquire;
pub mod description;
mod discovery;

pub use self::acquire::RunMode;

#[cfg(doc)]
use self::description::Description;
#[cfg(doc)]
use crate::{lmb::DrcIndexAllocator, platform::NumaPlatform};
use crate::{
    errors::TopologyError,
    lmb::DrcIndex,
    node::{Node, NodeId},
    platform::AssociativityArrays,
    MAX_NODES,
};
use std::iter::FusedIterator;

/// NUMA nodes of a machine and the memory blocks they own
///
/// Since there are several things you can do with a `Topology`, the API is
/// broken down into sections:
///
/// - [Node registry](#node-registry)
/// - [Aggregate statistics](#aggregate-statistics)
/// - [Memory block allocation](#memory-block-allocation)
/// - [Live topology discovery](#live-topology-discovery)
/// - [Static topology descriptions](#static-topology-descriptions)
/// - [Topology acquisition](#topology-acquisition)
//
// NOTE: Functionality which is strongly related to one other code module is
// implemented inside that module, leaving this one focused on the registry and
// its bookkeeping.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Topology {
    /// Nodes indexed by id, grown on demand up to `MAX_NODES` slots
    nodes: Vec<Option<Node>>,

    /// Number of `Some` slots in `nodes`
    node_count: usize,

    /// Smallest id of a populated slot
    node_min: Option<NodeId>,

    /// Largest id of a populated slot
    node_max: Option<NodeId>,

    /// Sum of the CPU counts of all nodes
    cpu_count: usize,

    /// Memory blocks created on nodes that had CPUs at the time
    lmb_count: usize,

    /// Memory blocks created on nodes that had no CPU at the time
    cpuless_lmb_count: usize,

    /// Associativity depth reported by the platform, if it was queried
    min_common_depth: Option<u32>,

    /// Memory associativity arrays reported by the platform, if queried
    associativity: Option<AssociativityArrays>,

    /// Truth that this topology comes from a static description
    synthetic: bool,
}

/// # Node registry
impl Topology {
    /// Empty topology
    ///
    /// Most users will want [`Topology::acquire()`] instead, which builds a
    /// fully populated topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get node `id`, creating it if it does not exist yet
    ///
    /// A newly created node has no CPU and no memory block. Calling this
    /// function again with the same `id` returns the same node and does not
    /// change the topology.
    ///
    /// # Errors
    ///
    /// - [`InvalidNodeId`](TopologyError::InvalidNodeId) if `id` is not lower
    ///   than [`MAX_NODES`]. The topology is not modified.
    /// - [`OutOfMemory`](TopologyError::OutOfMemory) if storage for the new
    ///   node cannot be allocated. The topology is not modified.
    pub fn fetch_or_create_node(&mut self, id: NodeId) -> Result<&mut Node, TopologyError> {
        let Some(slot) = id.slot() else {
            tracing::error!("requested NUMA node {id} is out of the supported range 0..{MAX_NODES}");
            return Err(TopologyError::InvalidNodeId(id));
        };

        if slot >= self.nodes.len() {
            self.nodes
                .try_reserve(slot + 1 - self.nodes.len())
                .map_err(|_| {
                    tracing::error!("cannot allocate NUMA node {id}");
                    TopologyError::OutOfMemory
                })?;
            self.nodes.resize_with(slot + 1, || None);
        }

        if self.nodes[slot].is_none() {
            if self.node_min.map_or(true, |min| id < min) {
                self.node_min = Some(id);
            }
            if self.node_max.map_or(true, |max| id > max) {
                self.node_max = Some(id);
            }
            self.node_count += 1;
            tracing::debug!("created NUMA node {id}");
        }
        Ok(self.nodes[slot].get_or_insert_with(|| Node::new(id)))
    }

    /// Node `id`, if it exists
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.slot()?)?.as_ref()
    }

    /// Nodes of this topology, by increasing id
    pub fn nodes(&self) -> impl DoubleEndedIterator<Item = &Node> + FusedIterator + Clone {
        self.nodes.iter().flatten()
    }

    /// Node owning the memory block with handle `drc_index`, if any
    pub fn node_of_lmb(&self, drc_index: DrcIndex) -> Option<&Node> {
        self.nodes().find(|node| {
            node.lmb_list()
                .is_some_and(|lmbs| lmbs.contains(drc_index))
        })
    }

    /// Set the CPU count of node `id`, creating it if needed
    ///
    /// The topology-wide CPU count is adjusted accordingly. If it would
    /// overflow, no CPU count is changed.
    pub(crate) fn set_node_cpus(&mut self, id: NodeId, n_cpus: usize) -> Result<(), TopologyError> {
        let old_cpus = self.fetch_or_create_node(id)?.n_cpus();
        // A node's CPUs are always part of the total
        let cpu_count = (self.cpu_count - old_cpus)
            .checked_add(n_cpus)
            .ok_or(TopologyError::CpuCountOverflow(id))?;
        if let Some(node) = self.node_mut(id) {
            node.set_n_cpus(n_cpus);
            self.cpu_count = cpu_count;
        }
        Ok(())
    }

    /// Add `n_cpus` CPUs to the existing node `id`
    ///
    /// Nothing happens if the node does not exist. If the topology-wide CPU
    /// count would overflow, no CPU count is changed.
    pub(crate) fn add_node_cpus(&mut self, id: NodeId, n_cpus: usize) -> Result<(), TopologyError> {
        let cpu_count = self
            .cpu_count
            .checked_add(n_cpus)
            .ok_or(TopologyError::CpuCountOverflow(id))?;
        if let Some(node) = self.node_mut(id) {
            node.set_n_cpus(node.n_cpus() + n_cpus);
            self.cpu_count = cpu_count;
        }
        Ok(())
    }

    /// Mutable access to node `id`, if it exists
    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.slot()?)?.as_mut()
    }

    /// Forget the CPU counts of all nodes, but keep the nodes
    pub(crate) fn reset_cpu_counts(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            node.set_n_cpus(0);
        }
        self.cpu_count = 0;
    }

    /// Account for `count` new memory blocks
    pub(crate) fn account_lmbs(&mut self, cpuless: bool, count: usize) {
        if cpuless {
            self.cpuless_lmb_count += count;
        } else {
            self.lmb_count += count;
        }
    }
}

/// # Aggregate statistics
impl Topology {
    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Smallest node id, if there is at least one node
    pub fn node_min(&self) -> Option<NodeId> {
        self.node_min
    }

    /// Largest node id, if there is at least one node
    pub fn node_max(&self) -> Option<NodeId> {
        self.node_max
    }

    /// Total number of CPUs across all nodes
    pub fn cpu_count(&self) -> usize {
        self.cpu_count
    }

    /// Number of memory blocks that were created on nodes with CPUs
    pub fn lmb_count(&self) -> usize {
        self.lmb_count
    }

    /// Number of memory blocks that were created on CPU-less nodes
    pub fn cpuless_lmb_count(&self) -> usize {
        self.cpuless_lmb_count
    }

    /// Associativity depth at which the platform groups resources into nodes
    ///
    /// Only known for topologies acquired from a live platform.
    pub fn min_common_depth(&self) -> Option<u32> {
        self.min_common_depth
    }

    /// Memory associativity arrays of the platform
    ///
    /// Only known for topologies acquired from a live platform.
    pub fn associativity_arrays(&self) -> Option<&AssociativityArrays> {
        self.associativity.as_ref()
    }

    /// Truth that this topology was loaded from a static description rather
    /// than discovered on the live platform
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }
}
