//! NUMA nodes
//!
//! A [`Node`] is created lazily by [`Topology::fetch_or_create_node()`] the
//! first time its [`NodeId`] is referenced, and lives as long as the
//! [`Topology`] that owns it.

use crate::lmb::{Lmb, LmbList};
#[cfg(doc)]
use crate::topology::Topology;
use derive_more::{Display, From, Into};
#[cfg(any(test, feature = "proptest"))]
use proptest::prelude::*;
use std::iter::FusedIterator;

/// OS index of a NUMA node
///
/// Valid node ids range from `0` to [`MAX_NODES`](crate::MAX_NODES)
/// (excluded). The type itself can represent any `u32` so that out-of-range
/// ids reported by a misbehaving platform can be carried around and rejected.
#[derive(Copy, Clone, Debug, Default, Display, Eq, From, Hash, Into, Ord, PartialEq, PartialOrd)]
pub struct NodeId(u32);
//
impl NodeId {
    /// Position of this node in the registry, if it fits
    pub(crate) fn slot(self) -> Option<usize> {
        let slot = usize::try_from(self.0).ok()?;
        (slot < crate::MAX_NODES).then_some(slot)
    }
}
//
#[cfg(any(test, feature = "proptest"))]
impl Arbitrary for NodeId {
    type Parameters = ();
    type Strategy = prop::strategy::Map<std::ops::Range<u32>, fn(u32) -> Self>;

    /// Mostly valid node ids, with some out-of-range ones sprinkled in
    fn arbitrary_with((): ()) -> Self::Strategy {
        #[allow(clippy::cast_possible_truncation)]
        let end = (crate::MAX_NODES + crate::MAX_NODES / 8) as u32;
        let from_raw: fn(u32) -> Self = Self;
        (0..end).prop_map(from_raw)
    }
}

/// A NUMA node of a [`Topology`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    /// OS index of this node, which is also its registry slot
    id: NodeId,

    /// Number of CPUs attached to this node
    n_cpus: usize,

    /// Memory blocks owned by this node, created on first block allocation
    lmbs: Option<LmbList>,
}
//
impl Node {
    /// Empty node with the given id
    pub(crate) fn new(id: NodeId) -> Self {
        Self {
            id,
            n_cpus: 0,
            lmbs: None,
        }
    }

    /// OS index of this node
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Number of CPUs attached to this node
    ///
    /// Nodes with zero CPUs are "CPU-less" nodes, whose memory blocks are
    /// accounted separately by [`Topology::cpuless_lmb_count()`].
    pub fn n_cpus(&self) -> usize {
        self.n_cpus
    }

    /// Truth that this node has no CPU attached
    pub fn is_cpuless(&self) -> bool {
        self.n_cpus == 0
    }

    /// Number of memory blocks owned by this node
    pub fn n_lmbs(&self) -> usize {
        self.lmbs.as_ref().map_or(0, LmbList::len)
    }

    /// Block list of this node, if any block allocation ever targeted it
    pub fn lmb_list(&self) -> Option<&LmbList> {
        self.lmbs.as_ref()
    }

    /// Memory blocks of this node, most recently allocated first
    pub fn lmbs(&self) -> impl DoubleEndedIterator<Item = &Lmb> + FusedIterator + Clone {
        self.lmbs.iter().flat_map(LmbList::iter)
    }

    pub(crate) fn set_n_cpus(&mut self, n_cpus: usize) {
        self.n_cpus = n_cpus;
    }

    pub(crate) fn lmb_list_mut(&mut self) -> &mut Option<LmbList> {
        &mut self.lmbs
    }
}
