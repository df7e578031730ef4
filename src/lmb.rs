//! Logical memory blocks
//!
//! A logical memory block (LMB) is the unit of memory that can be added to or
//! removed from a partition by a dynamic reconfiguration operation. Each block
//! is addressed by a [`DrcIndex`] handle, which is handed out by a
//! [`DrcIndexAllocator`] in strictly increasing order.
//!
//! Blocks are owned by exactly one [`Node`], which keeps them in an
//! [`LmbList`]. Blocks are never moved between nodes nor freed individually.

use crate::{errors::TopologyError, node::NodeId, topology::Topology};
#[cfg(doc)]
use crate::node::Node;
use derive_more::{Display, From, Into};
use serde::Deserialize;
use std::iter::FusedIterator;
use strum::{EnumIter, EnumString, IntoStaticStr};

/// Dynamic reconfiguration connector index of a memory block
#[derive(Copy, Clone, Debug, Display, Eq, From, Hash, Into, Ord, PartialEq, PartialOrd)]
#[display("{_0:#010x}")]
pub struct DrcIndex(u32);

/// Source of unique [`DrcIndex`] handles
///
/// Handles are handed out in strictly increasing order and never reused, even
/// when the block they were drawn for could not be created. Sharing one
/// allocator across several topology builds therefore yields handles that are
/// unique across all of these builds.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DrcIndexAllocator {
    /// Next handle to be handed out, `None` once the handle space is exhausted
    next: Option<u32>,
}
//
impl DrcIndexAllocator {
    /// First handle handed out by [`DrcIndexAllocator::new()`]
    pub const DEFAULT_SEED: u32 = 0xdead_beef;

    /// Allocator starting from [`DEFAULT_SEED`](Self::DEFAULT_SEED)
    pub fn new() -> Self {
        Self::with_seed(Self::DEFAULT_SEED)
    }

    /// Allocator whose first handle is `seed`
    pub fn with_seed(seed: u32) -> Self {
        Self { next: Some(seed) }
    }

    /// Handle that the next call to [`next_index()`](Self::next_index) will
    /// return, if any
    pub fn peek(&self) -> Option<DrcIndex> {
        self.next.map(DrcIndex)
    }

    /// Draw a fresh handle
    ///
    /// Returns `None` once `u32::MAX` has been handed out.
    pub fn next_index(&mut self) -> Option<DrcIndex> {
        let current = self.next?;
        self.next = current.checked_add(1);
        Some(DrcIndex(current))
    }
}
//
impl Default for DrcIndexAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// A logical memory block
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct Lmb {
    /// Handle used to target this block in reconfiguration operations
    drc_index: DrcIndex,
}
//
impl Lmb {
    /// Handle used to target this block in reconfiguration operations
    pub fn drc_index(&self) -> DrcIndex {
        self.drc_index
    }
}

/// Order in which the blocks of an [`LmbList`] should be presented to the
/// reconfiguration logic
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Deserialize,
    strum::Display,
    EnumIter,
    EnumString,
    Eq,
    Hash,
    IntoStaticStr,
    PartialEq,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LmbSort {
    /// Increasing DRC index order
    #[default]
    Normal,

    /// Decreasing DRC index order
    Reverse,

    /// Randomized order
    Random,
}

/// Memory blocks owned by a [`Node`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LmbList {
    /// Presentation order, fixed when the list is created
    sort: LmbSort,

    /// Blocks in allocation order, the list head is the last element
    lmbs: Vec<Lmb>,
}
//
impl LmbList {
    /// Empty list with the given presentation order
    pub(crate) fn new(sort: LmbSort) -> Self {
        Self {
            sort,
            lmbs: Vec::new(),
        }
    }

    /// Presentation order of this list
    pub fn sort(&self) -> LmbSort {
        self.sort
    }

    /// Number of blocks in this list
    pub fn len(&self) -> usize {
        self.lmbs.len()
    }

    /// Truth that this list holds no block
    pub fn is_empty(&self) -> bool {
        self.lmbs.is_empty()
    }

    /// Blocks of this list, most recently added first
    pub fn iter(
        &self,
    ) -> impl DoubleEndedIterator<Item = &Lmb> + ExactSizeIterator + FusedIterator + Clone {
        self.lmbs.iter().rev()
    }

    /// Truth that this list holds the block with handle `drc_index`
    pub fn contains(&self, drc_index: DrcIndex) -> bool {
        self.lmbs.iter().any(|lmb| lmb.drc_index == drc_index)
    }

    /// Put a new block at the head of the list
    ///
    /// Fails if storage for the block cannot be reserved.
    fn push_front(&mut self, drc_index: DrcIndex) -> Result<(), TopologyError> {
        self.lmbs
            .try_reserve(1)
            .map_err(|_| TopologyError::OutOfMemory)?;
        self.lmbs.push(Lmb { drc_index });
        Ok(())
    }
}
//
impl<'list> IntoIterator for &'list LmbList {
    type Item = &'list Lmb;
    type IntoIter = std::iter::Rev<std::slice::Iter<'list, Lmb>>;

    fn into_iter(self) -> Self::IntoIter {
        self.lmbs.iter().rev()
    }
}

/// # Memory block allocation
impl Topology {
    /// Create `count` memory blocks on node `node_id`
    ///
    /// The node's block list is created with the `sort` order if it does not
    /// exist yet. An existing list keeps its original order.
    ///
    /// Each block receives a fresh handle from `allocator` and is accounted in
    /// [`lmb_count()`](Self::lmb_count) if the node has CPUs at the time of
    /// the call, in [`cpuless_lmb_count()`](Self::cpuless_lmb_count)
    /// otherwise. A block that cannot be created is logged and skipped, and
    /// the remaining blocks are still attempted. The handle drawn for a
    /// skipped block is not handed out again.
    ///
    /// Returns how many blocks were actually created.
    ///
    /// # Errors
    ///
    /// - [`InvalidNodeId`](TopologyError::InvalidNodeId) if `node_id` is not a
    ///   valid node id.
    /// - [`OutOfMemory`](TopologyError::OutOfMemory) if the node did not exist
    ///   and could not be created.
    pub fn allocate_lmbs(
        &mut self,
        allocator: &mut DrcIndexAllocator,
        node_id: NodeId,
        count: usize,
        sort: LmbSort,
    ) -> Result<usize, TopologyError> {
        let node = self.fetch_or_create_node(node_id)?;
        let cpuless = node.is_cpuless();
        let list = node.lmb_list_mut().get_or_insert_with(|| LmbList::new(sort));

        let mut created = 0;
        for _ in 0..count {
            let Some(drc_index) = allocator.next_index() else {
                tracing::warn!("DRC index space exhausted, cannot create LMB on node {node_id}");
                continue;
            };
            if let Err(e) = list.push_front(drc_index) {
                tracing::warn!("could not create LMB {drc_index} on node {node_id}: {e}");
                continue;
            }
            created += 1;
        }

        self.account_lmbs(cpuless, created);
        tracing::debug!(
            "created {created}/{count} LMBs on node {node_id} ({})",
            if cpuless { "CPU-less" } else { "with CPUs" }
        );
        Ok(created)
    }
}
