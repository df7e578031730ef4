//! Platform topology providers
//!
//! Live topology discovery does not inspect the hardware by itself. Instead, it
//! queries a [`NumaPlatform`], which reports which NUMA nodes exist, which
//! CPUs they own, and the associativity metadata that firmware attaches to
//! reconfigurable resources.
//!
//! [`HwlocPlatform`] is the implementation used on real machines: it gets
//! nodes and CPUs from hwloc and associativity metadata from the firmware
//! [`DeviceTree`]. Tests and tools that need a deterministic answer can build
//! it from an hwloc synthetic description, or provide their own platform.

mod device_tree;
mod hwloc;

pub use self::{device_tree::DeviceTree, hwloc::HwlocPlatform};

use crate::{errors::PlatformError, node::NodeId};
use hwlocality::cpu::cpuset::CpuSet;
use strum::{Display, EnumIter, IntoStaticStr};

/// Source of NUMA topology information
///
/// Queries are synchronous and may block on file system accesses.
pub trait NumaPlatform {
    /// Truth that the platform supports NUMA at all
    fn is_numa_available(&self) -> bool;

    /// Highest node id that the platform may report
    ///
    /// # Errors
    ///
    /// - [`PlatformError`] if the platform cannot be queried.
    fn max_node_id(&self) -> Result<u32, PlatformError>;

    /// Truth that node `id` exists on this platform
    fn node_is_present(&self, id: NodeId) -> bool;

    /// CPUs attached to node `id`
    ///
    /// The returned set is expected to be finite.
    ///
    /// # Errors
    ///
    /// - [`PlatformError`] if the CPU affinity of this node cannot be queried.
    fn cpus_of_node(&self, id: NodeId) -> Result<CpuSet, PlatformError>;

    /// Associativity depth at which resources are grouped into NUMA nodes
    ///
    /// This is the first associativity reference point reported by firmware.
    /// It is 1-based: a depth of `d` designates the `d`-th entry of each
    /// associativity array.
    ///
    /// # Errors
    ///
    /// - [`PlatformError`] if firmware does not report reference points.
    fn min_common_depth(&self) -> Result<u32, PlatformError>;

    /// Associativity lookup arrays of a kind of reconfigurable resource,
    /// interpreted at associativity depth `depth`
    ///
    /// # Errors
    ///
    /// - [`PlatformError`] if firmware does not report lookup arrays for this
    ///   resource kind, or if they are too short for `depth`.
    fn associativity_arrays(
        &self,
        kind: ResourceKind,
        depth: u32,
    ) -> Result<AssociativityArrays, PlatformError>;
}
//
impl<P: NumaPlatform + ?Sized> NumaPlatform for &P {
    fn is_numa_available(&self) -> bool {
        P::is_numa_available(self)
    }

    fn max_node_id(&self) -> Result<u32, PlatformError> {
        P::max_node_id(self)
    }

    fn node_is_present(&self, id: NodeId) -> bool {
        P::node_is_present(self, id)
    }

    fn cpus_of_node(&self, id: NodeId) -> Result<CpuSet, PlatformError> {
        P::cpus_of_node(self, id)
    }

    fn min_common_depth(&self) -> Result<u32, PlatformError> {
        P::min_common_depth(self)
    }

    fn associativity_arrays(
        &self,
        kind: ResourceKind,
        depth: u32,
    ) -> Result<AssociativityArrays, PlatformError> {
        P::associativity_arrays(self, kind, depth)
    }
}

/// Kind of dynamically reconfigurable resource
#[derive(Copy, Clone, Debug, Display, EnumIter, Eq, Hash, IntoStaticStr, PartialEq)]
#[non_exhaustive]
pub enum ResourceKind {
    /// Logical memory blocks
    #[strum(serialize = "dynamic memory")]
    DynamicMemory,
}

/// Mapping from associativity array index to NUMA node
///
/// Each reconfigurable memory block refers to one associativity array by
/// index. Only the entry at the minimum common depth of each array matters to
/// tell which node the block belongs to, so that is all this type keeps.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct AssociativityArrays {
    /// Node id of each array, at the depth the arrays were interpreted at
    nodes: Vec<NodeId>,
}
//
impl AssociativityArrays {
    /// Interpret raw lookup arrays at associativity depth `depth`
    ///
    /// `cells` is the flattened content of `n_arrays` arrays of `array_len`
    /// entries each. Returns `None` if `depth` is zero or exceeds
    /// `array_len`, or if `cells` holds fewer than `n_arrays * array_len`
    /// entries.
    pub fn from_raw(n_arrays: usize, array_len: usize, cells: &[u32], depth: u32) -> Option<Self> {
        let position = usize::try_from(depth).ok()?.checked_sub(1)?;
        if position >= array_len || cells.len() < n_arrays.checked_mul(array_len)? {
            return None;
        }
        let nodes = cells
            .chunks_exact(array_len)
            .take(n_arrays)
            .map(|array| NodeId::from(array[position]))
            .collect();
        Some(Self { nodes })
    }

    /// Number of associativity arrays
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Truth that there is no associativity array
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node designated by associativity array `index`, if it exists
    pub fn node_of(&self, index: usize) -> Option<NodeId> {
        self.nodes.get(index).copied()
    }
}
