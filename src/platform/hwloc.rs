//! hwloc-backed platform

use super::{AssociativityArrays, DeviceTree, NumaPlatform, ResourceKind};
use crate::{errors::PlatformError, node::NodeId};
use hwlocality::{
    cpu::cpuset::CpuSet,
    object::{types::ObjectType, TopologyObject},
    Topology as HwlocTopology,
};
use std::{
    fmt::{self, Debug, Formatter},
    path::PathBuf,
};

/// [`NumaPlatform`] backed by hwloc and the firmware device tree
///
/// NUMA nodes and their CPUs come from an hwloc topology, which is either
/// discovered on the host or built from an hwloc synthetic description.
/// Associativity metadata, which hwloc does not expose, is read from a
/// [`DeviceTree`].
#[derive(Clone)]
pub struct HwlocPlatform {
    /// Source of NUMA nodes and CPU sets
    topology: HwlocTopology,

    /// Source of associativity metadata
    device_tree: DeviceTree,
}
//
impl HwlocPlatform {
    /// Platform describing the host, with the default device tree location
    ///
    /// # Errors
    ///
    /// - [`Hwloc`](PlatformError::Hwloc) if hwloc fails to discover the host.
    pub fn new() -> Result<Self, PlatformError> {
        Ok(Self::with_topology(HwlocTopology::new()?))
    }

    /// Platform whose nodes come from an hwloc synthetic description such as
    /// `pack:2 numa:2 core:2 pu:2`
    ///
    /// # Errors
    ///
    /// - [`InvalidSynthetic`](PlatformError::InvalidSynthetic) if hwloc does
    ///   not understand `description`.
    /// - [`Hwloc`](PlatformError::Hwloc) if hwloc fails to build the topology.
    #[doc(alias = "from_synthetic")]
    pub fn synthetic(description: &str) -> Result<Self, PlatformError> {
        let topology = HwlocTopology::builder()
            .from_synthetic(description)?
            .build()?;
        Ok(Self::with_topology(topology))
    }

    /// Platform whose nodes come from an existing hwloc topology
    pub fn with_topology(topology: HwlocTopology) -> Self {
        Self {
            topology,
            device_tree: DeviceTree::default(),
        }
    }

    /// Read associativity metadata from the device tree at `root`
    pub fn with_device_tree_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.device_tree = DeviceTree::new(root);
        self
    }

    /// hwloc topology that nodes and CPUs are read from
    pub fn hwloc_topology(&self) -> &HwlocTopology {
        &self.topology
    }

    /// Device tree that associativity metadata is read from
    pub fn device_tree(&self) -> &DeviceTree {
        &self.device_tree
    }

    /// NUMA nodes of the hwloc topology
    fn numa_nodes(&self) -> impl Iterator<Item = &TopologyObject> + Clone {
        self.topology.objects_with_type(ObjectType::NUMANode)
    }

    /// NUMA node with OS index `id`, if any
    fn numa_node(&self, id: NodeId) -> Option<&TopologyObject> {
        let os_index = usize::try_from(u32::from(id)).ok()?;
        self.numa_nodes()
            .find(|node| node.os_index() == Some(os_index))
    }
}
//
impl Debug for HwlocPlatform {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("HwlocPlatform")
            .field("numa_nodes", &self.numa_nodes().count())
            .field("device_tree", &self.device_tree)
            .finish_non_exhaustive()
    }
}
//
impl NumaPlatform for HwlocPlatform {
    fn is_numa_available(&self) -> bool {
        self.numa_nodes().next().is_some()
    }

    fn max_node_id(&self) -> Result<u32, PlatformError> {
        let max_os_index = self
            .numa_nodes()
            .filter_map(TopologyObject::os_index)
            .max()
            .ok_or(PlatformError::NoNode)?;
        // Ids that do not fit are rejected by discovery as too large
        Ok(u32::try_from(max_os_index).unwrap_or(u32::MAX))
    }

    fn node_is_present(&self, id: NodeId) -> bool {
        self.numa_node(id).is_some()
    }

    fn cpus_of_node(&self, id: NodeId) -> Result<CpuSet, PlatformError> {
        let node = self.numa_node(id).ok_or(PlatformError::UnknownNode(id))?;
        Ok(node
            .cpuset()
            .map_or_else(CpuSet::new, |cpuset| cpuset.clone_target()))
    }

    fn min_common_depth(&self) -> Result<u32, PlatformError> {
        self.device_tree.min_common_depth()
    }

    fn associativity_arrays(
        &self,
        kind: ResourceKind,
        depth: u32,
    ) -> Result<AssociativityArrays, PlatformError> {
        self.device_tree.associativity_arrays(kind, depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::device_tree::tests::fake_device_tree;
    #[allow(unused)]
    use similar_asserts::assert_eq;
    use static_assertions::assert_impl_all;
    use tempfile::TempDir;

    assert_impl_all!(HwlocPlatform: Clone, Debug, NumaPlatform, Send, Sync);

    /// Two packages with two NUMA nodes each, four PUs per NUMA node
    const FOUR_NODES: &str = "pack:2 numa:2 core:2 pu:2";

    #[test]
    fn synthetic_nodes() {
        let platform = HwlocPlatform::synthetic(FOUR_NODES).unwrap();
        assert!(platform.is_numa_available());
        assert_eq!(platform.max_node_id().unwrap(), 3);
        for raw in 0..4 {
            let id = NodeId::from(raw);
            assert!(platform.node_is_present(id));
            assert_eq!(platform.cpus_of_node(id).unwrap().weight(), Some(4));
        }
        let missing = NodeId::from(4);
        assert!(!platform.node_is_present(missing));
        assert!(matches!(
            platform.cpus_of_node(missing),
            Err(PlatformError::UnknownNode(id)) if id == missing
        ));
    }

    #[test]
    fn node_cpus_are_disjoint() {
        let platform = HwlocPlatform::synthetic(FOUR_NODES).unwrap();
        let first = platform.cpus_of_node(NodeId::from(0)).unwrap();
        let second = platform.cpus_of_node(NodeId::from(1)).unwrap();
        assert!(!first.intersects(&second));
    }

    #[test]
    fn invalid_synthetic() {
        assert!(matches!(
            HwlocPlatform::synthetic("this is not a topology"),
            Err(PlatformError::InvalidSynthetic(_))
        ));
    }

    #[test]
    fn device_tree_queries() {
        let root = TempDir::new().unwrap();
        fake_device_tree(root.path(), 4, &[1, 4, 0, 0, 0, 2]);
        let platform = HwlocPlatform::synthetic(FOUR_NODES)
            .unwrap()
            .with_device_tree_root(root.path());
        assert_eq!(platform.device_tree().root(), root.path());
        assert_eq!(platform.min_common_depth().unwrap(), 4);
        let arrays = platform
            .associativity_arrays(ResourceKind::DynamicMemory, 4)
            .unwrap();
        assert_eq!(arrays.node_of(0), Some(NodeId::from(2)));
    }

    #[test]
    fn debug_output() {
        let platform = HwlocPlatform::synthetic(FOUR_NODES).unwrap();
        let debug = format!("{platform:?}");
        assert!(debug.starts_with("HwlocPlatform"));
        assert!(debug.contains("numa_nodes: 4"));
    }
}
