//! Live topology discovery

use super::Topology;
use crate::{
    errors::{PlatformError, TopologyError},
    node::NodeId,
    platform::NumaPlatform,
    MAX_NODES,
};

/// # Live topology discovery
impl Topology {
    /// Populate this topology with the NUMA nodes of `platform` and their
    /// CPU counts
    ///
    /// Every node that the platform reports as present gets created, and the
    /// number of CPUs that the platform attributes to it is added to its CPU
    /// count. Memory blocks are not touched.
    ///
    /// If the scan fails midway, the CPU counts of all nodes (including
    /// nodes that existed before this call) and the topology-wide CPU count
    /// are reset to zero before the error is returned. Nodes that were
    /// created by the failed scan are kept.
    ///
    /// # Errors
    ///
    /// - [`NotSupported`](TopologyError::NotSupported) if the platform does
    ///   not support NUMA.
    /// - [`CapacityExceeded`](TopologyError::CapacityExceeded) if the
    ///   platform reports a node id that does not fit in a topology.
    /// - [`OutOfMemory`](TopologyError::OutOfMemory) if a node cannot be
    ///   allocated.
    /// - [`Platform`](TopologyError::Platform) if a platform query fails, or
    ///   if a node has infinitely many CPUs.
    /// - [`CpuCountOverflow`](TopologyError::CpuCountOverflow) if the CPU
    ///   count does not fit in a `usize`.
    pub fn discover(&mut self, platform: &(impl NumaPlatform + ?Sized)) -> Result<(), TopologyError> {
        if !platform.is_numa_available() {
            tracing::debug!("platform does not support NUMA");
            return Err(TopologyError::NotSupported);
        }

        let max_node_id = platform.max_node_id()?;
        if usize::try_from(max_node_id).map_or(true, |max| max >= MAX_NODES) {
            tracing::error!(
                "platform reports NUMA node {max_node_id}, but at most {MAX_NODES} nodes are supported"
            );
            return Err(TopologyError::CapacityExceeded { max_node_id });
        }

        if let Err(e) = self.scan_nodes(platform, max_node_id) {
            tracing::warn!(
                "NUMA node scan failed ({e}), resetting the CPU counts of {} nodes",
                self.node_count()
            );
            self.reset_cpu_counts();
            return Err(e);
        }
        tracing::debug!(
            "discovered {} NUMA nodes with {} CPUs",
            self.node_count(),
            self.cpu_count()
        );
        Ok(())
    }

    /// Create the nodes `0..=max_node_id` that are present on `platform`
    /// and count their CPUs
    fn scan_nodes(
        &mut self,
        platform: &(impl NumaPlatform + ?Sized),
        max_node_id: u32,
    ) -> Result<(), TopologyError> {
        for id in (0..=max_node_id).map(NodeId::from) {
            if !platform.node_is_present(id) {
                continue;
            }
            self.fetch_or_create_node(id)?;
            let n_cpus = platform
                .cpus_of_node(id)?
                .weight()
                .ok_or(PlatformError::UnboundedCpuSet(id))?;
            self.add_node_cpus(id, n_cpus)?;
            tracing::debug!("NUMA node {id} has {n_cpus} CPUs");
        }
        Ok(())
    }
}
