//! Topology acquisition

use super::{description::Description, Topology};
use crate::{
    errors::TopologyError,
    lmb::DrcIndexAllocator,
    platform::{NumaPlatform, ResourceKind},
};
use std::path::PathBuf;

/// Where [`Topology::acquire()`] gets its information from
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub enum RunMode {
    /// Query the live platform
    #[default]
    Live,

    /// Load the static description file at this path
    Test(PathBuf),
}

/// # Topology acquisition
impl Topology {
    /// Build the topology described by `mode`
    ///
    /// In [`RunMode::Live`], `platform` is first queried for the associativity
    /// metadata of dynamic memory, which is kept in the topology, then the
    /// nodes are [discovered](Self::discover). In [`RunMode::Test`], the
    /// description file is [loaded](Self::load_description) and `platform` is
    /// not used. Memory blocks draw their handles from `allocator`.
    ///
    /// # Errors
    ///
    /// - [`NotSupported`](TopologyError::NotSupported) if the platform does
    ///   not support NUMA (live mode).
    /// - [`Platform`](TopologyError::Platform) if a platform query fails
    ///   (live mode).
    /// - [`Config`](TopologyError::Config) if the description file cannot be
    ///   read (test mode).
    /// - [`EmptyTopology`](TopologyError::EmptyTopology) if no node was found.
    /// - Any error of [`discover()`](Self::discover) or
    ///   [`load_description()`](Self::load_description).
    pub fn acquire(
        mode: &RunMode,
        platform: &(impl NumaPlatform + ?Sized),
        allocator: &mut DrcIndexAllocator,
    ) -> Result<Self, TopologyError> {
        let mut topology = Self::new();
        match mode {
            RunMode::Test(path) => {
                let description = Description::from_file(path)?;
                topology.load_description(&description, allocator)?;
            }
            RunMode::Live => {
                if !platform.is_numa_available() {
                    return Err(TopologyError::NotSupported);
                }
                let depth = platform.min_common_depth()?;
                let arrays = platform.associativity_arrays(ResourceKind::DynamicMemory, depth)?;
                topology.min_common_depth = Some(depth);
                topology.associativity = Some(arrays);
                topology.discover(platform)?;
            }
        }

        if topology.node_count() == 0 {
            tracing::warn!("no NUMA node was found");
            return Err(TopologyError::EmptyTopology);
        }
        tracing::info!(
            "acquired {} NUMA nodes ({:?}..={:?}) with {} CPUs, {} LMBs and {} CPU-less LMBs",
            topology.node_count(),
            topology.node_min(),
            topology.node_max(),
            topology.cpu_count(),
            topology.lmb_count(),
            topology.cpuless_lmb_count()
        );
        Ok(topology)
    }
}
