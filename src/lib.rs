//! NUMA node and logical memory block topology
//!
//! Dynamic reconfiguration of a partition adds or removes memory in units of
//! logical memory blocks (LMBs), each of which is addressed by a DRC index.
//! Deciding which blocks to move requires knowing which NUMA node owns which
//! blocks, and which nodes have CPUs. This crate builds that picture.
//!
//! A [`Topology`] can be acquired in two ways:
//!
//! - From the live platform, through a [`NumaPlatform`] such as
//!   [`HwlocPlatform`], which gets nodes and their CPUs from hwloc and the
//!   associativity metadata of dynamic memory from the firmware
//!   [`DeviceTree`].
//! - From a static TOML [`Description`], which is how reconfiguration logic is
//!   tested on machines that lack the topology of interest.
//!
//! ```no_run
//! use ppcnuma::{DrcIndexAllocator, HwlocPlatform, RunMode, Topology};
//!
//! # fn main() -> Result<(), ppcnuma::errors::TopologyError> {
//! let platform = HwlocPlatform::new()?;
//! let mut allocator = DrcIndexAllocator::new();
//! let topology = Topology::acquire(&RunMode::Live, &platform, &mut allocator)?;
//! for node in topology.nodes() {
//!     println!("node {}: {} CPUs, {} LMBs", node.id(), node.n_cpus(), node.n_lmbs());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! This crate logs through [`tracing`] and never installs a subscriber.

pub mod errors;
pub mod lmb;
pub mod node;
pub mod platform;
pub mod topology;

pub use self::{
    lmb::{DrcIndex, DrcIndexAllocator, Lmb, LmbSort},
    node::{Node, NodeId},
    platform::{DeviceTree, HwlocPlatform, NumaPlatform},
    topology::{
        description::{Description, NodeDescription},
        RunMode, Topology,
    },
};

/// Number of NUMA nodes that a [`Topology`] can hold
///
/// Valid node ids range from 0 to `MAX_NODES - 1`.
pub const MAX_NODES: usize = 256;
