//! Error handling primitives
//!
//! Each failure domain of this crate gets its own error type. Platform queries
//! fail with a [`PlatformError`], static description files fail with a
//! [`ConfigError`], and everything that can go wrong while acquiring a
//! [`Topology`] is funneled into a [`TopologyError`].
//
// Errors are recoverable unless documented otherwise: InvalidNodeId is the only
// variant that signals a broken contract rather than an environmental problem.

use crate::{node::NodeId, MAX_NODES};
#[cfg(doc)]
use crate::{platform::NumaPlatform, topology::Topology};
use hwlocality::{errors::RawHwlocError, topology::builder::StringInputError};
use std::{io, path::PathBuf};
use thiserror::Error;

/// Failure to build a [`Topology`]
#[derive(Debug, Error)]
pub enum TopologyError {
    /// The platform does not support NUMA
    ///
    /// Callers may fall back to a single implicit node.
    #[error("NUMA is not supported on this platform")]
    NotSupported,

    /// The platform reports more nodes than a [`Topology`] can hold
    #[error(
        "platform reports node id {max_node_id}, but at most {max} nodes are supported",
        max = MAX_NODES
    )]
    CapacityExceeded {
        /// Highest node id reported by the platform
        max_node_id: u32,
    },

    /// Storage for a node or memory block could not be allocated
    #[error("out of memory while building the topology")]
    OutOfMemory,

    /// Adding the CPUs of a node would overflow the topology-wide CPU count
    #[error("CPU count of node {0} overflows the topology-wide CPU count")]
    CpuCountOverflow(NodeId),

    /// A node id outside of `0..MAX_NODES` was requested
    ///
    /// This indicates that the topology provider or the description file
    /// broke its contract. It is never silently clamped.
    #[error("node id {0} is out of the supported range 0..{max}", max = MAX_NODES)]
    InvalidNodeId(NodeId),

    /// The static topology description could not be read
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A platform topology query failed
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Acquisition succeeded but yielded no node at all
    #[error("topology does not contain any NUMA node")]
    EmptyTopology,
}
//
impl TopologyError {
    /// Truth that this error is worth falling back or retrying from
    ///
    /// Only [`InvalidNodeId`](Self::InvalidNodeId) indicates a programming or
    /// platform contract violation that should abort the caller.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidNodeId(_))
    }
}

/// Failure of a [`NumaPlatform`] query
#[derive(Debug, Error)]
pub enum PlatformError {
    /// A platform file could not be read
    #[error("failed to read {path}")]
    Io {
        /// File that was being read
        path: PathBuf,

        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A platform file was read, but its content is not understood
    #[error("unexpected content in {path}: {reason}")]
    Malformed {
        /// File that was being read
        path: PathBuf,

        /// What is wrong with the content
        reason: String,
    },

    /// A node was queried that the platform does not know about
    #[error("platform has no NUMA node {0}")]
    UnknownNode(NodeId),

    /// The platform reports no NUMA node at all
    #[error("platform does not report any NUMA node")]
    NoNode,

    /// The CPU set of a node is infinite, so its CPUs cannot be counted
    #[error("NUMA node {0} has an infinite CPU set")]
    UnboundedCpuSet(NodeId),

    /// hwloc failed to build the machine topology
    #[error(transparent)]
    Hwloc(#[from] RawHwlocError),

    /// hwloc rejected a synthetic topology description
    #[error(transparent)]
    InvalidSynthetic(#[from] StringInputError),
}

/// Failure to read a static topology description
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The description file could not be read
    #[error("failed to read topology description {path}")]
    Read {
        /// Path to the description file
        path: PathBuf,

        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The description is not syntactically valid or has wrongly typed fields
    #[error("error at line {line}, column {column} of {origin}: {message}")]
    Parse {
        /// Where the description came from (file path or `<string>`)
        origin: String,

        /// 1-based line of the error
        line: usize,

        /// 1-based column of the error
        column: usize,

        /// Parser diagnostic
        message: String,
    },

    /// A node entry of the description is inconsistent
    #[error("invalid node entry #{entry} of {origin}: {reason}")]
    Invalid {
        /// Where the description came from (file path or `<string>`)
        origin: String,

        /// 0-based index of the offending `[[nodes]]` entry
        entry: usize,

        /// What is wrong with the entry
        reason: String,
    },
}
