//! Static topology descriptions
//!
//! Instead of probing the live platform, a [`Topology`] can be built from a
//! TOML description of its nodes. This is how reconfiguration logic gets
//! tested on machines that do not have the topology of interest.
//!
//! ```toml
//! # Presentation order of every block list, "normal" by default
//! sort = "reverse"
//! # Size of a memory block in bytes, only needed by `mem_bytes`
//! lmb_size = 268435456
//!
//! [[nodes]]
//! node = 0
//! cpus = 4
//! mem = 8
//!
//! [[nodes]]
//! node = 1
//! mem_bytes = 1073741824
//! ```

use super::Topology;
use crate::{
    errors::{ConfigError, TopologyError},
    lmb::{DrcIndexAllocator, LmbSort},
    node::NodeId,
};
use serde::Deserialize;
use std::{fs, ops::Range, path::Path};

/// Origin reported in errors from [`Description::from_toml_str()`]
const STRING_ORIGIN: &str = "<string>";

/// Description file layout, before semantic checks
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDescription {
    #[serde(default)]
    sort: LmbSort,
    lmb_size: Option<u64>,
    #[serde(default)]
    nodes: Vec<RawNode>,
}

/// `[[nodes]]` entry layout, before semantic checks
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNode {
    node: u32,
    #[serde(default)]
    cpus: usize,
    mem: Option<u32>,
    mem_bytes: Option<u64>,
}

/// Static description of a NUMA topology
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Description {
    /// Presentation order of the block lists created from this description
    sort: LmbSort,

    /// Node entries, in file order
    nodes: Vec<NodeDescription>,
}
//
impl Description {
    /// Description with the given block list order and node entries
    pub fn new(sort: LmbSort, nodes: impl IntoIterator<Item = NodeDescription>) -> Self {
        Self {
            sort,
            nodes: nodes.into_iter().collect(),
        }
    }

    /// Read a description file
    ///
    /// # Errors
    ///
    /// - [`Read`](ConfigError::Read) if the file cannot be read.
    /// - [`Parse`](ConfigError::Parse) if the file is not valid TOML or does
    ///   not follow the description layout.
    /// - [`Invalid`](ConfigError::Invalid) if a node entry is inconsistent.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let description = Self::parse(&text, &path.display().to_string())?;
        tracing::debug!(
            "read {} node entries from {}",
            description.nodes.len(),
            path.display()
        );
        Ok(description)
    }

    /// Parse a description from TOML text
    ///
    /// # Errors
    ///
    /// Same as [`from_file()`](Self::from_file), minus the file I/O.
    #[doc(alias = "from_str")]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse(text, STRING_ORIGIN)
    }

    /// Presentation order of the block lists created from this description
    pub fn sort(&self) -> LmbSort {
        self.sort
    }

    /// Node entries, in file order
    pub fn nodes(&self) -> &[NodeDescription] {
        &self.nodes
    }

    fn parse(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let raw = toml::from_str::<RawDescription>(text).map_err(|e| {
            let (line, column) = line_column(text, e.span());
            ConfigError::Parse {
                origin: origin.to_owned(),
                line,
                column,
                message: e.message().trim_end().to_owned(),
            }
        })?;
        let nodes = raw
            .nodes
            .iter()
            .enumerate()
            .map(|(entry, node)| {
                NodeDescription::resolve(node, raw.lmb_size).map_err(|reason| ConfigError::Invalid {
                    origin: origin.to_owned(),
                    entry,
                    reason,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            sort: raw.sort,
            nodes,
        })
    }
}

/// Node entry of a [`Description`]
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct NodeDescription {
    /// Node id
    pub node: NodeId,

    /// Number of CPUs of the node
    pub cpus: usize,

    /// Number of memory blocks of the node
    pub lmbs: usize,
}
//
impl NodeDescription {
    /// Check a raw entry and convert its memory size into a block count
    fn resolve(raw: &RawNode, lmb_size: Option<u64>) -> Result<Self, String> {
        if u32::try_from(raw.cpus).is_err() {
            return Err(format!("{} CPUs is more than a node can hold", raw.cpus));
        }
        let lmbs = match (raw.mem, raw.mem_bytes) {
            (Some(_), Some(_)) => return Err("`mem` and `mem_bytes` are mutually exclusive".to_owned()),
            (Some(mem), None) => mem,
            (None, Some(bytes)) => {
                let lmb_size = lmb_size
                    .filter(|&size| size != 0)
                    .ok_or_else(|| "`mem_bytes` requires a non-zero top-level `lmb_size`".to_owned())?;
                if bytes % lmb_size != 0 {
                    return Err(format!("{bytes} bytes is not a whole number of {lmb_size}-byte blocks"));
                }
                u32::try_from(bytes / lmb_size)
                    .map_err(|_| format!("{bytes} bytes is too many {lmb_size}-byte blocks"))?
            }
            (None, None) => 0,
        };
        Ok(Self {
            node: NodeId::from(raw.node),
            cpus: raw.cpus,
            lmbs: lmbs as usize,
        })
    }
}

/// 1-based line and column of the start of `span` in `text`
///
/// Errors without a location are reported at the end of the text.
fn line_column(text: &str, span: Option<Range<usize>>) -> (usize, usize) {
    let offset = span.map_or(text.len(), |span| span.start.min(text.len()));
    let before = text.get(..offset).unwrap_or(text);
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |newline| newline + 1);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

/// # Static topology descriptions
impl Topology {
    /// Populate this topology from a static description
    ///
    /// For each node entry, in order, the node is created if needed, its CPU
    /// count is set to the entry's CPU count, and the entry's memory blocks
    /// are allocated with handles from `allocator`. On success, the topology
    /// is marked as [synthetic](Self::is_synthetic).
    ///
    /// An entry repeating the id of an already loaded node replaces that
    /// node's CPU count and adds its blocks to the node's existing list.
    ///
    /// # Errors
    ///
    /// - [`InvalidNodeId`](TopologyError::InvalidNodeId) if an entry targets a
    ///   node id that does not fit in a topology.
    /// - [`OutOfMemory`](TopologyError::OutOfMemory) if a node cannot be
    ///   allocated.
    /// - [`CpuCountOverflow`](TopologyError::CpuCountOverflow) if the CPU
    ///   counts of the entries add up beyond `usize::MAX`.
    ///
    /// Loading stops at the first failing entry. Entries before it remain
    /// loaded, but the topology is not marked as synthetic.
    pub fn load_description(
        &mut self,
        description: &Description,
        allocator: &mut DrcIndexAllocator,
    ) -> Result<(), TopologyError> {
        for entry in description.nodes() {
            self.set_node_cpus(entry.node, entry.cpus)?;
            self.allocate_lmbs(allocator, entry.node, entry.lmbs, description.sort())?;
        }
        self.synthetic = true;
        tracing::debug!(
            "loaded {} node entries with {} sorting",
            description.nodes().len(),
            description.sort()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{errors::ConfigError, MAX_NODES};
    #[allow(unused)]
    use similar_asserts::assert_eq;
    use static_assertions::assert_impl_all;
    use std::io::Write;
    use tempfile::NamedTempFile;

    assert_impl_all!(Description: Clone, Default, Send, Sync);
    assert_impl_all!(NodeDescription: Copy, Send, Sync);

    fn entry(node: u32, cpus: usize, lmbs: usize) -> NodeDescription {
        NodeDescription {
            node: NodeId::from(node),
            cpus,
            lmbs,
        }
    }

    #[test]
    fn full_description() {
        let description = Description::from_toml_str(
            r#"
            sort = "reverse"
            lmb_size = 256

            [[nodes]]
            node = 0
            cpus = 4
            mem = 8

            [[nodes]]
            node = 2
            mem_bytes = 1024

            [[nodes]]
            node = 3
            "#,
        )
        .unwrap();
        assert_eq!(description.sort(), LmbSort::Reverse);
        assert_eq!(
            description.nodes(),
            &[entry(0, 4, 8), entry(2, 0, 4), entry(3, 0, 0)]
        );
    }

    #[test]
    fn empty_description() {
        let description = Description::from_toml_str("").unwrap();
        assert_eq!(description, Description::default());
        assert_eq!(description.sort(), LmbSort::Normal);
    }

    #[test]
    fn syntax_error_location() {
        let error = Description::from_toml_str("[[nodes]]\nnode = 0\ncpus = \"four\"\n").unwrap_err();
        let ConfigError::Parse {
            origin,
            line,
            column,
            ..
        } = error
        else {
            panic!("expected a parse error, got {error:?}");
        };
        assert_eq!(origin, "<string>");
        assert_eq!(line, 3);
        assert_eq!(column, 8);
    }

    #[test]
    fn schema_errors() {
        for text in [
            "[[nodes]]\ncpus = 4\n",
            "[[nodes]]\nnode = 0\nmemory = 4\n",
            "[[nodes]]\nnode = -1\n",
            "sort = \"sideways\"\n",
            "colour = \"blue\"\n",
        ] {
            let result = Description::from_toml_str(text);
            assert!(
                matches!(result, Err(ConfigError::Parse { .. })),
                "{text:?} gave {result:?}"
            );
        }
    }

    #[test]
    fn invalid_entries() {
        let cases = [
            ("[[nodes]]\nnode = 0\n[[nodes]]\nnode = 1\nmem = 1\nmem_bytes = 256\n", 1),
            ("[[nodes]]\nnode = 0\nmem_bytes = 256\n", 0),
            ("lmb_size = 0\n[[nodes]]\nnode = 0\nmem_bytes = 256\n", 0),
            ("lmb_size = 256\n[[nodes]]\nnode = 0\nmem_bytes = 300\n", 0),
            ("lmb_size = 1\n[[nodes]]\nnode = 0\nmem_bytes = 8589934592\n", 0),
            ("[[nodes]]\nnode = 0\ncpus = 4294967296\n", 0),
        ];
        for (text, expected_entry) in cases {
            let result = Description::from_toml_str(text);
            let Err(ConfigError::Invalid { entry, .. }) = result else {
                panic!("{text:?} gave {result:?}");
            };
            assert_eq!(entry, expected_entry);
        }
    }

    #[test]
    fn from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[[nodes]]\nnode = 1\ncpus = 2\nmem = 3").unwrap();
        let description = Description::from_file(file.path()).unwrap();
        assert_eq!(description.nodes(), &[entry(1, 2, 3)]);

        writeln!(file, "bogus").unwrap();
        let Err(ConfigError::Parse { origin, line, .. }) = Description::from_file(file.path()) else {
            panic!("expected a parse error");
        };
        assert_eq!(origin, file.path().display().to_string());
        assert_eq!(line, 5);
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(matches!(
            Description::from_file(&path),
            Err(ConfigError::Read { path: p, .. }) if p == path
        ));
    }

    #[test]
    fn line_columns() {
        assert_eq!(line_column("abc", Some(0..1)), (1, 1));
        assert_eq!(line_column("abc\ndef", Some(5..6)), (2, 2));
        assert_eq!(line_column("abc\n", None), (2, 1));
        assert_eq!(line_column("é = x", Some(5..6)), (1, 5));
    }

    #[test]
    fn load() {
        let description = Description::new(LmbSort::Normal, [entry(0, 4, 8), entry(2, 2, 4)]);
        let mut topology = Topology::new();
        let mut allocator = DrcIndexAllocator::new();
        topology.load_description(&description, &mut allocator).unwrap();
        assert!(topology.is_synthetic());
        assert_eq!(topology.node_count(), 2);
        assert_eq!(topology.node_min(), Some(NodeId::from(0)));
        assert_eq!(topology.node_max(), Some(NodeId::from(2)));
        assert_eq!(topology.cpu_count(), 6);
        assert_eq!(topology.lmb_count(), 12);
        assert_eq!(topology.cpuless_lmb_count(), 0);
    }

    #[test]
    fn load_cpuless() {
        let description = Description::new(LmbSort::Random, [entry(1, 0, 3)]);
        let mut topology = Topology::new();
        topology
            .load_description(&description, &mut DrcIndexAllocator::new())
            .unwrap();
        assert_eq!(topology.cpuless_lmb_count(), 3);
        assert_eq!(topology.lmb_count(), 0);
        let node = topology.node(NodeId::from(1)).unwrap();
        assert_eq!(node.lmb_list().unwrap().sort(), LmbSort::Random);
    }

    #[test]
    fn repeated_entry() {
        let description = Description::new(LmbSort::Normal, [entry(0, 4, 2), entry(0, 6, 3)]);
        let mut topology = Topology::new();
        topology
            .load_description(&description, &mut DrcIndexAllocator::new())
            .unwrap();
        assert_eq!(topology.node_count(), 1);
        assert_eq!(topology.cpu_count(), 6);
        assert_eq!(topology.node(NodeId::from(0)).unwrap().n_lmbs(), 5);
        assert_eq!(topology.lmb_count(), 5);
    }

    #[test]
    fn load_fails_fast() {
        let description = Description::new(
            LmbSort::Normal,
            [entry(0, 1, 1), entry(MAX_NODES as u32, 1, 1), entry(1, 1, 1)],
        );
        let mut topology = Topology::new();
        let mut allocator = DrcIndexAllocator::new();
        let result = topology.load_description(&description, &mut allocator);
        assert!(matches!(result, Err(TopologyError::InvalidNodeId(_))));
        assert!(!topology.is_synthetic());
        assert_eq!(topology.node_count(), 1);
        assert_eq!(topology.lmb_count(), 1);
    }

    #[test]
    fn huge_cpu_counts() {
        let text = "[[nodes]]\nnode = 0\ncpus = 9223372036854775807\n\
                    [[nodes]]\nnode = 1\ncpus = 9223372036854775807\n\
                    [[nodes]]\nnode = 2\ncpus = 9223372036854775807\n";
        assert!(matches!(
            Description::from_toml_str(text),
            Err(ConfigError::Invalid { entry: 0, .. })
        ));

        // Descriptions built in code skip the per-entry bound
        let description = Description::new(
            LmbSort::Normal,
            [entry(0, usize::MAX, 1), entry(1, usize::MAX, 1)],
        );
        let mut topology = Topology::new();
        let mut allocator = DrcIndexAllocator::new();
        let result = topology.load_description(&description, &mut allocator);
        assert!(matches!(
            result,
            Err(TopologyError::CpuCountOverflow(id)) if id == NodeId::from(1)
        ));
        assert!(!topology.is_synthetic());
        assert_eq!(topology.cpu_count(), usize::MAX);
        assert_eq!(topology.node(NodeId::from(1)).unwrap().n_cpus(), 0);
    }
}
