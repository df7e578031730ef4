//! Firmware device tree

use super::{AssociativityArrays, ResourceKind};
use crate::errors::PlatformError;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Reader of the associativity properties of the flattened firmware device
/// tree, as exposed by Linux under `/proc/device-tree`
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DeviceTree {
    /// Root of the device tree
    root: PathBuf,
}
//
impl DeviceTree {
    /// Default location of the firmware device tree
    pub const DEFAULT_ROOT: &'static str = "/proc/device-tree";

    /// Device tree rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root of the device tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// First associativity reference point
    ///
    /// # Errors
    ///
    /// - [`PlatformError`] if the `rtas/ibm,associativity-reference-points`
    ///   property cannot be read or is empty.
    pub fn min_common_depth(&self) -> Result<u32, PlatformError> {
        let path = self
            .root
            .join("rtas")
            .join("ibm,associativity-reference-points");
        let cells = read_cells(&path)?;
        cells
            .first()
            .copied()
            .ok_or_else(|| PlatformError::Malformed {
                path,
                reason: "no associativity reference point".to_owned(),
            })
    }

    /// Associativity lookup arrays of `kind`, interpreted at `depth`
    ///
    /// # Errors
    ///
    /// - [`PlatformError`] if the lookup array property cannot be read, or is
    ///   too short for its header or for `depth`.
    pub fn associativity_arrays(
        &self,
        kind: ResourceKind,
        depth: u32,
    ) -> Result<AssociativityArrays, PlatformError> {
        let path = self.lookup_arrays_path(kind);
        let cells = read_cells(&path)?;
        let malformed = |reason: String| PlatformError::Malformed {
            path: path.clone(),
            reason,
        };
        let [n_arrays, array_len, arrays @ ..] = cells.as_slice() else {
            return Err(malformed("missing lookup array header".to_owned()));
        };
        let (n_arrays, array_len) = (*n_arrays as usize, *array_len as usize);
        let result = AssociativityArrays::from_raw(n_arrays, array_len, arrays, depth);
        let arrays = result.ok_or_else(|| {
            malformed(format!(
                "{n_arrays} arrays of {array_len} entries cannot be read at depth {depth} \
                 from {} entries",
                arrays.len()
            ))
        })?;
        tracing::debug!(
            "read {} {kind} associativity arrays at depth {depth}",
            arrays.len()
        );
        Ok(arrays)
    }

    /// Property holding the lookup arrays of `kind`
    fn lookup_arrays_path(&self, kind: ResourceKind) -> PathBuf {
        match kind {
            ResourceKind::DynamicMemory => self
                .root
                .join("ibm,dynamic-reconfiguration-memory")
                .join("ibm,associativity-lookup-arrays"),
        }
    }
}
//
impl Default for DeviceTree {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ROOT)
    }
}

/// Read a device tree property made of big-endian 32-bit cells
fn read_cells(path: &Path) -> Result<Vec<u32>, PlatformError> {
    let bytes = fs::read(path).map_err(|source| PlatformError::Io {
        path: path.to_owned(),
        source,
    })?;
    if bytes.len() % 4 != 0 {
        return Err(PlatformError::Malformed {
            path: path.to_owned(),
            reason: format!("{} bytes is not a whole number of cells", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|cell| u32::from_be_bytes([cell[0], cell[1], cell[2], cell[3]]))
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::node::NodeId;
    #[allow(unused)]
    use similar_asserts::assert_eq;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;
    use tempfile::TempDir;

    assert_impl_all!(DeviceTree: Clone, Debug, Default, Send, Sync);

    /// Write a device tree property made of big-endian cells
    pub(crate) fn write_cells(path: &Path, cells: &[u32]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let bytes = cells
            .iter()
            .flat_map(|cell| cell.to_be_bytes())
            .collect::<Vec<_>>();
        fs::write(path, bytes).unwrap();
    }

    /// Device tree with reference points `[depth, 2]` and the given raw
    /// dynamic memory lookup arrays
    pub(crate) fn fake_device_tree(root: &Path, depth: u32, lookup_arrays: &[u32]) -> DeviceTree {
        write_cells(
            &root.join("rtas/ibm,associativity-reference-points"),
            &[depth, 2],
        );
        write_cells(
            &root.join("ibm,dynamic-reconfiguration-memory/ibm,associativity-lookup-arrays"),
            lookup_arrays,
        );
        DeviceTree::new(root)
    }

    #[test]
    fn default_root() {
        assert_eq!(DeviceTree::default().root(), Path::new("/proc/device-tree"));
    }

    #[test]
    fn missing_properties() {
        let root = TempDir::new().unwrap();
        let device_tree = DeviceTree::new(root.path());
        assert!(matches!(
            device_tree.min_common_depth(),
            Err(PlatformError::Io { .. })
        ));
        assert!(matches!(
            device_tree.associativity_arrays(ResourceKind::DynamicMemory, 1),
            Err(PlatformError::Io { .. })
        ));
    }

    #[test]
    fn associativity() {
        let root = TempDir::new().unwrap();
        let device_tree = fake_device_tree(root.path(), 4, &[2, 4, 0, 0, 0, 0, 0, 0, 1, 1]);
        assert_eq!(device_tree.min_common_depth().unwrap(), 4);
        let arrays = device_tree
            .associativity_arrays(ResourceKind::DynamicMemory, 4)
            .unwrap();
        assert_eq!(arrays.len(), 2);
        assert_eq!(arrays.node_of(1), Some(NodeId::from(1)));

        assert!(matches!(
            device_tree.associativity_arrays(ResourceKind::DynamicMemory, 5),
            Err(PlatformError::Malformed { .. })
        ));
    }

    #[test]
    fn malformed_properties() {
        let root = TempDir::new().unwrap();
        let device_tree = fake_device_tree(root.path(), 4, &[2]);
        assert!(matches!(
            device_tree.associativity_arrays(ResourceKind::DynamicMemory, 1),
            Err(PlatformError::Malformed { .. })
        ));

        let lookup_arrays = device_tree.lookup_arrays_path(ResourceKind::DynamicMemory);
        fs::write(&lookup_arrays, [0u8; 3]).unwrap();
        assert!(matches!(
            device_tree.associativity_arrays(ResourceKind::DynamicMemory, 1),
            Err(PlatformError::Malformed { .. })
        ));

        write_cells(&root.path().join("rtas/ibm,associativity-reference-points"), &[]);
        assert!(matches!(
            device_tree.min_common_depth(),
            Err(PlatformError::Malformed { .. })
        ));
    }
}
