//! Name Resolver: materializes the record-id -> path table and maps each
//! path to its mount point and filesystem type by longest-prefix match.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use fxhash::FxHashMap;

use crate::error::{DarshanError, Result};
use crate::types::{MountEntry, ModuleId, RecordId};

pub struct NameResolver {
    names: FxHashMap<RecordId, String>,
    mounts: Vec<MountEntry>,
}

impl NameResolver {
    pub fn new(name_region: &[u8], mounts: Vec<MountEntry>) -> Result<Self> {
        let mut names = FxHashMap::default();
        let mut cur = Cursor::new(name_region);
        while (cur.position() as usize) < name_region.len() {
            let record_id = cur
                .read_u64::<LittleEndian>()
                .map_err(|_| DarshanError::FormatError("truncated name table".into()))?;
            let len = cur
                .read_u32::<LittleEndian>()
                .map_err(|_| DarshanError::FormatError("truncated name table".into()))?
                as usize;
            let mut path_bytes = vec![0u8; len];
            cur.read_exact(&mut path_bytes)
                .map_err(|_| DarshanError::FormatError("truncated name table".into()))?;
            let path = String::from_utf8(path_bytes)
                .map_err(|_| DarshanError::FormatError("name table not utf8".into()))?;
            names.insert(record_id, path);
        }

        // Longest mount prefix first so lookup can stop at the first match.
        let mut mounts = mounts;
        mounts.sort_by(|a, b| b.mount_path.len().cmp(&a.mount_path.len()));

        Ok(NameResolver { names, mounts })
    }

    /// Look up the path for a record, substituting a module-specific
    /// placeholder when absent (e.g. BG/Q's synthetic "virtual" record).
    pub fn path_for(&self, record_id: RecordId, module: ModuleId) -> String {
        self.names
            .get(&record_id)
            .cloned()
            .unwrap_or_else(|| placeholder_for(module))
    }

    /// `(mount, fs_type)` via longest-prefix match; `("UNKNOWN", "UNKNOWN")`
    /// if nothing matches.
    pub fn mount_for(&self, path: &str) -> (&str, &str) {
        for entry in &self.mounts {
            if path.starts_with(entry.mount_path.as_str()) {
                return (entry.mount_path.as_str(), entry.fs_type.as_str());
            }
        }
        ("UNKNOWN", "UNKNOWN")
    }

    pub fn mounts(&self) -> &[MountEntry] {
        &self.mounts
    }
}

fn placeholder_for(module: ModuleId) -> String {
    match module {
        ModuleId::BgQ => "<BG/Q virtual record>".to_string(),
        other => format!("<unknown record, module {other}>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_wins() {
        let mounts = vec![
            MountEntry {
                mount_path: "/".to_string(),
                fs_type: "rootfs".to_string(),
            },
            MountEntry {
                mount_path: "/scratch".to_string(),
                fs_type: "lustre".to_string(),
            },
            MountEntry {
                mount_path: "/scratch/proj".to_string(),
                fs_type: "gpfs".to_string(),
            },
        ];
        let resolver = NameResolver::new(&[], mounts).unwrap();
        assert_eq!(
            resolver.mount_for("/scratch/proj/data.h5"),
            ("/scratch/proj", "gpfs")
        );
        assert_eq!(
            resolver.mount_for("/scratch/other.dat"),
            ("/scratch", "lustre")
        );
        assert_eq!(resolver.mount_for("/home/user/a.out"), ("/", "rootfs"));
        assert_eq!(
            NameResolver::new(&[], vec![]).unwrap().mount_for("/x"),
            ("UNKNOWN", "UNKNOWN")
        );
    }

    #[test]
    fn unresolved_record_uses_placeholder() {
        let resolver = NameResolver::new(&[], vec![]).unwrap();
        assert_eq!(
            resolver.path_for(42, ModuleId::BgQ),
            "<BG/Q virtual record>"
        );
        assert!(resolver.path_for(42, ModuleId::Posix).contains("unknown"));
    }
}
