//! The file table: one entry per open handle.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::{KernelError, Result};
use crate::registry::{AccessMethod, Architecture, BinaryEncoding};
use crate::summary::ArrayShape;
use crate::units::Unit;

/// Opaque identifier of one open file.  Positive for array-table files,
/// negative for segmented-table files.  Never reused within a process.
pub type Handle = i32;

/// FWARD, BWARD and FREE of an array-table file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DirectoryPointers {
    pub fward: i32,
    pub bward: i32,
    pub free: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    pub handle: Handle,
    pub path: PathBuf,
    /// Lookup key for [`FileTable::find_by_name`]; empty for scratch files.
    #[serde(skip)]
    pub name: String,
    pub architecture: Architecture,
    pub encoding: BinaryEncoding,
    pub method: AccessMethod,
    /// Bound unit, mirrored from the unit pool.
    pub unit: Option<Unit>,
    /// Descriptor shape; array-table files only.
    #[serde(skip)]
    pub shape: Option<ArrayShape>,
    pub pointers: Option<DirectoryPointers>,
}

/// Normalised lookup key of a path: blanks trimmed, case folded.
pub fn lookup_key(path: &str) -> String {
    path.trim().to_lowercase()
}

#[derive(Debug)]
pub struct FileTable {
    entries: Vec<FileEntry>,
    capacity: usize,
    serial: i32,
}

impl FileTable {
    pub fn new(capacity: usize) -> Self {
        Self { entries: Vec::new(), capacity, serial: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Reserve the next handle for `architecture`.
    pub fn next_handle(&mut self, architecture: Architecture) -> Result<Handle> {
        if self.is_full() {
            return Err(KernelError::FileTableFull { capacity: self.capacity });
        }
        self.serial = self
            .serial
            .checked_add(1)
            .ok_or(KernelError::FileTableFull { capacity: self.capacity })?;
        Ok(match architecture {
            Architecture::Daf => self.serial,
            Architecture::Das => -self.serial,
        })
    }

    pub fn insert(&mut self, entry: FileEntry) -> Result<()> {
        if self.is_full() {
            return Err(KernelError::FileTableFull { capacity: self.capacity });
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn remove(&mut self, handle: Handle) -> Option<FileEntry> {
        let idx = self.entries.iter().position(|e| e.handle == handle)?;
        Some(self.entries.remove(idx))
    }

    pub fn get(&self, handle: Handle) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.handle == handle)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut FileEntry> {
        self.entries.iter_mut().find(|e| e.handle == handle)
    }

    pub fn entry(&self, handle: Handle) -> Result<&FileEntry> {
        self.get(handle).ok_or(KernelError::NoSuchHandle(handle))
    }

    pub fn entry_mut(&mut self, handle: Handle) -> Result<&mut FileEntry> {
        self.get_mut(handle).ok_or(KernelError::NoSuchHandle(handle))
    }

    /// Handle of the open file named `path`, compared without regard to
    /// surrounding blanks or case.
    pub fn find_by_name(&self, path: &str) -> Option<Handle> {
        let key = lookup_key(path);
        if key.is_empty() {
            return None;
        }
        self.entries.iter().find(|e| e.name == key).map(|e| e.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(handle: Handle, path: &str) -> FileEntry {
        FileEntry {
            handle,
            path: PathBuf::from(path),
            name: lookup_key(path),
            architecture: Architecture::Daf,
            encoding: BinaryEncoding::LtlIeee,
            method: AccessMethod::Read,
            unit: None,
            shape: None,
            pointers: None,
        }
    }

    #[test]
    fn handles_carry_architecture_sign() {
        let mut t = FileTable::new(4);
        assert_eq!(t.next_handle(Architecture::Daf).unwrap(), 1);
        assert_eq!(t.next_handle(Architecture::Das).unwrap(), -2);
        assert_eq!(t.next_handle(Architecture::Daf).unwrap(), 3);
    }

    #[test]
    fn name_lookup_ignores_blanks_and_case() {
        let mut t = FileTable::new(4);
        t.insert(entry(1, "name.ext")).unwrap();
        assert_eq!(t.find_by_name("  name.ext"), Some(1));
        assert_eq!(t.find_by_name("NAME.EXT"), Some(1));
        assert_eq!(t.find_by_name("   "), None);
        assert_eq!(t.find_by_name("other.ext"), None);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut t = FileTable::new(1);
        t.insert(entry(1, "a")).unwrap();
        assert!(matches!(t.next_handle(Architecture::Daf), Err(KernelError::FileTableFull { capacity: 1 })));
        assert!(t.insert(entry(2, "b")).is_err());
        t.remove(1).unwrap();
        assert!(t.remove(1).is_none());
        assert!(t.next_handle(Architecture::Daf).is_ok());
    }
}
