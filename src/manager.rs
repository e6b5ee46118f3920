//! The handle manager: owns the file table and the unit pool.
//!
//! Every handle-level read or write goes through [`FileManager::with_channel`],
//! which attaches a unit (recycling another handle's if needed), keeps the
//! file table's view of bound units in step with the pool, and applies the
//! file's encoding and directory bounds.
//!
//! A process-wide instance is available through [`global`]; tests and
//! embedders that want isolation construct their own [`FileManager`].

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use tracing::{debug, info, warn};

use crate::codec::decode_words;
use crate::config::PoolConfig;
use crate::directory::{self, Channel};
use crate::error::{KernelError, Result};
use crate::file_record::{word_record, FileRecord, SegmentedFileRecord, RECORD_BYTES};
use crate::files::{lookup_key, DirectoryPointers, FileEntry, FileTable, Handle};
use crate::registry::{AccessMethod, Architecture, BinaryEncoding};
use crate::summary::{ArrayShape, NameRecord, SummaryRecord};
use crate::units::{Unit, UnitPool};

#[derive(Debug)]
pub struct FileManager {
    config: PoolConfig,
    files: FileTable,
    units: UnitPool<Channel>,
}

impl Default for FileManager {
    fn default() -> Self {
        let config = PoolConfig::default();
        Self { files: FileTable::new(config.file_table_size), units: UnitPool::new(&config), config }
    }
}

fn open_channel(path: &Path, method: AccessMethod) -> Result<Channel> {
    let file = match method {
        AccessMethod::Read => File::open(path),
        AccessMethod::Write => OpenOptions::new().read(true).write(true).open(path),
        AccessMethod::New => OpenOptions::new().read(true).write(true).create_new(true).open(path),
        AccessMethod::Scratch => tempfile::tempfile(),
    };
    let file = file.map_err(|e| KernelError::io("open", path, e))?;
    Ok(Channel::new(file, path))
}

/// Reopen a file whose unit was recycled.  Files created with NEW are
/// reopened for update, never recreated.
fn reopen_channel(path: &Path, method: AccessMethod) -> Result<Channel> {
    match method {
        AccessMethod::New => open_channel(path, AccessMethod::Write),
        AccessMethod::Scratch => Err(KernelError::MalformedFileRecord {
            detail: "scratch file lost its unit".into(),
        }),
        other => open_channel(path, other),
    }
}

/// Word addresses are stored on disk as 32-bit integers.
const MAX_WORD_ADDRESS: u64 = i32::MAX as u64;

fn architecture_of(handle: Handle) -> Option<Architecture> {
    match handle {
        h if h > 0 => Some(Architecture::Daf),
        h if h < 0 => Some(Architecture::Das),
        _ => None,
    }
}

impl FileManager {
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { files: FileTable::new(config.file_table_size), units: UnitPool::new(&config), config })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    // ── Open and close ───────────────────────────────────────────────────────

    /// Open `path` for `method` as an `architecture` file.
    ///
    /// NEW and SCRATCH files use the host's native encoding; see
    /// [`open_new`](Self::open_new) and [`open_scratch`](Self::open_scratch)
    /// to choose another.
    pub fn open(&mut self, path: impl AsRef<Path>, method: AccessMethod, architecture: Architecture) -> Result<Handle> {
        match method {
            AccessMethod::Scratch => self.open_scratch(architecture, BinaryEncoding::native()),
            _ => self.open_path(path.as_ref(), method, architecture, BinaryEncoding::native()),
        }
    }

    /// Create `path`, which must not exist, for writing in `encoding`.
    pub fn open_new(&mut self, path: impl AsRef<Path>, architecture: Architecture, encoding: BinaryEncoding) -> Result<Handle> {
        self.open_path(path.as_ref(), AccessMethod::New, architecture, encoding)
    }

    /// Open an anonymous scratch file.  Its unit is locked until it closes.
    pub fn open_scratch(&mut self, architecture: Architecture, encoding: BinaryEncoding) -> Result<Handle> {
        let handle = self.files.next_handle(architecture)?;
        self.units.set_active(Some(handle));
        let attached = self.units.attach(handle, || open_channel(Path::new(""), AccessMethod::Scratch));
        self.units.set_active(None);
        let attachment = attached?;
        self.forget_unit(attachment.evicted);
        if let Err(e) = self.units.lock(handle, true) {
            self.units.release(handle);
            return Err(e);
        }
        self.files.insert(FileEntry {
            handle,
            path: PathBuf::new(),
            name: String::new(),
            architecture,
            encoding,
            method: AccessMethod::Scratch,
            unit: Some(attachment.unit),
            shape: None,
            pointers: None,
        })?;
        debug!(handle, unit = attachment.unit, %architecture, "opened scratch file");
        Ok(handle)
    }

    fn open_path(
        &mut self,
        path: &Path,
        method: AccessMethod,
        architecture: Architecture,
        encoding: BinaryEncoding,
    ) -> Result<Handle> {
        let text = path.to_string_lossy();
        let key = lookup_key(&text);
        if key.is_empty() {
            return Err(KernelError::BlankFileName);
        }
        let path = PathBuf::from(text.trim());

        if let Some(existing) = self.files.find_by_name(&key).and_then(|h| self.files.get(h)) {
            if existing.method == AccessMethod::Read
                && method == AccessMethod::Read
                && existing.architecture == architecture
            {
                return Ok(existing.handle);
            }
            return Err(KernelError::OpenConflict { path, method });
        }

        let exists = path.exists();
        match method {
            AccessMethod::Read | AccessMethod::Write if !exists => return Err(KernelError::FileNotFound(path)),
            AccessMethod::New if exists => return Err(KernelError::FileExists(path)),
            _ => {}
        }

        let handle = self.files.next_handle(architecture)?;
        self.units.set_active(Some(handle));
        let attached = self.units.attach(handle, || open_channel(&path, method));
        self.units.set_active(None);
        let attachment = attached?;
        self.forget_unit(attachment.evicted);

        let mut entry = FileEntry {
            handle,
            path: path.clone(),
            name: key,
            architecture,
            encoding,
            method,
            unit: Some(attachment.unit),
            shape: None,
            pointers: None,
        };

        if method != AccessMethod::New {
            if let Err(e) = self.load_first_record(&mut entry) {
                self.units.release(handle);
                return Err(e);
            }
        }

        if let Err(e) = self.files.insert(entry) {
            self.units.release(handle);
            if method == AccessMethod::New {
                let _ = std::fs::remove_file(&path);
            }
            return Err(e);
        }
        info!(handle, path = %path.display(), %method, %architecture, "opened file");
        Ok(handle)
    }

    /// Validate record 1 of a freshly attached file and record what it says.
    fn load_first_record(&mut self, entry: &mut FileEntry) -> Result<()> {
        let unit = entry.unit.ok_or(KernelError::NoSuchHandle(entry.handle))?;
        let channel = self.units.channel_mut(unit).ok_or(KernelError::NoSuchHandle(entry.handle))?;
        let (record, first) = directory::inspect_first_record(channel, entry.architecture)?;
        entry.encoding = first.encoding;
        if entry.architecture == Architecture::Daf {
            let fr = FileRecord::decode(&record, first.encoding)?;
            entry.shape = Some(fr.shape()?);
            entry.pointers = Some(DirectoryPointers { fward: fr.fward, bward: fr.bward, free: fr.free });
        }
        Ok(())
    }

    /// Close `handle`, releasing its table slot and unit.  Unknown handles
    /// are ignored.
    pub fn close(&mut self, handle: Handle) -> Result<()> {
        let Some(entry) = self.files.remove(handle) else {
            return Ok(());
        };
        if let Some(mut channel) = self.units.release(handle) {
            if entry.method.is_writable() {
                channel.flush()?;
            }
        }
        debug!(handle, path = %entry.path.display(), "closed file");
        Ok(())
    }

    /// Close `handle` and delete its file.
    pub fn close_and_delete(&mut self, handle: Handle) -> Result<()> {
        let Some(entry) = self.files.remove(handle) else {
            return Ok(());
        };
        drop(self.units.release(handle));
        if entry.method != AccessMethod::Scratch {
            std::fs::remove_file(&entry.path).map_err(|e| KernelError::io("delete", &entry.path, e))?;
        }
        debug!(handle, path = %entry.path.display(), "closed and deleted file");
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn find_by_name(&self, path: &str) -> Option<Handle> {
        self.files.find_by_name(path)
    }

    pub fn info(&self, handle: Handle) -> Result<&FileEntry> {
        self.files.entry(handle)
    }

    pub fn open_count(&self) -> usize {
        self.files.len()
    }

    pub fn free_units(&self) -> usize {
        self.units.free_count()
    }

    pub fn unit_of(&self, handle: Handle) -> Option<Unit> {
        self.units.lookup_unit(handle)
    }

    pub fn handle_of(&self, unit: Unit) -> Option<Handle> {
        self.units.lookup_handle(unit)
    }

    // ── Unit locking ─────────────────────────────────────────────────────────

    /// Attach `handle` and pin its unit until [`unlock_unit`](Self::unlock_unit).
    pub fn lock_unit(&mut self, handle: Handle) -> Result<Unit> {
        let unit = self.with_channel(handle, |_, _| Ok(()))?.1;
        self.units.lock(handle, false)?;
        Ok(unit)
    }

    pub fn unlock_unit(&mut self, handle: Handle) {
        self.units.unlock(handle);
    }

    // ── Channel access ───────────────────────────────────────────────────────

    fn forget_unit(&mut self, evicted: Option<Handle>) {
        if let Some(old) = evicted {
            if let Some(e) = self.files.get_mut(old) {
                e.unit = None;
            }
        }
    }

    /// Run `f` on `handle`'s channel, attaching a unit first.
    fn with_channel<T, F>(&mut self, handle: Handle, f: F) -> Result<(T, Unit)>
    where
        F: FnOnce(&mut Channel, &FileEntry) -> Result<T>,
    {
        let entry = self.files.entry(handle)?.clone();
        self.units.set_active(Some(handle));
        let attached = self.units.attach(handle, || reopen_channel(&entry.path, entry.method));
        let result = attached.and_then(|a| {
            self.forget_unit(a.evicted);
            if let Some(e) = self.files.get_mut(handle) {
                e.unit = Some(a.unit);
            }
            if a.fresh {
                debug!(handle, unit = a.unit, "reattached file");
            }
            let channel = self.units.channel_mut(a.unit).ok_or(KernelError::NoSuchHandle(handle))?;
            f(channel, &entry).map(|v| (v, a.unit))
        });
        self.units.set_active(None);
        result
    }

    fn expect_architecture(&self, handle: Handle, expected: Architecture) -> Result<&FileEntry> {
        let found = architecture_of(handle).ok_or(KernelError::NoSuchHandle(handle))?;
        if found != expected {
            return Err(KernelError::HandleArchitectureMismatch { handle, expected, found });
        }
        self.files.entry(handle)
    }

    fn expect_writable(&self, handle: Handle) -> Result<()> {
        let entry = self.files.entry(handle)?;
        if !entry.method.is_writable() {
            return Err(KernelError::ReadOnly { handle, method: entry.method });
        }
        Ok(())
    }

    /// Shape and pointers of an array-table handle whose file record is known.
    fn directory(&self, handle: Handle) -> Result<(ArrayShape, DirectoryPointers, BinaryEncoding)> {
        let entry = self.expect_architecture(handle, Architecture::Daf)?;
        match (entry.shape, entry.pointers) {
            (Some(shape), Some(pointers)) => Ok((shape, pointers, entry.encoding)),
            _ => Err(KernelError::MalformedFileRecord {
                detail: format!("file record of {} has not been written", entry.path.display()),
            }),
        }
    }

    fn check_record(handle: Handle, record: u32, lower: u32, upper: u32) -> Result<()> {
        if record < lower || record > upper {
            return Err(KernelError::AddressOutOfBounds {
                handle,
                address: record as u64,
                lower: lower as u64,
                upper: upper as u64,
            });
        }
        Ok(())
    }

    // ── File records ─────────────────────────────────────────────────────────

    /// Read record 1 of an array-table file and refresh the cached pointers.
    pub fn read_file_record(&mut self, handle: Handle) -> Result<FileRecord> {
        self.expect_architecture(handle, Architecture::Daf)?;
        let (fr, _) = self.with_channel(handle, |ch, entry| {
            let bytes = directory::read_record(ch, 1)?;
            FileRecord::decode(&bytes, entry.encoding)
        })?;
        let entry = self.files.entry_mut(handle)?;
        entry.shape = Some(fr.shape()?);
        entry.pointers = Some(DirectoryPointers { fward: fr.fward, bward: fr.bward, free: fr.free });
        Ok(fr)
    }

    /// Write record 1 in the file's encoding and adopt its pointers.
    pub fn write_file_record(&mut self, handle: Handle, record: &FileRecord) -> Result<()> {
        self.expect_architecture(handle, Architecture::Daf)?;
        self.expect_writable(handle)?;
        let shape = record.validate()?;
        self.with_channel(handle, |ch, entry| directory::write_file_record(ch, record, entry.encoding))?;
        let entry = self.files.entry_mut(handle)?;
        entry.shape = Some(shape);
        entry.pointers = Some(DirectoryPointers { fward: record.fward, bward: record.bward, free: record.free });
        Ok(())
    }

    pub fn read_segmented_file_record(&mut self, handle: Handle) -> Result<SegmentedFileRecord> {
        self.expect_architecture(handle, Architecture::Das)?;
        Ok(self
            .with_channel(handle, |ch, entry| {
                let bytes = directory::read_record(ch, 1)?;
                SegmentedFileRecord::decode(&bytes, entry.encoding)
            })?
            .0)
    }

    pub fn write_segmented_file_record(&mut self, handle: Handle, record: &SegmentedFileRecord) -> Result<()> {
        self.expect_architecture(handle, Architecture::Das)?;
        self.expect_writable(handle)?;
        self.with_channel(handle, |ch, entry| directory::write_segmented_file_record(ch, record, entry.encoding))?;
        Ok(())
    }

    // ── Summary and name records ─────────────────────────────────────────────

    /// Read the summary record at `record`, which must lie between FWARD
    /// and the record holding the last used word.
    pub fn read_summary(&mut self, handle: Handle, record: u32) -> Result<SummaryRecord> {
        let (shape, ptr, _) = self.directory(handle)?;
        let last = word_record(ptr.free.saturating_sub(1).max(1) as u64);
        Self::check_record(handle, record, ptr.fward as u32, last)?;
        Ok(self
            .with_channel(handle, |ch, entry| directory::read_summary(ch, record, shape, entry.encoding))?
            .0)
    }

    pub fn write_summary(&mut self, handle: Handle, record: u32, summary: &SummaryRecord) -> Result<()> {
        let (shape, _, _) = self.directory(handle)?;
        self.expect_writable(handle)?;
        Self::check_record(handle, record, 2, u32::MAX)?;
        self.with_channel(handle, |ch, entry| directory::write_summary(ch, record, summary, shape, entry.encoding))?;
        Ok(())
    }

    pub fn read_names(&mut self, handle: Handle, record: u32, count: usize) -> Result<NameRecord> {
        let (shape, ptr, _) = self.directory(handle)?;
        let last = word_record(ptr.free.saturating_sub(1).max(1) as u64);
        Self::check_record(handle, record, ptr.fward as u32, last)?;
        Ok(self.with_channel(handle, |ch, _| directory::read_names(ch, record, count, shape))?.0)
    }

    pub fn write_names(&mut self, handle: Handle, record: u32, names: &NameRecord) -> Result<()> {
        let (shape, _, _) = self.directory(handle)?;
        self.expect_writable(handle)?;
        Self::check_record(handle, record, 2, u32::MAX)?;
        self.with_channel(handle, |ch, _| directory::write_names(ch, record, names, shape))?;
        Ok(())
    }

    // ── Data words ───────────────────────────────────────────────────────────

    /// Raw bytes of `len` words from `address`; the range must end before FREE.
    pub fn read_raw_data(&mut self, handle: Handle, address: u64, len: usize) -> Result<Vec<u8>> {
        let (_, ptr, _) = self.directory(handle)?;
        let upper = (ptr.free.max(1) as u64) - 1;
        let last = address.checked_add((len as u64).saturating_sub(1));
        if address < 1 || last.map_or(true, |last| last > upper) {
            return Err(KernelError::AddressOutOfBounds { handle, address, lower: 1, upper });
        }
        if len == 0 {
            return Ok(Vec::new());
        }
        Ok(self.with_channel(handle, |ch, _| directory::read_data(ch, address, len))?.0)
    }

    /// Decoded doubles of `len` words from `address`.
    pub fn read_data(&mut self, handle: Handle, address: u64, len: usize) -> Result<Vec<f64>> {
        let encoding = self.files.entry(handle)?.encoding;
        let raw = self.read_raw_data(handle, address, len)?;
        Ok(decode_words(&raw, encoding)?)
    }

    /// Write `values` from `address`, which may not precede FREE.
    pub fn write_data(&mut self, handle: Handle, address: u64, values: &[f64]) -> Result<()> {
        let (_, ptr, _) = self.directory(handle)?;
        self.expect_writable(handle)?;
        let lower = ptr.free.max(1) as u64;
        let last = address.checked_add((values.len() as u64).saturating_sub(1));
        if address < lower || last.map_or(true, |last| last > MAX_WORD_ADDRESS) {
            return Err(KernelError::AddressOutOfBounds { handle, address, lower, upper: MAX_WORD_ADDRESS });
        }
        self.with_channel(handle, |ch, entry| directory::write_data(ch, address, values, entry.encoding))?;
        Ok(())
    }

    // ── Raw records ──────────────────────────────────────────────────────────

    /// Read physical record `record` verbatim.
    pub fn read_raw_record(&mut self, handle: Handle, record: u32) -> Result<[u8; RECORD_BYTES]> {
        self.files.entry(handle)?;
        Self::check_record(handle, record, 1, u32::MAX)?;
        Ok(self.with_channel(handle, |ch, _| directory::read_record(ch, record))?.0)
    }

    /// Write physical record `record` verbatim.  Record 1 is only written
    /// through the file-record operations.
    pub fn write_raw_record(&mut self, handle: Handle, record: u32, bytes: &[u8]) -> Result<()> {
        self.expect_writable(handle)?;
        Self::check_record(handle, record, 2, u32::MAX)?;
        self.with_channel(handle, |ch, _| directory::write_record(ch, record, bytes))?;
        Ok(())
    }
}

// ── Process-wide instance ────────────────────────────────────────────────────

static GLOBAL: OnceLock<Mutex<FileManager>> = OnceLock::new();

/// Install the process-wide manager with `config`.  Returns `false` when
/// the instance already exists.
pub fn init_global(config: PoolConfig) -> Result<bool> {
    let manager = FileManager::new(config)?;
    Ok(GLOBAL.set(Mutex::new(manager)).is_ok())
}

/// The process-wide manager, created on first use from `ARRAYFILE_CONFIG`
/// or the defaults.
pub fn global() -> &'static Mutex<FileManager> {
    GLOBAL.get_or_init(|| {
        let manager = PoolConfig::from_env().and_then(FileManager::new).unwrap_or_else(|e| {
            warn!(error = %e, "falling back to default pool configuration");
            FileManager::default()
        });
        Mutex::new(manager)
    })
}
