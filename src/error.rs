//! Error taxonomy for the access layer.
//!
//! Every fallible operation returns [`KernelError`].  Variants carry the
//! call context (operation, handle, path) as fields so a caller can report
//! exactly which step failed without a separate trace.  Lookups (registry,
//! `find_by_name`, `identify`) never fail; they return `Option`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::codec::CodecError;
use crate::files::Handle;
use crate::registry::{AccessMethod, Architecture};

/// Coarse classification of a [`KernelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// File table or unit pool exhausted.  Recoverable by closing files.
    Capacity,
    /// Unrecognised architecture or encoding, malformed records.
    Format,
    /// Host file-system failure.
    Io,
    /// Address outside a file's directory bounds, stale handles.
    Consistency,
    /// Caller misuse: blank names, open conflicts, writes to read-only files.
    Usage,
}

#[derive(Error, Debug)]
pub enum KernelError {
    // ── Capacity ─────────────────────────────────────────────────────────────
    #[error("file table is full ({capacity} files open)")]
    FileTableFull { capacity: usize },

    #[error("no unit available for handle {handle}: all {capacity} units are locked or in use")]
    UnitPoolExhausted { handle: Handle, capacity: usize },

    #[error("cannot lock unit for handle {handle}: {locked} of {lockable} lockable units already locked")]
    LockFailed { handle: Handle, locked: usize, lockable: usize },

    // ── Format ───────────────────────────────────────────────────────────────
    #[error("unrecognised file architecture '{0}'")]
    UnknownArchitecture(String),

    #[error("binary encoding of {path} is not recognised")]
    UnknownEncoding { path: PathBuf },

    #[error("{path} is a {found} file, expected {expected}")]
    ArchitectureMismatch { path: PathBuf, expected: Architecture, found: String },

    #[error("FTP validation string in {path} is damaged; the file was probably transferred in text mode")]
    FtpCorrupted { path: PathBuf },

    #[error("malformed file record: {detail}")]
    MalformedFileRecord { detail: String },

    #[error("malformed summary record {record}: {detail}")]
    MalformedSummary { record: u32, detail: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    // ── I/O ──────────────────────────────────────────────────────────────────
    #[error("{op} failed on {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // ── Consistency ──────────────────────────────────────────────────────────
    #[error("address {address} is outside [{lower}, {upper}] for handle {handle}")]
    AddressOutOfBounds { handle: Handle, address: u64, lower: u64, upper: u64 },

    #[error("handle {0} is not attached to an open file")]
    NoSuchHandle(Handle),

    #[error("handle {handle} belongs to a {found} file, operation expects {expected}")]
    HandleArchitectureMismatch { handle: Handle, expected: Architecture, found: Architecture },

    // ── Usage ────────────────────────────────────────────────────────────────
    #[error("file name is blank")]
    BlankFileName,

    #[error("file {0} does not exist")]
    FileNotFound(PathBuf),

    #[error("file {0} already exists")]
    FileExists(PathBuf),

    #[error("{path} is already open; cannot open it again for {method}")]
    OpenConflict { path: PathBuf, method: AccessMethod },

    #[error("handle {handle} is open for {method} and cannot be written")]
    ReadOnly { handle: Handle, method: AccessMethod },

    #[error("an array must contain at least one value")]
    EmptyArray,

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot parse configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl KernelError {
    pub fn kind(&self) -> ErrorKind {
        use KernelError::*;
        match self {
            FileTableFull { .. } | UnitPoolExhausted { .. } | LockFailed { .. } => ErrorKind::Capacity,
            UnknownArchitecture(_)
            | UnknownEncoding { .. }
            | ArchitectureMismatch { .. }
            | FtpCorrupted { .. }
            | MalformedFileRecord { .. }
            | MalformedSummary { .. }
            | Codec(_) => ErrorKind::Format,
            Io { .. } => ErrorKind::Io,
            AddressOutOfBounds { .. } | NoSuchHandle(_) | HandleArchitectureMismatch { .. } => {
                ErrorKind::Consistency
            }
            BlankFileName
            | FileNotFound(_)
            | FileExists(_)
            | OpenConflict { .. }
            | ReadOnly { .. }
            | EmptyArray
            | InvalidConfig(_)
            | Config(_) => ErrorKind::Usage,
        }
    }

    /// Build an I/O error carrying the failing operation and path.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        KernelError::Io { op, path: path.into(), source }
    }
}

pub type Result<T, E = KernelError> = std::result::Result<T, E>;
