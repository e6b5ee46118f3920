//! Access layer for kernel array files.
//!
//! Opens, tracks and closes array-table (DAF) and segmented-table (DAS)
//! files, multiplexes a small pool of OS channels across many open
//! handles, detects which of four binary encodings a file uses and
//! transcodes files between encodings.

pub mod array_file;
pub mod codec;
pub mod config;
pub mod detect;
pub mod directory;
pub mod error;
pub mod file_record;
pub mod files;
pub mod manager;
pub mod registry;
pub mod summary;
pub mod transcode;
pub mod units;

pub use array_file::{ArrayEntry, ArrayFileSpec};
pub use config::PoolConfig;
pub use detect::identify;
pub use error::{ErrorKind, KernelError, Result};
pub use files::{FileEntry, Handle};
pub use manager::{global, init_global, FileManager};
pub use registry::{AccessMethod, Architecture, BinaryEncoding};
pub use transcode::{transcode_path, TranscodeReport};
