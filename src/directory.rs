//! Unit-level record I/O.
//!
//! Records are addressed by 1-based record number; data by 1-based word
//! address (word `A` lives at byte `(A - 1) * 8`).  Every write takes an
//! explicit target encoding and encodes at the point of writing.  Reads
//! past end of file return zero-filled records, except for the first
//! record, which must be present in full.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::codec::{encode_words, WORD_BYTES};
use crate::detect::{self, FtpState};
use crate::error::{KernelError, Result};
use crate::file_record::{FileRecord, SegmentedFileRecord, RECORD_BYTES};
use crate::registry::{Architecture, BinaryEncoding};
use crate::summary::{ArrayShape, NameRecord, SummaryRecord};

/// An open OS file and the path it was opened from.
#[derive(Debug)]
pub struct Channel<F = File> {
    file: F,
    path: PathBuf,
}

impl<F: Read + Write + Seek> Channel<F> {
    pub fn new(file: F, path: impl Into<PathBuf>) -> Self {
        Self { file, path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn seek_to(&mut self, offset: u64, op: &'static str) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map(|_| ())
            .map_err(|e| KernelError::io(op, &self.path, e))
    }

    /// Fill `buf` from `offset`, zero-filling anything past end of file.
    /// Returns the number of bytes actually read.
    fn read_at(&mut self, offset: u64, buf: &mut [u8], op: &'static str) -> Result<usize> {
        self.seek_to(offset, op)?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(KernelError::io(op, &self.path, e)),
            }
        }
        buf[filled..].fill(0);
        Ok(filled)
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8], op: &'static str) -> Result<()> {
        self.seek_to(offset, op)?;
        self.file.write_all(bytes).map_err(|e| KernelError::io(op, &self.path, e))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush().map_err(|e| KernelError::io("flush", &self.path, e))
    }
}

fn record_offset(record: u32) -> u64 {
    (record.max(1) as u64 - 1) * RECORD_BYTES as u64
}

fn word_offset(address: u64) -> u64 {
    (address.max(1) - 1).saturating_mul(WORD_BYTES as u64)
}

// ── Raw records ──────────────────────────────────────────────────────────────

pub fn read_record<F: Read + Write + Seek>(unit: &mut Channel<F>, record: u32) -> Result<[u8; RECORD_BYTES]> {
    let mut buf = [0u8; RECORD_BYTES];
    unit.read_at(record_offset(record), &mut buf, "read record")?;
    Ok(buf)
}

pub fn write_record<F: Read + Write + Seek>(unit: &mut Channel<F>, record: u32, bytes: &[u8]) -> Result<()> {
    let mut buf = [0u8; RECORD_BYTES];
    let n = bytes.len().min(RECORD_BYTES);
    buf[..n].copy_from_slice(&bytes[..n]);
    unit.write_at(record_offset(record), &buf, "write record")
}

// ── First record ─────────────────────────────────────────────────────────────

/// What the first record says about a file before it is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirstRecord {
    pub architecture: Architecture,
    pub encoding: BinaryEncoding,
    pub ftp: FtpState,
}

/// Read record 1 and check it describes an `expected` file in a known
/// encoding with an undamaged FTP string.
pub fn inspect_first_record<F: Read + Write + Seek>(
    unit: &mut Channel<F>,
    expected: Architecture,
) -> Result<([u8; RECORD_BYTES], FirstRecord)> {
    let mut rec = [0u8; RECORD_BYTES];
    let got = unit.read_at(0, &mut rec, "read file record")?;
    if got < RECORD_BYTES {
        return Err(KernelError::MalformedFileRecord {
            detail: format!("{} holds {got} bytes, less than one record", unit.path().display()),
        });
    }
    if let Some(found) = detect::sniff_architecture(&rec) {
        if found != expected {
            return Err(KernelError::ArchitectureMismatch {
                path: unit.path().to_path_buf(),
                expected,
                found: found.label().to_string(),
            });
        }
    } else {
        let id = String::from_utf8_lossy(&rec[..8]).trim_end().to_string();
        return Err(KernelError::ArchitectureMismatch { path: unit.path().to_path_buf(), expected, found: id });
    }
    let ftp = detect::ftp_state(&rec);
    if ftp == FtpState::Damaged {
        return Err(KernelError::FtpCorrupted { path: unit.path().to_path_buf() });
    }
    let (architecture, encoding) = detect::sniff(&rec, expected)
        .ok_or_else(|| KernelError::UnknownEncoding { path: unit.path().to_path_buf() })?;
    Ok((rec, FirstRecord { architecture, encoding, ftp }))
}

pub fn read_file_record<F: Read + Write + Seek>(unit: &mut Channel<F>) -> Result<FileRecord> {
    let (rec, first) = inspect_first_record(unit, Architecture::Daf)?;
    FileRecord::decode(&rec, first.encoding)
}

pub fn write_file_record<F: Read + Write + Seek>(
    unit: &mut Channel<F>,
    record: &FileRecord,
    encoding: BinaryEncoding,
) -> Result<()> {
    unit.write_at(0, &record.encode(encoding), "write file record")
}

pub fn read_segmented_file_record<F: Read + Write + Seek>(unit: &mut Channel<F>) -> Result<SegmentedFileRecord> {
    let (rec, first) = inspect_first_record(unit, Architecture::Das)?;
    SegmentedFileRecord::decode(&rec, first.encoding)
}

pub fn write_segmented_file_record<F: Read + Write + Seek>(
    unit: &mut Channel<F>,
    record: &SegmentedFileRecord,
    encoding: BinaryEncoding,
) -> Result<()> {
    unit.write_at(0, &record.encode(encoding), "write file record")
}

// ── Summary and name records ─────────────────────────────────────────────────

pub fn read_summary<F: Read + Write + Seek>(
    unit: &mut Channel<F>,
    record: u32,
    shape: ArrayShape,
    encoding: BinaryEncoding,
) -> Result<SummaryRecord> {
    let bytes = read_record(unit, record)?;
    SummaryRecord::decode(&bytes, record, shape, encoding)
}

pub fn write_summary<F: Read + Write + Seek>(
    unit: &mut Channel<F>,
    record: u32,
    summary: &SummaryRecord,
    shape: ArrayShape,
    encoding: BinaryEncoding,
) -> Result<()> {
    let bytes = summary.encode(shape, encoding).map_err(|e| match e {
        KernelError::MalformedSummary { detail, .. } => KernelError::MalformedSummary { record, detail },
        other => other,
    })?;
    write_record(unit, record, &bytes)
}

pub fn read_names<F: Read + Write + Seek>(
    unit: &mut Channel<F>,
    record: u32,
    count: usize,
    shape: ArrayShape,
) -> Result<NameRecord> {
    let bytes = read_record(unit, record)?;
    Ok(NameRecord::decode(&bytes, count, shape))
}

pub fn write_names<F: Read + Write + Seek>(
    unit: &mut Channel<F>,
    record: u32,
    names: &NameRecord,
    shape: ArrayShape,
) -> Result<()> {
    write_record(unit, record, &names.encode(shape))
}

// ── Data words ───────────────────────────────────────────────────────────────

/// Raw bytes of `len` words starting at word `address`.
pub fn read_data<F: Read + Write + Seek>(unit: &mut Channel<F>, address: u64, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len * WORD_BYTES];
    unit.read_at(word_offset(address), &mut buf, "read data")?;
    Ok(buf)
}

/// Encode `values` in `encoding` and write them from word `address` on.
pub fn write_data<F: Read + Write + Seek>(
    unit: &mut Channel<F>,
    address: u64,
    values: &[f64],
    encoding: BinaryEncoding,
) -> Result<()> {
    let bytes = encode_words(values, encoding)?;
    unit.write_at(word_offset(address), &bytes, "write data")
}
