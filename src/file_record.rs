//! First records of array-table and segmented-table files.
//!
//! # Array-table layout (1024 bytes)
//!
//! | bytes     | field                                         |
//! |-----------|-----------------------------------------------|
//! | 0..8      | identification word, e.g. `DAF/SPK `          |
//! | 8..12     | ND, doubles per descriptor                    |
//! | 12..16    | NI, integers per descriptor                   |
//! | 16..76    | internal name, blank padded                   |
//! | 76..80    | FWARD, first summary record                   |
//! | 80..84    | BWARD, last summary record                    |
//! | 84..88    | FREE, first free word address                 |
//! | 88..96    | encoding label                                |
//! | 96..104   | probe word (1.0 in the file's encoding)       |
//! | 699..727  | FTP validation string                         |
//!
//! Integers use the integer byte order of the file's encoding.  Everything
//! not listed is zero.  The label, probe word and FTP string are the
//! provenance block; files from older writers may lack any of them.

use crate::codec::get_codec;
use crate::detect::{self, FtpState};
use crate::error::{KernelError, Result};
use crate::registry::BinaryEncoding;
use crate::summary::ArrayShape;

/// Bytes per physical record.
pub const RECORD_BYTES: usize = 1024;
/// Eight-byte words per physical record.
pub const RECORD_WORDS: usize = RECORD_BYTES / 8;

/// Sentinel that exposes end-of-line translation during file transfer.
pub const FTP_STRING: &[u8; 28] = b"FTPSTR:\r:\n:\r\n:\r\x00:\x81:\x10\xce:ENDFTP";

pub mod layout {
    use std::ops::Range;

    pub const ID_WORD: Range<usize> = 0..8;
    pub const DAF_ND: Range<usize> = 8..12;
    pub const DAF_NI: Range<usize> = 12..16;
    pub const DAF_NAME: Range<usize> = 16..76;
    pub const DAF_FWARD: Range<usize> = 76..80;
    pub const DAF_BWARD: Range<usize> = 80..84;
    pub const DAF_FREE: Range<usize> = 84..88;
    pub const DAF_FORMAT: Range<usize> = 88..96;
    pub const DAF_PROBE: Range<usize> = 96..104;

    pub const DAS_NAME: Range<usize> = 8..68;
    pub const DAS_COUNTS: Range<usize> = 68..84;
    pub const DAS_FORMAT: Range<usize> = 84..92;
    pub const DAS_PROBE: Range<usize> = 92..100;

    pub const FTP: Range<usize> = 699..727;
}

/// Default identification word for new array-table files.
pub const DEFAULT_DAF_ID: &str = "DAF/SPK";
/// Default identification word for new segmented-table files.
pub const DEFAULT_DAS_ID: &str = "DAS/EK";

pub(crate) fn read_int(encoding: BinaryEncoding, bytes: &[u8]) -> i32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&bytes[..4]);
    get_codec(encoding).decode_i32(b)
}

pub(crate) fn write_int(encoding: BinaryEncoding, bytes: &mut [u8], value: i32) {
    bytes[..4].copy_from_slice(&get_codec(encoding).encode_i32(value));
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end_matches(['\0', ' ']).to_string()
}

fn put_text(dst: &mut [u8], value: &str) {
    dst.fill(b' ');
    let src = value.as_bytes();
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
}

fn put_provenance(record: &mut [u8], format: std::ops::Range<usize>, probe: std::ops::Range<usize>, encoding: BinaryEncoding) {
    put_text(&mut record[format], encoding.label());
    record[probe].copy_from_slice(&detect::probe_word(encoding));
    record[layout::FTP].copy_from_slice(FTP_STRING);
}

// ── Array-table file record ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub id_word: String,
    pub nd: i32,
    pub ni: i32,
    pub internal_name: String,
    pub fward: i32,
    pub bward: i32,
    pub free: i32,
    /// Encoding the record was decoded from, or will be written in.
    pub encoding: BinaryEncoding,
    /// Whether the label slot named the encoding.
    pub labelled: bool,
    pub ftp: FtpState,
}

impl FileRecord {
    /// File record of an empty file: one summary record at 2, its name
    /// record at 3, first free word at the start of record 4.
    pub fn new(id_word: &str, shape: ArrayShape, internal_name: &str, encoding: BinaryEncoding) -> Self {
        Self {
            id_word: id_word.to_string(),
            nd: shape.nd as i32,
            ni: shape.ni as i32,
            internal_name: internal_name.to_string(),
            fward: 2,
            bward: 2,
            free: (3 * RECORD_WORDS + 1) as i32,
            encoding,
            labelled: true,
            ftp: FtpState::Intact,
        }
    }

    /// Descriptor shape, validated.
    pub fn shape(&self) -> Result<ArrayShape> {
        let nd = usize::try_from(self.nd).ok();
        let ni = usize::try_from(self.ni).ok();
        match (nd, ni) {
            (Some(nd), Some(ni)) => ArrayShape::new(nd, ni),
            _ => Err(KernelError::MalformedFileRecord { detail: format!("ND = {}, NI = {}", self.nd, self.ni) }),
        }
    }

    /// Decode a first record already classified as `encoding`.
    pub fn decode(record: &[u8], encoding: BinaryEncoding) -> Result<Self> {
        if record.len() < RECORD_BYTES {
            return Err(KernelError::MalformedFileRecord { detail: format!("record is {} bytes", record.len()) });
        }
        let int = |r: std::ops::Range<usize>| read_int(encoding, &record[r]);
        let fr = Self {
            id_word: text(&record[layout::ID_WORD]),
            nd: int(layout::DAF_ND),
            ni: int(layout::DAF_NI),
            internal_name: text(&record[layout::DAF_NAME]),
            fward: int(layout::DAF_FWARD),
            bward: int(layout::DAF_BWARD),
            free: int(layout::DAF_FREE),
            encoding,
            labelled: BinaryEncoding::from_label(&text(&record[layout::DAF_FORMAT])).is_some(),
            ftp: detect::ftp_state(record),
        };
        fr.validate()?;
        Ok(fr)
    }

    /// Check the shape and the directory pointers.  FWARD and BWARD name
    /// records from 2 on, and FREE is a word address.
    pub fn validate(&self) -> Result<ArrayShape> {
        let shape = self.shape()?;
        if self.fward < 2 || self.bward < self.fward || self.free < 1 {
            return Err(KernelError::MalformedFileRecord {
                detail: format!("pointers FWARD = {}, BWARD = {}, FREE = {}", self.fward, self.bward, self.free),
            });
        }
        Ok(shape)
    }

    /// Encode for writing in `encoding`, always with a full provenance block.
    pub fn encode(&self, encoding: BinaryEncoding) -> [u8; RECORD_BYTES] {
        let mut rec = [0u8; RECORD_BYTES];
        put_text(&mut rec[layout::ID_WORD], &self.id_word);
        write_int(encoding, &mut rec[layout::DAF_ND], self.nd);
        write_int(encoding, &mut rec[layout::DAF_NI], self.ni);
        put_text(&mut rec[layout::DAF_NAME], &self.internal_name);
        write_int(encoding, &mut rec[layout::DAF_FWARD], self.fward);
        write_int(encoding, &mut rec[layout::DAF_BWARD], self.bward);
        write_int(encoding, &mut rec[layout::DAF_FREE], self.free);
        put_provenance(&mut rec, layout::DAF_FORMAT, layout::DAF_PROBE, encoding);
        rec
    }

    /// Record number holding the word just before FREE.
    pub fn last_record(&self) -> u32 {
        word_record(self.free.saturating_sub(1).max(1) as u64)
    }
}

/// Record number containing 1-based word `address`.
pub fn word_record(address: u64) -> u32 {
    ((address.saturating_sub(1)) / RECORD_WORDS as u64 + 1) as u32
}

// ── Segmented-table file record ──────────────────────────────────────────────

/// First record of a segmented-table file.  Only the fields this layer
/// touches are decoded; the segmented directory itself is opaque here.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedFileRecord {
    pub id_word: String,
    pub internal_name: String,
    pub reserved_records: i32,
    pub reserved_chars: i32,
    pub comment_records: i32,
    pub comment_chars: i32,
    pub encoding: BinaryEncoding,
}

impl SegmentedFileRecord {
    pub fn new(id_word: &str, internal_name: &str, encoding: BinaryEncoding) -> Self {
        Self {
            id_word: id_word.to_string(),
            internal_name: internal_name.to_string(),
            reserved_records: 0,
            reserved_chars: 0,
            comment_records: 0,
            comment_chars: 0,
            encoding,
        }
    }

    pub fn decode(record: &[u8], encoding: BinaryEncoding) -> Result<Self> {
        if record.len() < RECORD_BYTES {
            return Err(KernelError::MalformedFileRecord { detail: format!("record is {} bytes", record.len()) });
        }
        let counts = &record[layout::DAS_COUNTS];
        let int = |i: usize| read_int(encoding, &counts[4 * i..4 * i + 4]);
        Ok(Self {
            id_word: text(&record[layout::ID_WORD]),
            internal_name: text(&record[layout::DAS_NAME]),
            reserved_records: int(0),
            reserved_chars: int(1),
            comment_records: int(2),
            comment_chars: int(3),
            encoding,
        })
    }

    pub fn encode(&self, encoding: BinaryEncoding) -> [u8; RECORD_BYTES] {
        let mut rec = [0u8; RECORD_BYTES];
        put_text(&mut rec[layout::ID_WORD], &self.id_word);
        put_text(&mut rec[layout::DAS_NAME], &self.internal_name);
        let counts = [self.reserved_records, self.reserved_chars, self.comment_records, self.comment_chars];
        for (i, c) in counts.iter().enumerate() {
            let at = layout::DAS_COUNTS.start + 4 * i;
            write_int(encoding, &mut rec[at..at + 4], *c);
        }
        put_provenance(&mut rec, layout::DAS_FORMAT, layout::DAS_PROBE, encoding);
        rec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Architecture;

    #[test]
    fn encode_then_classify() {
        let fr = FileRecord::new("DAF/SPK", ArrayShape::new(2, 6).unwrap(), "TEST FILE", BinaryEncoding::BigIeee);
        let bytes = fr.encode(BinaryEncoding::BigIeee);
        assert_eq!(&bytes[..8], b"DAF/SPK ");
        assert_eq!(&bytes[8..12], &[0, 0, 0, 2]);
        assert_eq!(&bytes[layout::DAF_FORMAT], b"BIG-IEEE");
        assert_eq!(detect::sniff(&bytes, Architecture::Daf), Some((Architecture::Daf, BinaryEncoding::BigIeee)));
        let back = FileRecord::decode(&bytes, BinaryEncoding::BigIeee).unwrap();
        assert_eq!(back, fr);
        assert_eq!(back.free, 385);
        assert_eq!(back.last_record(), 3);
    }

    #[test]
    fn rejects_bad_shapes_and_pointers() {
        let mut fr = FileRecord::new("DAF/CK", ArrayShape::new(2, 6).unwrap(), "", BinaryEncoding::LtlIeee);
        fr.ni = 1;
        let bytes = fr.encode(BinaryEncoding::LtlIeee);
        assert!(matches!(FileRecord::decode(&bytes, BinaryEncoding::LtlIeee), Err(KernelError::MalformedFileRecord { .. })));
        fr.ni = 6;
        fr.fward = 0;
        let bytes = fr.encode(BinaryEncoding::LtlIeee);
        assert!(FileRecord::decode(&bytes, BinaryEncoding::LtlIeee).is_err());
        fr.fward = 2;
        fr.free = i32::MIN;
        assert!(matches!(fr.validate(), Err(KernelError::MalformedFileRecord { .. })));
        fr.free = 385;
        assert_eq!(fr.validate().unwrap(), ArrayShape::new(2, 6).unwrap());
    }

    #[test]
    fn word_record_boundaries() {
        assert_eq!(word_record(1), 1);
        assert_eq!(word_record(128), 1);
        assert_eq!(word_record(129), 2);
        assert_eq!(word_record(385), 4);
    }

    #[test]
    fn segmented_record_carries_provenance() {
        let mut sr = SegmentedFileRecord::new("DAS/EK", "SCRATCH", BinaryEncoding::VaxGfloat);
        sr.comment_records = 3;
        let bytes = sr.encode(BinaryEncoding::VaxGfloat);
        assert_eq!(detect::classify_record(&bytes, Architecture::Das), Some(BinaryEncoding::VaxGfloat));
        assert_eq!(SegmentedFileRecord::decode(&bytes, BinaryEncoding::VaxGfloat).unwrap(), sr);
    }
}
