//! Summary and name records.
//!
//! A summary record starts with three control words (NEXT, PREV, NSUM),
//! stored as doubles, followed by NSUM descriptors of `SS` words each:
//! ND doubles, then NI integers packed two per word.  The last two
//! integers are the begin and end word addresses of the array.  The name
//! record that follows holds NSUM names of `8 * SS` characters.

use crate::codec::{get_codec, WORD_BYTES};
use crate::error::{KernelError, Result};
use crate::file_record::{read_int, write_int, RECORD_BYTES, RECORD_WORDS};
use crate::registry::BinaryEncoding;

/// Largest ND a descriptor may carry.
pub const MAX_ND: usize = 124;
/// Smallest NI; the begin and end addresses are always present.
pub const MIN_NI: usize = 2;
pub const MAX_NI: usize = 250;
/// Words available to descriptors in one summary record.
pub const SUMMARY_AREA_WORDS: usize = RECORD_WORDS - 3;

/// Shape of the descriptors in one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayShape {
    pub nd: usize,
    pub ni: usize,
}

impl ArrayShape {
    pub fn new(nd: usize, ni: usize) -> Result<Self> {
        let shape = Self { nd, ni };
        if nd > MAX_ND || !(MIN_NI..=MAX_NI).contains(&ni) || shape.summary_words() > SUMMARY_AREA_WORDS {
            return Err(KernelError::MalformedFileRecord {
                detail: format!("descriptor shape ND = {nd}, NI = {ni} is out of range"),
            });
        }
        Ok(shape)
    }

    /// Words per descriptor (SS).
    pub fn summary_words(&self) -> usize {
        self.nd + (self.ni + 1) / 2
    }

    /// Characters per name (NC).
    pub fn name_bytes(&self) -> usize {
        self.summary_words() * WORD_BYTES
    }

    pub fn max_summaries(&self) -> usize {
        SUMMARY_AREA_WORDS / self.summary_words()
    }
}

/// One array descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayDescriptor {
    /// ND double components.
    pub values: Vec<f64>,
    /// The NI - 2 leading integer components.
    pub ints: Vec<i32>,
    /// First word address of the array data.
    pub begin: i32,
    /// Last word address of the array data.
    pub end: i32,
}

impl ArrayDescriptor {
    pub fn len(&self) -> usize {
        (self.end as i64 - self.begin as i64 + 1).max(0) as usize
    }

    /// Data must start at word 1 or later and may not end before it starts,
    /// except that `end = begin - 1` marks an empty array.
    fn check(&self, record: u32) -> Result<()> {
        if self.begin < 1 || (self.end as i64) < self.begin as i64 - 1 {
            return Err(KernelError::MalformedSummary {
                record,
                detail: format!("descriptor covers words {}..={}", self.begin, self.end),
            });
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SummaryRecord {
    /// Next summary record, 0 at the end of the chain.
    pub next: i32,
    /// Previous summary record, 0 at the start of the chain.
    pub prev: i32,
    pub descriptors: Vec<ArrayDescriptor>,
}

fn control_word(value: f64, record: u32, what: &str) -> Result<i32> {
    if value.fract() != 0.0 || value < 0.0 || value > i32::MAX as f64 {
        return Err(KernelError::MalformedSummary { record, detail: format!("{what} = {value}") });
    }
    Ok(value as i32)
}

impl SummaryRecord {
    pub fn decode(bytes: &[u8], record: u32, shape: ArrayShape, encoding: BinaryEncoding) -> Result<Self> {
        if bytes.len() < RECORD_BYTES {
            return Err(KernelError::MalformedSummary { record, detail: format!("record is {} bytes", bytes.len()) });
        }
        let codec = get_codec(encoding);
        let word = |i: usize| -> Result<f64> {
            let mut w = [0u8; 8];
            w.copy_from_slice(&bytes[i * WORD_BYTES..(i + 1) * WORD_BYTES]);
            Ok(codec.decode_f64(w)?)
        };
        let next = control_word(word(0)?, record, "NEXT")?;
        let prev = control_word(word(1)?, record, "PREV")?;
        let nsum = control_word(word(2)?, record, "NSUM")? as usize;
        if nsum > shape.max_summaries() {
            return Err(KernelError::MalformedSummary {
                record,
                detail: format!("NSUM = {nsum} exceeds {} descriptors per record", shape.max_summaries()),
            });
        }

        let ss = shape.summary_words();
        let mut descriptors = Vec::with_capacity(nsum);
        for k in 0..nsum {
            let start = 3 + k * ss;
            let values = (0..shape.nd).map(|i| word(start + i)).collect::<Result<Vec<_>>>()?;
            let int_base = (start + shape.nd) * WORD_BYTES;
            let mut ints: Vec<i32> = (0..shape.ni)
                .map(|i| read_int(encoding, &bytes[int_base + 4 * i..int_base + 4 * i + 4]))
                .collect();
            let end = ints.pop().unwrap_or_default();
            let begin = ints.pop().unwrap_or_default();
            let descriptor = ArrayDescriptor { values, ints, begin, end };
            descriptor.check(record)?;
            descriptors.push(descriptor);
        }
        Ok(Self { next, prev, descriptors })
    }

    pub fn encode(&self, shape: ArrayShape, encoding: BinaryEncoding) -> Result<[u8; RECORD_BYTES]> {
        if self.descriptors.len() > shape.max_summaries() {
            return Err(KernelError::MalformedSummary {
                record: 0,
                detail: format!("{} descriptors exceed {} per record", self.descriptors.len(), shape.max_summaries()),
            });
        }
        for d in &self.descriptors {
            d.check(0)?;
        }
        let codec = get_codec(encoding);
        let mut rec = [0u8; RECORD_BYTES];
        let mut put = |i: usize, v: f64| -> Result<()> {
            rec[i * WORD_BYTES..(i + 1) * WORD_BYTES].copy_from_slice(&codec.encode_f64(v)?);
            Ok(())
        };
        put(0, self.next as f64)?;
        put(1, self.prev as f64)?;
        put(2, self.descriptors.len() as f64)?;

        let ss = shape.summary_words();
        for (k, d) in self.descriptors.iter().enumerate() {
            let start = 3 + k * ss;
            for i in 0..shape.nd {
                put(start + i, d.values.get(i).copied().unwrap_or(0.0))?;
            }
        }
        for (k, d) in self.descriptors.iter().enumerate() {
            let int_base = (3 + k * ss + shape.nd) * WORD_BYTES;
            let ints = (0..shape.ni - 2).map(|i| d.ints.get(i).copied().unwrap_or(0)).chain([d.begin, d.end]);
            for (i, v) in ints.enumerate() {
                write_int(encoding, &mut rec[int_base + 4 * i..int_base + 4 * i + 4], v);
            }
        }
        Ok(rec)
    }
}

/// Names of the arrays described by the preceding summary record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NameRecord {
    pub names: Vec<String>,
}

impl NameRecord {
    pub fn decode(bytes: &[u8], count: usize, shape: ArrayShape) -> Self {
        let nc = shape.name_bytes();
        let names = bytes
            .chunks_exact(nc)
            .take(count)
            .map(|c| String::from_utf8_lossy(c).trim_end_matches(['\0', ' ']).to_string())
            .collect();
        Self { names }
    }

    pub fn encode(&self, shape: ArrayShape) -> [u8; RECORD_BYTES] {
        let nc = shape.name_bytes();
        let mut rec = [b' '; RECORD_BYTES];
        for (slot, name) in rec.chunks_exact_mut(nc).zip(&self.names) {
            let n = name.len().min(nc);
            slot[..n].copy_from_slice(&name.as_bytes()[..n]);
        }
        rec
    }
}
