//! Writing and reading whole arrays.
//!
//! A new file is laid out as: file record, comment records, one summary
//! record, its name record, then data.  Arrays are appended at FREE.  When
//! the last summary record is full, a new summary/name pair is started in
//! the records right after the data just written and chained from the
//! previous summary.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{KernelError, Result};
use crate::file_record::{word_record, FileRecord, DEFAULT_DAF_ID, RECORD_BYTES, RECORD_WORDS};
use crate::files::Handle;
use crate::manager::FileManager;
use crate::registry::{Architecture, BinaryEncoding};
use crate::summary::{ArrayDescriptor, ArrayShape, NameRecord, SummaryRecord};

/// Characters of comment text stored per comment record.
pub const COMMENT_CHARS_PER_RECORD: usize = 1000;
/// Marks the end of the comment area.
pub const END_OF_COMMENTS: u8 = 0x04;

/// Parameters of a new array file.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayFileSpec {
    pub id_word: String,
    pub internal_name: String,
    pub nd: usize,
    pub ni: usize,
    pub encoding: BinaryEncoding,
    pub comments: Vec<String>,
}

impl Default for ArrayFileSpec {
    fn default() -> Self {
        Self {
            id_word: DEFAULT_DAF_ID.to_string(),
            internal_name: String::new(),
            nd: 2,
            ni: 6,
            encoding: BinaryEncoding::native(),
            comments: Vec::new(),
        }
    }
}

/// One array as listed from the summary chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayEntry {
    pub name: String,
    pub values: Vec<f64>,
    pub ints: Vec<i32>,
    pub begin: i32,
    pub end: i32,
    /// Summary record holding the descriptor.
    pub record: u32,
}

impl ArrayEntry {
    pub fn descriptor(&self) -> ArrayDescriptor {
        ArrayDescriptor { values: self.values.clone(), ints: self.ints.clone(), begin: self.begin, end: self.end }
    }

    pub fn len(&self) -> usize {
        self.descriptor().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pack comment lines into comment records.
pub fn comment_records(lines: &[String]) -> Vec<[u8; RECORD_BYTES]> {
    if lines.is_empty() {
        return Vec::new();
    }
    let mut stream = Vec::new();
    for line in lines {
        stream.extend_from_slice(line.as_bytes());
        stream.push(0);
    }
    stream.push(END_OF_COMMENTS);
    stream
        .chunks(COMMENT_CHARS_PER_RECORD)
        .map(|chunk| {
            let mut rec = [0u8; RECORD_BYTES];
            rec[..chunk.len()].copy_from_slice(chunk);
            rec
        })
        .collect()
}

/// Unpack comment lines from the comment records of a file.
pub fn parse_comments<'a>(records: impl IntoIterator<Item = &'a [u8; RECORD_BYTES]>) -> Vec<String> {
    let mut stream = Vec::new();
    for rec in records {
        let text = &rec[..COMMENT_CHARS_PER_RECORD];
        match text.iter().position(|b| *b == END_OF_COMMENTS) {
            Some(eot) => {
                stream.extend_from_slice(&text[..eot]);
                break;
            }
            None => stream.extend_from_slice(text),
        }
    }
    let mut lines: Vec<String> = stream.split(|b| *b == 0).map(|l| String::from_utf8_lossy(l).into_owned()).collect();
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

impl FileManager {
    /// Create an array file at `path` and leave it open for writing.
    pub fn create_array_file(&mut self, path: impl AsRef<Path>, spec: &ArrayFileSpec) -> Result<Handle> {
        let shape = ArrayShape::new(spec.nd, spec.ni)?;
        let handle = self.open_new(path, Architecture::Daf, spec.encoding)?;
        match self.lay_out_new_file(handle, shape, spec) {
            Ok(()) => Ok(handle),
            Err(e) => {
                if let Err(cleanup) = self.close_and_delete(handle) {
                    warn!(handle, error = %cleanup, "could not remove partially created file");
                }
                Err(e)
            }
        }
    }

    fn lay_out_new_file(&mut self, handle: Handle, shape: ArrayShape, spec: &ArrayFileSpec) -> Result<()> {
        let comments = comment_records(&spec.comments);
        let first_summary = 2 + comments.len() as u32;
        let mut fr = FileRecord::new(&spec.id_word, shape, &spec.internal_name, spec.encoding);
        fr.fward = first_summary as i32;
        fr.bward = first_summary as i32;
        fr.free = ((first_summary as usize + 1) * RECORD_WORDS + 1) as i32;
        self.write_file_record(handle, &fr)?;
        for (i, rec) in comments.iter().enumerate() {
            self.write_raw_record(handle, 2 + i as u32, rec)?;
        }
        self.write_summary(handle, first_summary, &SummaryRecord::default())?;
        self.write_names(handle, first_summary + 1, &NameRecord::default())?;
        Ok(())
    }

    /// Append an array: `values` are the ND doubles and `ints` the NI - 2
    /// leading integers of its descriptor.
    pub fn add_array(
        &mut self,
        handle: Handle,
        name: &str,
        values: &[f64],
        ints: &[i32],
        data: &[f64],
    ) -> Result<ArrayDescriptor> {
        if data.is_empty() {
            return Err(KernelError::EmptyArray);
        }
        let mut fr = self.read_file_record(handle)?;
        let shape = fr.shape()?;
        if values.len() != shape.nd || ints.len() != shape.ni - 2 {
            return Err(KernelError::MalformedSummary {
                record: fr.bward as u32,
                detail: format!(
                    "descriptor has {} doubles and {} integers, file expects {} and {}",
                    values.len(),
                    ints.len(),
                    shape.nd,
                    shape.ni - 2
                ),
            });
        }

        let begin = fr.free;
        let end = i32::try_from(data.len() - 1)
            .ok()
            .and_then(|n| begin.checked_add(n))
            .ok_or_else(|| KernelError::MalformedFileRecord { detail: "array overflows word addresses".into() })?;
        self.write_data(handle, begin as u64, data)?;
        let descriptor = ArrayDescriptor { values: values.to_vec(), ints: ints.to_vec(), begin, end };

        let last = fr.bward as u32;
        let mut summary = self.read_summary(handle, last)?;
        if summary.descriptors.len() < shape.max_summaries() {
            let mut names = self.read_names(handle, last + 1, summary.descriptors.len())?;
            summary.descriptors.push(descriptor.clone());
            names.names.push(name.to_string());
            self.write_summary(handle, last, &summary)?;
            self.write_names(handle, last + 1, &names)?;
            fr.free = end + 1;
        } else {
            let record = word_record(end as u64) + 1;
            summary.next = record as i32;
            self.write_summary(handle, last, &summary)?;
            let fresh = SummaryRecord { next: 0, prev: last as i32, descriptors: vec![descriptor.clone()] };
            self.write_summary(handle, record, &fresh)?;
            self.write_names(handle, record + 1, &NameRecord { names: vec![name.to_string()] })?;
            fr.bward = record as i32;
            fr.free = ((record as usize + 1) * RECORD_WORDS + 1) as i32;
            debug!(handle, record, "started summary record");
        }
        self.write_file_record(handle, &fr)?;
        Ok(descriptor)
    }

    /// Summary record numbers in chain order, starting at FWARD.
    pub fn summary_chain(&mut self, handle: Handle) -> Result<Vec<u32>> {
        let fr = self.read_file_record(handle)?;
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut record = fr.fward as u32;
        while record != 0 {
            if !seen.insert(record) {
                return Err(KernelError::MalformedSummary { record, detail: "summary chain loops".into() });
            }
            chain.push(record);
            record = self.read_summary(handle, record)?.next as u32;
        }
        Ok(chain)
    }

    /// Every array in the file, in chain order.
    pub fn list_arrays(&mut self, handle: Handle) -> Result<Vec<ArrayEntry>> {
        let mut out = Vec::new();
        for record in self.summary_chain(handle)? {
            let summary = self.read_summary(handle, record)?;
            let names = self.read_names(handle, record + 1, summary.descriptors.len())?;
            for (d, name) in summary.descriptors.into_iter().zip(names.names) {
                out.push(ArrayEntry { name, values: d.values, ints: d.ints, begin: d.begin, end: d.end, record });
            }
        }
        Ok(out)
    }

    pub fn read_array(&mut self, handle: Handle, descriptor: &ArrayDescriptor) -> Result<Vec<f64>> {
        if descriptor.is_empty() {
            return Ok(Vec::new());
        }
        self.read_data(handle, descriptor.begin as u64, descriptor.len())
    }

    /// Lines of the comment area.
    pub fn read_comments(&mut self, handle: Handle) -> Result<Vec<String>> {
        let fr = self.read_file_record(handle)?;
        let mut records = Vec::new();
        for r in 2..fr.fward as u32 {
            records.push(self.read_raw_record(handle, r)?);
        }
        Ok(parse_comments(&records))
    }

    /// BLAKE3 digest of the logical content: shape, comments, descriptors,
    /// names and array data.  Independent of the file's encoding.
    pub fn content_digest(&mut self, handle: Handle) -> Result<[u8; 32]> {
        let fr = self.read_file_record(handle)?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(fr.nd as u32).to_le_bytes());
        hasher.update(&(fr.ni as u32).to_le_bytes());
        for line in self.read_comments(handle)? {
            hasher.update(line.as_bytes());
            hasher.update(&[0]);
        }
        for entry in self.list_arrays(handle)? {
            hasher.update(entry.name.as_bytes());
            hasher.update(&[0]);
            for v in &entry.values {
                hasher.update(&v.to_bits().to_le_bytes());
            }
            for i in entry.ints.iter().chain([&entry.begin, &entry.end]) {
                hasher.update(&i.to_le_bytes());
            }
            for v in self.read_array(handle, &entry.descriptor())? {
                hasher.update(&v.to_bits().to_le_bytes());
            }
        }
        Ok(*hasher.finalize().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_pack_across_records() {
        let lines: Vec<String> = (0..40).map(|i| format!("comment line {i:02} {}", "x".repeat(30))).collect();
        let records = comment_records(&lines);
        assert_eq!(records.len(), 2);
        assert_eq!(parse_comments(&records), lines);
    }

    #[test]
    fn empty_comment_area() {
        assert!(comment_records(&[]).is_empty());
        let recs: Vec<[u8; RECORD_BYTES]> = Vec::new();
        assert!(parse_comments(&recs).is_empty());
        let only_blank = comment_records(&[String::new()]);
        assert_eq!(only_blank[0][..2], [0, END_OF_COMMENTS]);
        assert_eq!(parse_comments(&only_blank), vec![String::new()]);
    }
}
