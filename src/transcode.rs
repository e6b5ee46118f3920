//! Copy an array file into a new file with a different binary encoding.
//!
//! Summary records and array data are decoded and re-encoded; comment and
//! name records are untyped bytes and are copied verbatim.  Only words
//! before FREE are carried over.  If any step fails, the destination is
//! deleted before the error is returned.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::codec::{translate_words, WORD_BYTES};
use crate::error::Result;
use crate::file_record::{FileRecord, RECORD_WORDS};
use crate::files::Handle;
use crate::manager::FileManager;
use crate::registry::{AccessMethod, Architecture, BinaryEncoding};

/// What a transcode copied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranscodeReport {
    pub source_encoding: Option<BinaryEncoding>,
    pub destination_encoding: Option<BinaryEncoding>,
    pub comment_records: u32,
    pub summary_records: u32,
    pub name_records: u32,
    pub data_records: u32,
    /// Data words re-encoded.
    pub data_words: u64,
}

impl FileManager {
    /// Write a copy of the array file open as `source` to `destination`,
    /// which must not exist, in `encoding`.
    pub fn transcode(&mut self, source: Handle, destination: impl AsRef<Path>, encoding: BinaryEncoding) -> Result<TranscodeReport> {
        let fr = self.read_file_record(source)?;
        let destination = destination.as_ref();
        let dest = self.open_new(destination, Architecture::Daf, encoding)?;
        match self.copy_records(source, dest, &fr, encoding) {
            Ok(report) => {
                self.close(dest)?;
                info!(
                    destination = %destination.display(),
                    from = %fr.encoding,
                    to = %encoding,
                    words = report.data_words,
                    "transcoded file"
                );
                Ok(report)
            }
            Err(e) => {
                if let Err(cleanup) = self.close_and_delete(dest) {
                    warn!(destination = %destination.display(), error = %cleanup, "could not remove partial transcode");
                }
                Err(e)
            }
        }
    }

    fn copy_records(&mut self, source: Handle, dest: Handle, fr: &FileRecord, encoding: BinaryEncoding) -> Result<TranscodeReport> {
        let mut report = TranscodeReport {
            source_encoding: Some(fr.encoding),
            destination_encoding: Some(encoding),
            ..TranscodeReport::default()
        };

        let mut out = fr.clone();
        out.encoding = encoding;
        self.write_file_record(dest, &out)?;

        let fward = fr.fward as u32;
        for r in 2..fward {
            let raw = self.read_raw_record(source, r)?;
            self.write_raw_record(dest, r, &raw)?;
            report.comment_records += 1;
        }

        let summaries: HashSet<u32> = self.summary_chain(source)?.into_iter().collect();
        let free_word = (fr.free - 1).max(0) as usize;
        let last = fr.last_record();
        for r in fward..=last {
            if summaries.contains(&r) {
                let summary = self.read_summary(source, r)?;
                self.write_summary(dest, r, &summary)?;
                report.summary_records += 1;
            } else if summaries.contains(&(r - 1)) {
                let raw = self.read_raw_record(source, r)?;
                self.write_raw_record(dest, r, &raw)?;
                report.name_records += 1;
            } else {
                let first_word = (r as usize - 1) * RECORD_WORDS;
                let live = free_word.saturating_sub(first_word).min(RECORD_WORDS);
                if live == 0 {
                    continue;
                }
                let raw = self.read_raw_record(source, r)?;
                let words = translate_words(&raw[..live * WORD_BYTES], fr.encoding, encoding)?;
                self.write_raw_record(dest, r, &words)?;
                report.data_records += 1;
                report.data_words += live as u64;
            }
        }
        Ok(report)
    }
}

/// Open `source` for reading, transcode it to `destination` and close it
/// again unless it was already open.
pub fn transcode_path(
    manager: &mut FileManager,
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    encoding: BinaryEncoding,
) -> Result<TranscodeReport> {
    let source = source.as_ref();
    let shared = manager.find_by_name(&source.to_string_lossy()).is_some();
    let handle = manager.open(source, AccessMethod::Read, Architecture::Daf)?;
    let result = manager.transcode(handle, destination, encoding);
    if !shared {
        manager.close(handle)?;
    }
    result
}
