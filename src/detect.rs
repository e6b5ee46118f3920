//! Binary format detection.
//!
//! Newly written files carry the constant [`PROBE_VALUE`] in a fixed slot of
//! their first record.  Because decoding a double already presumes an
//! encoding, detection compares the raw eight bytes against the known
//! fingerprints instead.  A label slot (`BIG-IEEE`, ...) written next to the
//! probe takes precedence when present.

use crate::file_record::{layout, FTP_STRING};
use crate::registry::{Architecture, BinaryEncoding};

/// The constant every file stores in its probe slot.
pub const PROBE_VALUE: f64 = 1.0;

/// Byte patterns of [`PROBE_VALUE`] in each encoding.
pub const FINGERPRINTS: [(BinaryEncoding, [u8; 8]); 4] = [
    (BinaryEncoding::BigIeee, [0x3F, 0xF0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]),
    (BinaryEncoding::LtlIeee, [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xF0, 0x3F]),
    (BinaryEncoding::VaxGfloat, [0x10, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]),
    (BinaryEncoding::VaxDfloat, [0x80, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]),
];

/// Classify an 8-byte probe word.  `None` means unrecognised.
pub fn identify(bytes: &[u8; 8]) -> Option<BinaryEncoding> {
    FINGERPRINTS.iter().find(|(_, fp)| fp == bytes).map(|(enc, _)| *enc)
}

/// The probe word a file in `encoding` carries.
pub fn probe_word(encoding: BinaryEncoding) -> [u8; 8] {
    FINGERPRINTS
        .iter()
        .find(|(enc, _)| *enc == encoding)
        .map(|(_, fp)| *fp)
        .unwrap_or([0; 8])
}

/// State of the FTP validation string in a first record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtpState {
    /// Written before validation strings existed.
    Absent,
    Intact,
    /// Present but altered, typically by a text-mode transfer.
    Damaged,
}

pub fn ftp_state(record: &[u8]) -> FtpState {
    let head = &FTP_STRING[..7];
    let Some(pos) = record.windows(head.len()).position(|w| w == head) else {
        return FtpState::Absent;
    };
    match record.get(pos..pos + FTP_STRING.len()) {
        Some(found) if found == FTP_STRING => FtpState::Intact,
        _ => FtpState::Damaged,
    }
}

/// Architecture named by the identification word, if any.
///
/// Accepts `DAF/xxxx` and `DAS/xxxx` as well as the older `NAIF/DAF` and
/// `NAIF/DAS` forms.
pub fn sniff_architecture(record: &[u8]) -> Option<Architecture> {
    let id = record.get(..8)?;
    let id = std::str::from_utf8(id).ok()?.trim_end_matches(['\0', ' ']);
    let upper = id.to_ascii_uppercase();
    if upper.starts_with("DAF/") || upper == "NAIF/DAF" {
        Some(Architecture::Daf)
    } else if upper.starts_with("DAS/") || upper == "NAIF/DAS" {
        Some(Architecture::Das)
    } else {
        None
    }
}

/// Encoding of a first record laid out as `architecture`: the label slot if
/// it names a known encoding, otherwise the probe word.
pub fn classify_record(record: &[u8], architecture: Architecture) -> Option<BinaryEncoding> {
    let (label, probe) = match architecture {
        Architecture::Daf => (layout::DAF_FORMAT, layout::DAF_PROBE),
        Architecture::Das => (layout::DAS_FORMAT, layout::DAS_PROBE),
    };
    let labelled = record
        .get(label)
        .and_then(|b| std::str::from_utf8(b).ok())
        .and_then(|s| BinaryEncoding::from_label(s.trim_end_matches('\0')));
    if labelled.is_some() {
        return labelled;
    }
    let word: [u8; 8] = record.get(probe)?.try_into().ok()?;
    identify(&word)
}

/// Architectures to try, `preferred` first.
pub fn search_order(preferred: Architecture) -> impl Iterator<Item = Architecture> {
    std::iter::once(preferred).chain(Architecture::ALL.iter().copied().filter(move |a| *a != preferred))
}

/// Find the architecture and encoding of a first record, trying `preferred`
/// first and then the remaining architectures.
pub fn sniff(record: &[u8], preferred: Architecture) -> Option<(Architecture, BinaryEncoding)> {
    let named = sniff_architecture(record);
    search_order(preferred)
        .filter(|arch| named.map_or(true, |n| n == *arch))
        .find_map(|arch| classify_record(record, arch).map(|enc| (arch, enc)))
}
