//! Label tables for access methods, binary encodings and file architectures.
//!
//! Codes are 1-based positions in each table; they are what the file record
//! and the command line exchange.  Label lookups ignore surrounding blanks
//! and case.  The tables never fail: unknown codes map to a blank label and
//! unknown labels map to `None`.  Parsing an [`Architecture`] from text
//! reports an unknown label as [`KernelError::UnknownArchitecture`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KernelError;

/// The three enumerations the registry knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    AccessMethod,
    BinaryEncoding,
    Architecture,
}

const ACCESS_LABELS: [&str; 4] = ["READ", "WRITE", "SCRATCH", "NEW"];
const ENCODING_LABELS: [&str; 4] = ["BIG-IEEE", "LTL-IEEE", "VAX-GFLT", "VAX-DFLT"];
const ARCHITECTURE_LABELS: [&str; 2] = ["DAF", "DAS"];

fn table(category: Category) -> &'static [&'static str] {
    match category {
        Category::AccessMethod => &ACCESS_LABELS,
        Category::BinaryEncoding => &ENCODING_LABELS,
        Category::Architecture => &ARCHITECTURE_LABELS,
    }
}

/// Canonical label for `code`, or an empty string when the code is unknown.
pub fn label_for(category: Category, code: i32) -> String {
    usize::try_from(code)
        .ok()
        .and_then(|c| c.checked_sub(1))
        .and_then(|i| table(category).get(i))
        .map(|s| s.to_string())
        .unwrap_or_default()
}

/// Code for `label`, matched without regard to case or surrounding blanks.
pub fn code_for(category: Category, label: &str) -> Option<i32> {
    let wanted = label.trim();
    if wanted.is_empty() {
        return None;
    }
    table(category)
        .iter()
        .position(|l| l.eq_ignore_ascii_case(wanted))
        .map(|i| i as i32 + 1)
}

// ── Typed views ──────────────────────────────────────────────────────────────

macro_rules! registry_enum {
    ($name:ident, $category:expr, [$($variant:ident),+ $(,)?]) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn code(self) -> i32 {
                Self::ALL.iter().position(|v| *v == self).map(|i| i as i32 + 1).unwrap_or(0)
            }

            pub fn from_code(code: i32) -> Option<Self> {
                usize::try_from(code).ok()?.checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
            }

            pub fn label(self) -> &'static str {
                table($category)[(self.code() - 1) as usize]
            }

            pub fn from_label(label: &str) -> Option<Self> {
                code_for($category, label).and_then(Self::from_code)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMethod {
    Read,
    Write,
    Scratch,
    New,
}
registry_enum!(AccessMethod, Category::AccessMethod, [Read, Write, Scratch, New]);

impl AccessMethod {
    /// Whether records may be written through a handle opened this way.
    pub fn is_writable(self) -> bool {
        !matches!(self, AccessMethod::Read)
    }
}

/// Floating-point and integer representation a file was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryEncoding {
    BigIeee,
    LtlIeee,
    VaxGfloat,
    VaxDfloat,
}
registry_enum!(BinaryEncoding, Category::BinaryEncoding, [BigIeee, LtlIeee, VaxGfloat, VaxDfloat]);

impl BinaryEncoding {
    /// IEEE byte order of the running host.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            BinaryEncoding::BigIeee
        } else {
            BinaryEncoding::LtlIeee
        }
    }
}

/// On-disk record layout family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    /// Flat array-table files.
    Daf,
    /// Segmented-table files.
    Das,
}
registry_enum!(Architecture, Category::Architecture, [Daf, Das]);

impl FromStr for Architecture {
    type Err = KernelError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        Architecture::from_label(label).ok_or_else(|| KernelError::UnknownArchitecture(label.trim().to_string()))
    }
}
