//! Ren'Py archive index reader
//!
//! RPA archives carry a pickled index mapping each archived file name to a
//! list of `(offset, length, ...)` records. This crate decodes such an
//! index from a standalone pickle stream and flattens it into a plain text
//! report, one `<name> <offset>-<length>` line per record.
//!
//! # Pipeline
//!
//! - `Index::from_slice` deserializes the pickle, keeping entries in
//!   stream order, and shape-checks them into `Index` / `Entry` / `Record`
//! - `render` flattens the index into the report text
//! - `write_report` renders first and writes the file in a single call, so
//!   a failed run never leaves a partial report behind

mod field;
mod index;
mod report;

// Re-export main types
pub use field::Field;
pub use index::{Entry, Index, Record};
pub use report::{render, write_report, DEFAULT_REPORT_NAME};

/// Errors from index decoding and report writing
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid pickle data: {0}")]
    Pickle(#[from] serde_pickle::Error),

    #[error("Top-level value is not a dict: got {found}")]
    NotAnIndex { found: &'static str },

    #[error("Index key is not a string: got {found}")]
    LabelNotText { found: &'static str },

    #[error("Entry '{label}' does not hold a sequence: got {found}")]
    NotASequence { label: String, found: &'static str },

    #[error("Record {position} of '{label}' is not indexable: got {found}")]
    NotARecord {
        label: String,
        position: usize,
        found: &'static str,
    },

    #[error("Record {position} of '{label}' has {found} fields, need at least 2")]
    RecordTooShort {
        label: String,
        position: usize,
        found: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
