//! Flat text report over a decoded archive index

use std::fs;
use std::path::Path;

use crate::{Index, Result};

/// Report filename used when the caller does not pick one, matching the
/// reference dump this tool is diffed against.
pub const DEFAULT_REPORT_NAME: &str = "out_load_python.txt";

/// Render the report: one `<label> <offset>-<length>` line per record.
///
/// Entries appear in index order and records in sequence order; fields
/// past the first two are not rendered. An empty index renders to an
/// empty string.
pub fn render(index: &Index) -> String {
    let mut out = String::new();
    for entry in &index.entries {
        for record in &entry.records {
            out.push_str(&format!(
                "{} {}-{}\n",
                entry.label, record.offset, record.length
            ));
        }
    }
    out
}

/// Render the report and write it to `path`, creating or truncating the
/// file. Rendering happens before the file is opened, so no failure can
/// leave a partial report behind.
pub fn write_report(index: &Index, path: &Path) -> Result<()> {
    fs::write(path, render(index))?;
    Ok(())
}
