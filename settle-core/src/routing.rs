//! Destination table names derived from settlement filenames.

use std::path::Path;

/// Route a settlement filename to its market-data table.
///
/// `cme.settle.fut.s.xml` → `cme`. Forward-curve files (basename contains
/// `fwd`) join the first and third dot-separated segments:
/// `cme.fwd.settle.fut.s.xml` → `cme_settle`.
pub fn route_table_name(filename: &str) -> String {
    let basename = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);
    let segments: Vec<&str> = basename.split('.').collect();

    if basename.contains("fwd") {
        if let (Some(first), Some(third)) = (segments.first(), segments.get(2)) {
            return format!("{first}_{third}");
        }
    }
    segments.first().copied().unwrap_or_default().to_string()
}
