use std::path::Path;

use super::model::ExampleTable;

/// Image extensions the sequence can decode.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "ppm", "tif", "tiff"];

// ---------------------------------------------------------------------------
// Filename validation
// ---------------------------------------------------------------------------

/// Whether `filename` has a decodable extension (case-insensitive).
pub fn has_supported_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Return indices of rows whose image exists under `directory` with a
/// supported extension.
///
/// A row fails when:
/// * the extension is not in [`SUPPORTED_EXTENSIONS`]
/// * the file does not exist (or is not a regular file)
///
/// Order is preserved, so the n-th validated row is still the n-th row the
/// sequence yields.
pub fn validated_indices(table: &ExampleTable, directory: &Path) -> Vec<usize> {
    let kept: Vec<usize> = table
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            has_supported_extension(&row.filename) && directory.join(&row.filename).is_file()
        })
        .map(|(i, _)| i)
        .collect();

    let dropped = table.len() - kept.len();
    if dropped > 0 {
        log::warn!(
            "Found {dropped} invalid image filename(s) in {}; they will be ignored",
            directory.display()
        );
    }
    log::info!("Found {} validated image filenames", kept.len());
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{CellValue, ExampleRow};

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(has_supported_extension("scan.PNG"));
        assert!(has_supported_extension("scan.jpeg"));
        assert!(has_supported_extension("scan.bmp"));
        assert!(has_supported_extension("scan.ppm"));
        assert!(has_supported_extension("scan.TIF"));
        assert!(has_supported_extension("scan.tiff"));
        assert!(!has_supported_extension("scan.dcm"));
        assert!(!has_supported_extension("scan"));
    }

    #[test]
    fn missing_and_unsupported_files_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"").unwrap();
        std::fs::write(dir.path().join("c.png"), b"").unwrap();
        std::fs::write(dir.path().join("d.txt"), b"").unwrap();

        let rows = ["a.png", "b.png", "c.png", "d.txt"]
            .iter()
            .map(|f| ExampleRow {
                filename: f.to_string(),
                label: CellValue::Integer(0),
            })
            .collect();
        let table = ExampleTable::from_rows(rows);

        assert_eq!(validated_indices(&table, dir.path()), vec![0, 2]);
    }
}
