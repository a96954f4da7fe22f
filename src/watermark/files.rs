use std::fs;
use std::io::Read;
use std::path::Path;

use super::WatermarkError;

/// Detect a PDF from its magic bytes, not its extension.
pub fn is_pdf(path: &Path) -> Result<bool, WatermarkError> {
    let mut file = fs::File::open(path)?;
    let mut header = [0u8; 4];
    let bytes_read = file.read(&mut header)?;
    Ok(matches!(&header[..bytes_read], [0x25, 0x50, 0x44, 0x46]))
}

/// Name printed in the footer, read from a user-details file.
pub fn display_name(path: &Path) -> Result<String, WatermarkError> {
    let raw = fs::read_to_string(path)?;
    Ok(raw.trim().to_string())
}

/// Remove every regular file directly inside `dir`. Subdirectories are left
/// alone. Returns how many files were removed.
pub fn clear_directory(dir: &Path) -> Result<usize, WatermarkError> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    tracing::debug!(dir = %dir.display(), removed, "Cleared directory");
    Ok(removed)
}
