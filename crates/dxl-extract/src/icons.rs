//! Per-extension shared icon files (`icons/<ext>.gif`), written once and
//! referenced by every attachment of that extension.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const ICON_DIR_NAME: &str = "icons";

/// A 1x1 transparent GIF used when no DXL-embedded icon data is available
/// for an extension.
const PLACEHOLDER_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x4c, 0x01, 0x00, 0x3b,
];

/// Controls the relative path written into the IR's `icon_path` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconPathMode {
    /// `attachments/icons/<ext>.gif` (assumes icons live alongside this
    /// document's own attachments directory).
    Local,
    /// `icons/<ext>.gif` (assumes a shared icon root outside any one
    /// document's attachments directory).
    Shared,
}

/// Ensures a shared icon file exists for `ext` under `icon_root_dir`
/// (writing DXL-embedded icon bytes if available in `ext_icon_bytes`, else a
/// placeholder), and returns the relative path to record in the IR.
pub fn ensure_extension_icon(
    ext: &str,
    icon_root_dir: &Path,
    icon_path_mode: IconPathMode,
    ext_icon_bytes: &HashMap<String, Vec<u8>>,
) -> io::Result<String> {
    let safe_ext = if ext.is_empty() { "unknown" } else { ext }.trim_start_matches('.').to_lowercase();

    fs::create_dir_all(icon_root_dir)?;
    let icon_path: PathBuf = icon_root_dir.join(format!("{safe_ext}.gif"));

    if !icon_path.exists() {
        let data = ext_icon_bytes.get(&safe_ext).map_or(PLACEHOLDER_GIF, Vec::as_slice);
        fs::write(&icon_path, data)?;
    }

    Ok(match icon_path_mode {
        IconPathMode::Shared => format!("{ICON_DIR_NAME}/{safe_ext}.gif"),
        IconPathMode::Local => format!("attachments/{ICON_DIR_NAME}/{safe_ext}.gif"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_placeholder_when_no_dxl_icon_data() {
        let dir = tempdir().unwrap();
        let rel = ensure_extension_icon("md", dir.path(), IconPathMode::Local, &HashMap::new()).unwrap();
        assert_eq!(rel, "attachments/icons/md.gif");
        assert!(dir.path().join("md.gif").exists());
    }

    #[test]
    fn shared_mode_omits_attachments_prefix() {
        let dir = tempdir().unwrap();
        let rel = ensure_extension_icon("pdf", dir.path(), IconPathMode::Shared, &HashMap::new()).unwrap();
        assert_eq!(rel, "icons/pdf.gif");
    }

    #[test]
    fn reuses_dxl_embedded_icon_bytes() {
        let dir = tempdir().unwrap();
        let mut bytes = HashMap::new();
        bytes.insert("gif".to_string(), b"REAL-ICON".to_vec());
        ensure_extension_icon("gif", dir.path(), IconPathMode::Local, &bytes).unwrap();
        assert_eq!(fs::read(dir.path().join("gif.gif")).unwrap(), b"REAL-ICON");
    }

    #[test]
    fn does_not_overwrite_existing_icon() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("txt.gif"), b"existing").unwrap();
        ensure_extension_icon("txt", dir.path(), IconPathMode::Local, &HashMap::new()).unwrap();
        assert_eq!(fs::read(dir.path().join("txt.gif")).unwrap(), b"existing");
    }
}
