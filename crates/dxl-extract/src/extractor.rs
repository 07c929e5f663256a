//! Orchestrates per-attachment payload extraction: locate bytes in the DXL
//! tree, dedup-write to `attachments/`, and fill in `content_path`/`sha256`.
//!
//! Desired filenames prefer a richtext `attachmentref.displayname` over the
//! attachment's own `name` (both stripped of a trailing `.NNN` sequence
//! suffix), matching what readers actually see in the body text rather than
//! the raw `$FILE` item name.

use crate::dedup::decide_and_write;
use crate::icons::{ensure_extension_icon, IconPathMode};
use crate::payload::{decode_payload, find_payload_node, scan_attachmentref_icon_bytes};
use dxl_core::hash::{sha256_hex, strip_seq_suffix};
use dxl_core::ndoc::{AttachmentMeta, AttachmentRefKind, AttachmentType, Field, Run};
use roxmltree::Node;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Builds the `attachmentref name -> displayname` map used to prefer a
/// richtext run's `displayname` over the attachment's own `name` when
/// naming saved files, by walking every richtext field's run stream
/// (including into table cells and section title/body runs).
#[must_use]
pub fn collect_displayname_map(fields: &BTreeMap<String, Field>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for field in fields.values() {
        if let Field::RichText { runs, .. } = field {
            collect_displaynames_from_runs(runs, &mut map);
        }
    }
    map
}

fn collect_displaynames_from_runs(runs: &[Run], map: &mut HashMap<String, String>) {
    for run in runs {
        match run {
            Run::AttachmentRef { name, displayname, .. } => {
                map.entry(name.clone()).or_insert_with(|| displayname.clone().unwrap_or_else(|| name.clone()));
            }
            Run::Table { rows, .. } => {
                for row in rows {
                    for cell in &row.cells {
                        collect_displaynames_from_runs(&cell.runs, map);
                    }
                }
            }
            Run::Section { title_runs, body_runs, .. } => {
                collect_displaynames_from_runs(title_runs, map);
                collect_displaynames_from_runs(body_runs, map);
            }
            _ => {}
        }
    }
}

/// Extracts every attachment's payload and writes it under
/// `attachment_output_dir`, mutating each [`AttachmentMeta`] in place with
/// `content_path`, `saved_name`, and `sha256`. Attachments whose payload
/// can't be found or are empty get `extraction_error` set instead.
///
/// `file`-kind attachments also get a shared per-extension `icon_path`
/// resolved under `icon_root_dir`, preferring an icon embedded in the DXL's
/// own `<attachmentref>` pictures over the placeholder GIF.
pub fn extract_all(
    root: Node,
    attachments: &mut [AttachmentMeta],
    displayname_map: &HashMap<String, String>,
    attachment_output_dir: &Path,
    icon_root_dir: &Path,
    icon_path_mode: IconPathMode,
) {
    let ext_icon_bytes = scan_attachmentref_icon_bytes(root);
    for meta in attachments.iter_mut() {
        extract_one(root, meta, displayname_map, attachment_output_dir);
        if meta.kind == AttachmentType::File {
            assign_icon_path(meta, icon_root_dir, icon_path_mode, &ext_icon_bytes);
        }
    }
}

fn assign_icon_path(meta: &mut AttachmentMeta, icon_root_dir: &Path, icon_path_mode: IconPathMode, ext_icon_bytes: &HashMap<String, Vec<u8>>) {
    let ext = Path::new(&meta.name).extension().map(|e| e.to_string_lossy().to_string()).unwrap_or_default();
    match ensure_extension_icon(&ext, icon_root_dir, icon_path_mode, ext_icon_bytes) {
        Ok(path) => meta.icon_path = Some(path),
        Err(e) => log::warn!("failed to write shared icon for extension '{ext}': {e}"),
    }
}

/// Picks the desired on-disk filename: the richtext displayname (keyed by
/// either the attachment's own name or its seq-suffix-stripped form) wins
/// over the attachment's own name, gaining the name's extension if it
/// doesn't already have one.
fn desired_name(meta: &AttachmentMeta, displayname_map: &HashMap<String, String>) -> String {
    let base_key = strip_seq_suffix(&meta.name);
    let mut preferred = displayname_map.get(&meta.name).or_else(|| displayname_map.get(&base_key)).cloned();

    if let Some(p) = &preferred {
        let has_ext = Path::new(p).file_name().map(|f| f.to_string_lossy().contains('.')).unwrap_or(false);
        if !has_ext && !meta.name.is_empty() {
            if let Some(ext) = Path::new(&meta.name).extension() {
                preferred = Some(format!("{p}.{}", ext.to_string_lossy()));
            }
        }
    }

    preferred.unwrap_or_else(|| meta.name.clone())
}

fn extract_one(root: Node, meta: &mut AttachmentMeta, displayname_map: &HashMap<String, String>, attachment_output_dir: &Path) {
    let Some(location) = find_payload_node(root, &meta.name, &meta.reference) else {
        meta.extraction_error = Some("payload element not found in DXL".to_string());
        return;
    };

    let Some(mut bytes) = decode_payload(location.data_node) else {
        meta.extraction_error = Some("base64 decode failed".to_string());
        return;
    };

    if bytes.is_empty() {
        meta.extraction_error = Some("no non-empty data found (0KB file)".to_string());
        return;
    }

    let mut desired = desired_name(meta, displayname_map);
    if meta.kind == AttachmentType::Image && matches!(meta.reference, AttachmentRefKind::Picture { .. }) && !desired.contains('.') {
        let ext = location.file_ext.as_deref().unwrap_or("gif");
        desired = format!("{desired}.{ext}");
    }
    let pretty = strip_seq_suffix(&desired);

    match decide_and_write(&pretty, attachment_output_dir, &bytes) {
        Ok(outcome) => {
            meta.content_path = Some(format!("attachments/{}", outcome.path.file_name().unwrap().to_string_lossy()));
            meta.saved_name = Some(outcome.path.file_name().unwrap().to_string_lossy().to_string());
            meta.sha256 = Some(sha256_hex(&bytes));
            meta.size = bytes.len() as u64;
        }
        Err(e) => {
            log::warn!("failed to write attachment '{}': {e}", meta.name);
            meta.extraction_error = Some(format!("write failed: {e}"));
        }
    }

    bytes.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxl_core::ndoc::AttachmentRefKind;
    use tempfile::tempdir;

    fn parse(xml: &str) -> roxmltree::Document<'_> {
        roxmltree::Document::parse(xml).unwrap()
    }

    fn file_meta(name: &str) -> AttachmentMeta {
        AttachmentMeta {
            name: name.to_string(),
            kind: AttachmentType::File,
            reference: AttachmentRefKind::File,
            size: 0,
            created: None,
            modified: None,
            content_path: None,
            saved_name: None,
            icon_path: None,
            sha256: None,
            extraction_error: None,
        }
    }

    #[test]
    fn extracts_file_attachment_and_sets_content_path() {
        let doc = parse(
            r#"<document xmlns="urn:dxl">
                <item name="$FILE"><file name="report.pdf"><filedata>aGVsbG8=</filedata></file></item>
            </document>"#,
        );
        let dir = tempdir().unwrap();
        let icon_dir = tempdir().unwrap();
        let mut metas = [file_meta("report.pdf")];
        extract_all(doc.root_element(), &mut metas, &HashMap::new(), dir.path(), icon_dir.path(), IconPathMode::Local);
        let meta = metas[0].clone();
        assert_eq!(meta.content_path.as_deref(), Some("attachments/report.pdf"));
        assert!(meta.sha256.is_some());
        assert_eq!(meta.icon_path.as_deref(), Some("attachments/icons/pdf.gif"));
    }

    #[test]
    fn missing_payload_sets_extraction_error() {
        let doc = parse(r#"<document xmlns="urn:dxl"></document>"#);
        let dir = tempdir().unwrap();
        let icon_dir = tempdir().unwrap();
        let mut metas = [file_meta("missing.pdf")];
        extract_all(doc.root_element(), &mut metas, &HashMap::new(), dir.path(), icon_dir.path(), IconPathMode::Local);
        assert!(metas[0].extraction_error.is_some());
        assert!(metas[0].content_path.is_none());
    }

    #[test]
    fn displayname_preferred_over_name_gains_name_extension() {
        let doc = parse(
            r#"<document xmlns="urn:dxl">
                <item name="$FILE"><file name="data.txt"><filedata>aGVsbG8=</filedata></file></item>
            </document>"#,
        );
        let dir = tempdir().unwrap();
        let icon_dir = tempdir().unwrap();
        let mut displayname_map = HashMap::new();
        displayname_map.insert("data.txt".to_string(), "\u{6587}\u{66f8}_v1.002.txt".to_string());
        let mut metas = [file_meta("data.txt")];
        extract_all(doc.root_element(), &mut metas, &displayname_map, dir.path(), icon_dir.path(), IconPathMode::Local);
        let meta = metas[0].clone();
        assert_eq!(meta.saved_name.as_deref(), Some("\u{6587}\u{66f8}_v1.txt"));
        assert_eq!(meta.content_path.as_deref(), Some("attachments/\u{6587}\u{66f8}_v1.txt"));
    }

    #[test]
    fn embedded_icon_bytes_are_used_instead_of_placeholder() {
        let doc = parse(
            r#"<document xmlns="urn:dxl">
                <item name="$FILE"><file name="report.pdf"><filedata>aGVsbG8=</filedata></file></item>
                <attachmentref name="report.pdf"><picture><gif>UkVBTC1JQ09O</gif></picture></attachmentref>
            </document>"#,
        );
        let dir = tempdir().unwrap();
        let icon_dir = tempdir().unwrap();
        let mut metas = [file_meta("report.pdf")];
        extract_all(doc.root_element(), &mut metas, &HashMap::new(), dir.path(), icon_dir.path(), IconPathMode::Local);
        let icon_path = icon_dir.path().join("pdf.gif");
        assert_eq!(std::fs::read(&icon_path).unwrap(), b"REAL-ICON");
    }
}
