//! Attachment metadata extraction: walks the raw DXL tree (not the richtext
//! run stream) for `$FILE` items, `<attachmentref>` elements and `<picture>`
//! elements, and produces the `attachments` array of the IR.
//!
//! Icon pictures (inline children of `<attachmentref>`) are excluded from the
//! result; only `$FILE` entries, non-icon inline images, and attachmentref
//! stubs without a matching `$FILE` survive.

use crate::xml_util::{find_children, local_name};
use dxl_core::ndoc::{AttachmentMeta, AttachmentRefKind, AttachmentType};
use roxmltree::Node;
use std::collections::HashSet;

/// Extracts attachment metadata from the full document tree.
///
/// `root` is the `<document>` root element (or equivalent); `items` is every
/// `<item>` element in the document, used to find `$FILE` entries.
#[must_use]
pub fn extract_attachments_metadata(root: Node) -> Vec<AttachmentMeta> {
    let mut out = Vec::new();

    // Step 1: $FILE items.
    for item in root.descendants().filter(|n| n.is_element() && local_name(*n) == "item") {
        if item.attribute("name") != Some("$FILE") {
            continue;
        }
        for file_el in item.descendants().filter(|n| n.is_element() && local_name(*n) == "file") {
            let Some(name) = file_el.attribute("name") else {
                continue;
            };
            out.push(AttachmentMeta {
                name: name.to_string(),
                kind: AttachmentType::File,
                reference: AttachmentRefKind::File,
                size: file_el
                    .attribute("size")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
                created: None,
                modified: None,
                content_path: None,
                saved_name: None,
                icon_path: None,
                sha256: None,
                extraction_error: None,
            });
        }
    }

    let file_names: HashSet<&str> = out.iter().map(|a| a.name.as_str()).collect();

    // Step 2: attachmentref elements and their icon-picture children.
    let attachmentrefs: Vec<Node> = root
        .descendants()
        .filter(|n| n.is_element() && local_name(*n) == "attachmentref")
        .collect();
    let mut icon_picture_ids = HashSet::new();
    let mut attachmentref_names = Vec::new();
    for aref in &attachmentrefs {
        if let Some(name) = aref.attribute("name") {
            attachmentref_names.push(name.to_string());
        }
        for picture in find_children(*aref, "picture") {
            icon_picture_ids.insert(picture.id());
        }
    }

    // Step 3: all <picture> elements; icons are skipped (v1.5: icon items abolished).
    let mut inline_image_index = 0usize;
    for picture in root.descendants().filter(|n| n.is_element() && local_name(*n) == "picture") {
        if icon_picture_ids.contains(&picture.id()) {
            continue;
        }
        let size = estimate_picture_size(picture);
        out.push(AttachmentMeta {
            name: format!("inline_image_{inline_image_index}"),
            kind: AttachmentType::Image,
            reference: AttachmentRefKind::Picture {
                index: inline_image_index,
            },
            size,
            created: None,
            modified: None,
            content_path: None,
            saved_name: None,
            icon_path: None,
            sha256: None,
            extraction_error: None,
        });
        inline_image_index += 1;
    }

    // Step 4: stub entries for attachmentref names not covered by $FILE.
    for name in attachmentref_names {
        if file_names.contains(name.as_str()) {
            continue;
        }
        if out.iter().any(|a| a.name == name) {
            continue;
        }
        out.push(AttachmentMeta {
            name: name.clone(),
            kind: AttachmentType::File,
            reference: AttachmentRefKind::AttachmentRef { name },
            size: 0,
            created: None,
            modified: None,
            content_path: None,
            saved_name: None,
            icon_path: None,
            sha256: None,
            extraction_error: None,
        });
    }

    out.sort_by(|a, b| (a.name.as_str(), kind_rank(a.kind)).cmp(&(b.name.as_str(), kind_rank(b.kind))));
    out
}

fn kind_rank(kind: AttachmentType) -> u8 {
    match kind {
        AttachmentType::File => 0,
        AttachmentType::Image => 1,
        AttachmentType::Ole => 2,
    }
}

/// Estimates an inline image's byte size: decodes the inner `<gif>` element's
/// base64 payload when present, else falls back to `width * height` from
/// pixel attributes (a crude but source-faithful estimate), else 0.
fn estimate_picture_size(picture: Node) -> u64 {
    if let Some(gif) = picture.descendants().find(|n| n.is_element() && local_name(*n) == "gif") {
        if let Some(text) = gif.text() {
            let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            if let Ok(bytes) = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &cleaned) {
                return bytes.len() as u64;
            }
        }
    }
    let width: Option<u64> = picture.attribute("width").and_then(|v| v.parse().ok());
    let height: Option<u64> = picture.attribute("height").and_then(|v| v.parse().ok());
    match (width, height) {
        (Some(w), Some(h)) => w * h,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> roxmltree::Document<'_> {
        roxmltree::Document::parse(xml).unwrap()
    }

    #[test]
    fn collects_file_items() {
        let doc = parse(
            r#"<document xmlns="urn:dxl">
                <item name="$FILE"><file name="report.pdf" size="1024"/></item>
            </document>"#,
        );
        let metas = extract_attachments_metadata(doc.root_element());
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].name, "report.pdf");
        assert_eq!(metas[0].size, 1024);
        assert!(matches!(metas[0].reference, AttachmentRefKind::File));
    }

    #[test]
    fn skips_icon_pictures_under_attachmentref() {
        let doc = parse(
            r#"<document xmlns="urn:dxl">
                <richtext>
                  <attachmentref name="a.pdf"><picture width="16" height="16"/></attachmentref>
                  <picture width="100" height="50"/>
                </richtext>
            </document>"#,
        );
        let metas = extract_attachments_metadata(doc.root_element());
        let images: Vec<_> = metas.iter().filter(|a| a.kind == AttachmentType::Image).collect();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].size, 5000);
    }

    #[test]
    fn stub_entry_for_uncovered_attachmentref() {
        let doc = parse(
            r#"<document xmlns="urn:dxl">
                <richtext><attachmentref name="orphan.pdf"/></richtext>
            </document>"#,
        );
        let metas = extract_attachments_metadata(doc.root_element());
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].name, "orphan.pdf");
        assert_eq!(metas[0].size, 0);
        assert!(matches!(
            metas[0].reference,
            AttachmentRefKind::AttachmentRef { .. }
        ));
    }

    #[test]
    fn attachmentref_covered_by_file_produces_no_stub() {
        let doc = parse(
            r#"<document xmlns="urn:dxl">
                <item name="$FILE"><file name="report.pdf" size="10"/></item>
                <richtext><attachmentref name="report.pdf"/></richtext>
            </document>"#,
        );
        let metas = extract_attachments_metadata(doc.root_element());
        assert_eq!(metas.len(), 1);
    }

    #[test]
    fn results_sorted_by_name_then_type() {
        let doc = parse(
            r#"<document xmlns="urn:dxl">
                <item name="$FILE"><file name="b.pdf" size="1"/></item>
                <item name="$FILE"><file name="a.pdf" size="1"/></item>
            </document>"#,
        );
        let metas = extract_attachments_metadata(doc.root_element());
        assert_eq!(metas[0].name, "a.pdf");
        assert_eq!(metas[1].name, "b.pdf");
    }
}
