//! Locates the raw payload bytes for an attachment by re-walking the DXL
//! tree using the `AttachmentRefKind` recorded in its metadata.
//!
//! Decided lookup order for `$FILE` entries: a bare `<file>` child of the
//! `<item name="$FILE">` is tried first, then `<object><file>`.

use dxl_core::ndoc::AttachmentRefKind;
use dxl_parser::xml_util::{find_child, find_children, local_name};
use roxmltree::Node;
use std::collections::HashMap;
use std::path::Path;

const IMAGE_TAG_NAMES: [&str; 5] = ["gif", "jpeg", "png", "bmp", "notesbitmap"];

/// A located base64 payload node plus the file extension DXL told us about
/// (only set for icon/inline-image lookups; `$FILE` names already carry
/// their own extension).
pub struct PayloadLocation<'a, 'input> {
    pub data_node: Node<'a, 'input>,
    pub file_ext: Option<String>,
}

/// Finds the `<filedata>`/image-data node carrying an attachment's payload.
#[must_use]
pub fn find_payload_node<'a, 'input>(
    root: Node<'a, 'input>,
    name: &str,
    reference: &AttachmentRefKind,
) -> Option<PayloadLocation<'a, 'input>> {
    match reference {
        AttachmentRefKind::File => find_file_payload(root, name),
        AttachmentRefKind::AttachmentRef { name: ref_name } => find_attachmentref_icon_payload(root, ref_name),
        AttachmentRefKind::Picture { index } => find_inline_picture_payload(root, *index),
    }
}

fn find_file_payload<'a, 'input>(root: Node<'a, 'input>, file_name: &str) -> Option<PayloadLocation<'a, 'input>> {
    for item in root.descendants().filter(|n| n.is_element() && local_name(*n) == "item") {
        if item.attribute("name") != Some("$FILE") {
            continue;
        }
        // bare <file> first, then <object><file>.
        let file_el = find_children(item, "file")
            .into_iter()
            .find(|f| f.attribute("name") == Some(file_name))
            .or_else(|| {
                find_child(item, "object")
                    .and_then(|obj| find_children(obj, "file").into_iter().find(|f| f.attribute("name") == Some(file_name)))
            });
        if let Some(file_el) = file_el {
            return find_child(file_el, "filedata").map(|data_node| PayloadLocation {
                data_node,
                file_ext: None,
            });
        }
    }
    log::warn!("could not find <file> element for $FILE attachment '{file_name}'");
    None
}

fn find_attachmentref_icon_payload<'a, 'input>(root: Node<'a, 'input>, ref_name: &str) -> Option<PayloadLocation<'a, 'input>> {
    let attref = root
        .descendants()
        .find(|n| n.is_element() && local_name(*n) == "attachmentref" && n.attribute("name") == Some(ref_name))?;
    let picture = find_child(attref, "picture")?;
    image_data_in_picture(picture)
}

fn find_inline_picture_payload<'a, 'input>(root: Node<'a, 'input>, index: usize) -> Option<PayloadLocation<'a, 'input>> {
    let icon_ids: std::collections::HashSet<_> = root
        .descendants()
        .filter(|n| n.is_element() && local_name(*n) == "attachmentref")
        .filter_map(|attref| find_child(attref, "picture"))
        .map(|p| p.id())
        .collect();

    let inline_pics: Vec<Node<'a, 'input>> = root
        .descendants()
        .filter(|n| n.is_element() && local_name(*n) == "picture")
        .filter(|p| !icon_ids.contains(&p.id()))
        .collect();

    let picture = *inline_pics.get(index)?;
    image_data_in_picture(picture)
}

fn image_data_in_picture<'a, 'input>(picture: Node<'a, 'input>) -> Option<PayloadLocation<'a, 'input>> {
    for tag in IMAGE_TAG_NAMES {
        if let Some(data_node) = find_child(picture, tag) {
            let ext = if tag == "notesbitmap" { "bin" } else { tag };
            return Some(PayloadLocation {
                data_node,
                file_ext: Some(ext.to_string()),
            });
        }
    }
    None
}

/// Pre-scans every `<attachmentref>` in the DXL tree for its icon picture
/// payload, keyed by the extension of the attachmentref's own `name`
/// (lowercased, first match per extension wins). Used so a `file`-kind
/// attachment's shared icon can come from the DXL's own embedded icon
/// instead of always falling back to the placeholder GIF.
#[must_use]
pub fn scan_attachmentref_icon_bytes(root: Node) -> HashMap<String, Vec<u8>> {
    let mut map = HashMap::new();
    for attref in root.descendants().filter(|n| n.is_element() && local_name(*n) == "attachmentref") {
        let Some(name) = attref.attribute("name") else {
            continue;
        };
        let ext = Path::new(name).extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default();
        if ext.is_empty() || map.contains_key(&ext) {
            continue;
        }
        let Some(picture) = find_child(attref, "picture") else {
            continue;
        };
        let Some(location) = image_data_in_picture(picture) else {
            continue;
        };
        if let Some(bytes) = decode_payload(location.data_node) {
            if !bytes.is_empty() {
                map.insert(ext, bytes);
            }
        }
    }
    map
}

/// Decodes the base64 text content of a data node.
#[must_use]
pub fn decode_payload(data_node: Node) -> Option<Vec<u8>> {
    let text = data_node.text()?;
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &cleaned).ok()
}
