//! Namespace-tolerant element lookup and the C0-control sanitizer that must
//! run before the XML parser ever sees the document.

use roxmltree::Node;

/// Strips the C0 control characters that are legal in DXL exports but
/// forbidden by XML 1.0 (`U+0000..U+0008, U+000B, U+000C, U+000E..U+001F`).
/// Also strips a leading UTF-8 BOM.
#[must_use]
pub fn sanitize_dxl_text(input: &str) -> String {
    let stripped_bom = input.strip_prefix('\u{FEFF}').unwrap_or(input);
    stripped_bom
        .chars()
        .filter(|&c| {
            let u = c as u32;
            !((0x00..=0x08).contains(&u) || u == 0x0B || u == 0x0C || (0x0E..=0x1F).contains(&u))
        })
        .collect()
}

/// Returns the element's local (unqualified) tag name.
#[must_use]
pub fn local_name<'a, 'input>(node: Node<'a, 'input>) -> &'a str {
    node.tag_name().name()
}

/// Finds the first direct child whose local name matches `name`, regardless
/// of namespace (DXL elements are always in the document's single declared
/// namespace, but legacy exports sometimes omit it).
pub fn find_child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| c.is_element() && local_name(*c) == name)
}

/// Returns all direct children whose local name matches `name`.
pub fn find_children<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Vec<Node<'a, 'input>> {
    node.children().filter(|c| c.is_element() && local_name(*c) == name).collect()
}

/// Returns all direct element children, in document order.
pub fn element_children<'a, 'input>(node: Node<'a, 'input>) -> Vec<Node<'a, 'input>> {
    node.children().filter(Node::is_element).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_c0_controls() {
        let input = "a\u{0001}b\u{000B}c\u{001F}d";
        assert_eq!(sanitize_dxl_text(input), "abcd");
    }

    #[test]
    fn sanitize_strips_bom() {
        let input = "\u{FEFF}<root/>";
        assert_eq!(sanitize_dxl_text(input), "<root/>");
    }

    #[test]
    fn sanitize_keeps_tab_and_newline() {
        let input = "a\tb\nc";
        assert_eq!(sanitize_dxl_text(input), "a\tb\nc");
    }

    #[test]
    fn local_name_strips_namespace() {
        let doc = roxmltree::Document::parse(
            "<root xmlns='urn:dxl'><par/></root>",
        )
        .unwrap();
        let root = doc.root_element();
        let par = find_child(root, "par").unwrap();
        assert_eq!(local_name(par), "par");
    }
}
