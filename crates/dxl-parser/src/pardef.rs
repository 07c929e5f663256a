//! Pardef table: paragraph-definition id -> paragraph attributes.

use crate::xml_util::{find_child, local_name};
use dxl_core::ndoc::{Align, ListType, ParAttrs};
use roxmltree::Node;
use std::collections::HashMap;

/// Collects every `<pardef>` found anywhere under `root`, keyed by its `id`
/// attribute.
#[must_use]
pub fn collect_pardefs(root: Node) -> HashMap<String, ParAttrs> {
    let mut table = HashMap::new();
    for node in root.descendants() {
        if node.is_element() && local_name(node) == "pardef" {
            if let Some(id) = node.attribute("id") {
                table.insert(id.to_string(), par_attrs_from_pardef(node));
            }
        }
    }
    table
}

fn par_attrs_from_pardef(node: Node) -> ParAttrs {
    ParAttrs {
        align: node.attribute("align").map(canonicalize_align),
        leftmargin: node.attribute("leftmargin").map(str::to_string),
        spaceafter: node.attribute("spaceafter").map(str::to_string),
        parstyle: node.attribute("parstyle").map(str::to_string),
        list: list_type_from_pardef(node),
    }
}

fn canonicalize_align(raw: &str) -> Align {
    match raw {
        "full" => Align::Justify,
        "center" => Align::Center,
        "right" => Align::Right,
        _ => Align::Left,
    }
}

fn list_type_from_pardef(node: Node) -> Option<ListType> {
    let list_el = find_child(node, "list")?;
    for (tag, variant) in [
        ("bullet", ListType::Bullet),
        ("number", ListType::Number),
        ("uncheck", ListType::Uncheck),
        ("square", ListType::Square),
        ("alphaupper", ListType::Alphaupper),
        ("alphalower", ListType::Alphalower),
        ("romanupper", ListType::Romanupper),
        ("romanlower", ListType::Romanlower),
    ] {
        if find_child(list_el, tag).is_some() {
            return Some(variant);
        }
    }
    list_el
        .children()
        .find(|c| c.is_element())
        .map(|first| ListType::Raw(local_name(first).to_string()))
}

/// True if two `ParAttrs` are equal for the purpose of suppressing a
/// duplicate empty paragraph (§4.2 edge case 3).
#[must_use]
pub fn par_attrs_equal(a: &ParAttrs, b: &ParAttrs) -> bool {
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> roxmltree::Document<'_> {
        roxmltree::Document::parse(xml).unwrap()
    }

    #[test]
    fn collects_align_and_margin() {
        let doc = parse(
            r#"<root xmlns="urn:dxl"><pardef id="1" align="full" leftmargin="0.5in"/></root>"#,
        );
        let table = collect_pardefs(doc.root_element());
        let attrs = table.get("1").unwrap();
        assert_eq!(attrs.align, Some(Align::Justify));
        assert_eq!(attrs.leftmargin.as_deref(), Some("0.5in"));
    }

    #[test]
    fn collects_list_type() {
        let doc = parse(r#"<root xmlns="urn:dxl"><pardef id="2"><list><bullet/></list></pardef></root>"#);
        let table = collect_pardefs(doc.root_element());
        assert_eq!(table.get("2").unwrap().list, Some(ListType::Bullet));
    }

    #[test]
    fn par_attrs_equal_checks_all_fields() {
        let a = ParAttrs {
            align: Some(Align::Left),
            ..Default::default()
        };
        let b = a.clone();
        assert!(par_attrs_equal(&a, &b));
        let c = ParAttrs {
            align: Some(Align::Right),
            ..Default::default()
        };
        assert!(!par_attrs_equal(&a, &c));
    }
}
