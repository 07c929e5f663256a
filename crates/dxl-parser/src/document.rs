//! Top-level entry point: turns a raw DXL `<document>` string into an
//! [`NDoc`].

use crate::attachments_meta::extract_attachments_metadata;
use crate::datetime::parse_dxl_datetime;
use crate::pardef::collect_pardefs;
use crate::richtext::RichTextParser;
use crate::xml_util::{find_child, find_children, local_name, sanitize_dxl_text};
use dxl_core::ndoc::{Field, Layout, Links, Meta, NDoc, Run, SCHEMA_VERSION};
use roxmltree::Node;
use std::collections::BTreeSet;

const PRIMARY_FIELDS_ALLOWLIST: [&str; 8] = [
    "Subject", "From", "To", "CC", "Body", "Categories", "Created", "Modified",
];

/// Parses a DXL document string into its normalized IR.
///
/// On a fatal XML parse error, returns a minimal error document rather than
/// propagating the error: the pipeline contract requires one IR per input
/// document, even a broken one.
#[must_use]
pub fn parse_dxl_document_from_string(dxl: &str, db_title: &str, richtext_item_name: &str) -> NDoc {
    let sanitized = sanitize_dxl_text(dxl);

    let document = match roxmltree::Document::parse(&sanitized) {
        Ok(doc) => doc,
        Err(e) => {
            log::error!("failed to parse DXL for db '{db_title}': {e}");
            return NDoc::minimal_with_error(db_title, &format!("XML parse error: {e}"));
        }
    };

    let root = document.root_element();

    let noteinfo = find_child(root, "noteinfo");
    let unid = noteinfo
        .and_then(|n| n.attribute("unid"))
        .or_else(|| root.attribute("unid"))
        .unwrap_or("")
        .to_string();
    let form = root.attribute("form").unwrap_or("Document").to_string();

    let created = noteinfo
        .and_then(|n| find_child(n, "created"))
        .and_then(|n| find_child(n, "datetime"))
        .and_then(|n| n.text())
        .map(parse_dxl_datetime);
    let modified = noteinfo
        .and_then(|n| find_child(n, "modified"))
        .and_then(|n| find_child(n, "datetime"))
        .and_then(|n| n.text())
        .map(parse_dxl_datetime);
    let revised = noteinfo
        .and_then(|n| find_child(n, "revised"))
        .and_then(|n| find_child(n, "datetime"))
        .and_then(|n| n.text())
        .map(parse_dxl_datetime);

    let meta = Meta {
        db_title: db_title.to_string(),
        unid: unid.clone(),
        form,
        created,
        modified,
        revised,
        schema_version: SCHEMA_VERSION.to_string(),
        error: None,
        pipeline_error: None,
    };

    let pardefs = collect_pardefs(root);
    let attachments = extract_attachments_metadata(root);

    let mut fields = std::collections::BTreeMap::new();
    for item in find_children(root, "item") {
        let Some(name) = item.attribute("name") else {
            continue;
        };
        if name.starts_with('$') || name == "Form" {
            continue;
        }

        if name == richtext_item_name {
            if let Some(richtext_el) = find_child(item, "richtext") {
                let parser = RichTextParser::new(&pardefs, &attachments, None);
                let output = parser.parse(richtext_el);
                fields.insert(
                    name.to_string(),
                    Field::RichText {
                        text: output.text,
                        runs: output.runs,
                    },
                );
            } else {
                let text = fallback_text_extraction(item);
                if !text.is_empty() {
                    fields.insert(name.to_string(), Field::RichText { text, runs: Vec::new() });
                }
            }
            continue;
        }

        if let Some(field) = extract_typed_field(item) {
            fields.insert(name.to_string(), field);
        }
    }

    let links = collect_links(
        fields
            .get(richtext_item_name)
            .and_then(|f| match f {
                Field::RichText { runs, .. } => Some(runs.as_slice()),
                _ => None,
            })
            .unwrap_or(&[]),
    );

    let layout = Layout {
        primary_fields_allowlist: PRIMARY_FIELDS_ALLOWLIST.iter().map(|s| (*s).to_string()).collect(),
        used_in_body: BTreeSet::from(["Subject".to_string(), richtext_item_name.to_string()]),
    };

    log::info!("DXL parse complete for UNID {unid}.");

    NDoc {
        schema_version: SCHEMA_VERSION.to_string(),
        meta,
        fields,
        attachments,
        links,
        layout,
    }
}

/// Tries field types in priority order: textlist, datetimelist, numberlist,
/// text, datetime, number, falling back to a plain-text extraction. Returns
/// `None` if the resulting value would be empty.
fn extract_typed_field(item: Node) -> Option<Field> {
    if let Some(textlist) = find_child(item, "textlist") {
        let values: Vec<String> = find_children(textlist, "text")
            .iter()
            .filter_map(|n| n.text())
            .map(str::to_string)
            .collect();
        if !values.is_empty() {
            return Some(Field::TextList { value: values });
        }
        return None;
    }

    if let Some(dtlist) = find_child(item, "datetimelist") {
        let values: Vec<String> = find_children(dtlist, "datetime")
            .iter()
            .filter_map(|n| n.text())
            .map(parse_dxl_datetime)
            .collect();
        if !values.is_empty() {
            return Some(Field::DatetimeList { value: values });
        }
        return None;
    }

    if let Some(numlist) = find_child(item, "numberlist") {
        let values: Vec<f64> = find_children(numlist, "number")
            .iter()
            .filter_map(|n| n.text())
            .filter_map(|t| t.parse().ok())
            .collect();
        if !values.is_empty() {
            return Some(Field::NumberList { value: values });
        }
        return None;
    }

    if let Some(text_el) = find_child(item, "text") {
        let value = text_el.text().unwrap_or("").to_string();
        if !value.is_empty() {
            return Some(Field::Text { value });
        }
        return None;
    }

    if let Some(dt_el) = find_child(item, "datetime") {
        if let Some(raw) = dt_el.text() {
            return Some(Field::Datetime {
                value: parse_dxl_datetime(raw),
            });
        }
        return None;
    }

    if let Some(num_el) = find_child(item, "number") {
        if let Some(value) = num_el.text().and_then(|t| t.parse().ok()) {
            return Some(Field::Number { value });
        }
        return None;
    }

    let fallback = fallback_text_extraction(item);
    if fallback.is_empty() {
        None
    } else {
        Some(Field::Text { value: fallback })
    }
}

fn fallback_text_extraction(item: Node) -> String {
    item.descendants()
        .filter(Node::is_text)
        .filter_map(Node::text)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Recursively walks a run stream (including table cells and section
/// title/body) collecting Notes and HTTP links.
fn collect_links(runs: &[Run]) -> Links {
    let mut links = Links::default();
    walk_for_links(runs, &mut links);
    links
}

fn walk_for_links(runs: &[Run], links: &mut Links) {
    for run in runs {
        match run {
            Run::Link { url, unid, server, replica, text, .. } => {
                if let Some(unid) = unid {
                    let raw = url.clone().unwrap_or_else(|| {
                        format!(
                            "notes:///{}/{}/0/{}?OpenDocument",
                            server.clone().unwrap_or_default(),
                            replica.clone().unwrap_or_default(),
                            unid
                        )
                    });
                    links.notes.push(raw);
                } else if let Some(url) = url {
                    if url.starts_with("http://") || url.starts_with("https://") {
                        links.http.push(url.clone());
                    }
                }
                let _ = text;
            }
            Run::Table { rows, .. } => {
                for row in rows {
                    for cell in &row.cells {
                        walk_for_links(&cell.runs, links);
                    }
                }
            }
            Run::Section { title_runs, body_runs, .. } => {
                walk_for_links(title_runs, links);
                walk_for_links(body_runs, links);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_yields_minimal_error_document() {
        let doc = parse_dxl_document_from_string("<not-valid", "MyDb", "Body");
        assert_eq!(doc.meta.db_title, "MyDb");
        assert!(doc.meta.error.is_some());
    }

    #[test]
    fn extracts_unid_and_form() {
        let xml = r#"<document xmlns="urn:dxl" form="Memo">
            <noteinfo unid="ABC123"/>
            <item name="Subject"><text>Hello</text></item>
        </document>"#;
        let doc = parse_dxl_document_from_string(xml, "Db", "Body");
        assert_eq!(doc.meta.unid, "ABC123");
        assert_eq!(doc.meta.form, "Memo");
        assert!(matches!(doc.fields.get("Subject"), Some(Field::Text { value }) if value == "Hello"));
    }

    #[test]
    fn skips_dollar_and_form_items() {
        let xml = r#"<document xmlns="urn:dxl">
            <item name="$UpdatedBy"><text>x</text></item>
            <item name="Form"><text>Memo</text></item>
            <item name="Subject"><text>Keep</text></item>
        </document>"#;
        let doc = parse_dxl_document_from_string(xml, "Db", "Body");
        assert!(!doc.fields.contains_key("$UpdatedBy"));
        assert!(!doc.fields.contains_key("Form"));
        assert!(doc.fields.contains_key("Subject"));
    }

    #[test]
    fn richtext_body_falls_back_to_plain_text_without_richtext_child() {
        let xml = r#"<document xmlns="urn:dxl">
            <item name="Body">plain fallback text</item>
        </document>"#;
        let doc = parse_dxl_document_from_string(xml, "Db", "Body");
        assert!(matches!(doc.fields.get("Body"), Some(Field::RichText { text, .. }) if text == "plain fallback text"));
    }

    #[test]
    fn textlist_field_collects_multiple_values() {
        let xml = r#"<document xmlns="urn:dxl">
            <item name="Categories"><textlist><text>A</text><text>B</text></textlist></item>
        </document>"#;
        let doc = parse_dxl_document_from_string(xml, "Db", "Body");
        assert!(matches!(doc.fields.get("Categories"), Some(Field::TextList { value }) if value == &vec!["A".to_string(), "B".to_string()]));
    }

    #[test]
    fn empty_textlist_is_dropped() {
        let xml = r#"<document xmlns="urn:dxl">
            <item name="Categories"><textlist/></item>
        </document>"#;
        let doc = parse_dxl_document_from_string(xml, "Db", "Body");
        assert!(!doc.fields.contains_key("Categories"));
    }

    #[test]
    fn links_are_collected_recursively_from_tables_and_sections() {
        let xml = r#"<document xmlns="urn:dxl">
            <item name="Body"><richtext><par/><urllink href="https://example.com">Example</urllink></richtext></item>
        </document>"#;
        let doc = parse_dxl_document_from_string(xml, "Db", "Body");
        assert_eq!(doc.links.http, vec!["https://example.com".to_string()]);
    }
}
