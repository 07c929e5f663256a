//! Appendix field selection: everything not already surfaced as a primary
//! field or folded into the body, rendered by each engine as a three-column
//! (name, type, preview) table.

use dxl_core::ndoc::{Field, NDoc};

/// Maximum length of a rendered preview string before truncation.
pub const PREVIEW_MAX_LEN: usize = 200;

/// One row of the appendix table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendixRow {
    pub name: String,
    pub field_type: &'static str,
    pub preview: String,
}

/// Selects every field not in `layout.primary_fields_allowlist`, not in
/// `layout.used_in_body`, and not starting with `$`, sorted by name.
#[must_use]
pub fn appendix_rows(doc: &NDoc) -> Vec<AppendixRow> {
    let mut rows: Vec<AppendixRow> = doc
        .fields
        .iter()
        .filter(|(name, _)| {
            !name.starts_with('$')
                && !doc.layout.primary_fields_allowlist.contains(*name)
                && !doc.layout.used_in_body.contains(*name)
        })
        .map(|(name, field)| AppendixRow {
            name: name.clone(),
            field_type: field_type_name(field),
            preview: preview_of(field),
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}

fn field_type_name(field: &Field) -> &'static str {
    match field {
        Field::Text { .. } => "text",
        Field::Number { .. } => "number",
        Field::Datetime { .. } => "datetime",
        Field::TextList { .. } => "textlist",
        Field::NumberList { .. } => "numberlist",
        Field::DatetimeList { .. } => "datetimelist",
        Field::RichText { .. } => "richtext",
    }
}

fn preview_of(field: &Field) -> String {
    let raw = match field {
        Field::Text { value } => value.clone(),
        Field::Number { value } => value.to_string(),
        Field::Datetime { value } => value.clone(),
        Field::TextList { value } => value.join(", "),
        Field::NumberList { value } => value.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
        Field::DatetimeList { value } => value.join(", "),
        Field::RichText { text, .. } => text.clone(),
    };
    truncate_preview(&raw)
}

fn truncate_preview(s: &str) -> String {
    if s.chars().count() <= PREVIEW_MAX_LEN {
        return s.to_string();
    }
    let mut truncated: String = s.chars().take(PREVIEW_MAX_LEN).collect();
    truncated.push('\u{2026}');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxl_core::ndoc::{Layout, Meta};
    use std::collections::{BTreeMap, BTreeSet};

    fn doc_with_fields(fields: Vec<(&str, Field)>) -> NDoc {
        NDoc {
            schema_version: "1.5".to_string(),
            meta: Meta {
                db_title: "Db".to_string(),
                unid: "U".to_string(),
                form: "Doc".to_string(),
                created: None,
                modified: None,
                revised: None,
                schema_version: "1.5".to_string(),
                error: None,
                pipeline_error: None,
            },
            fields: fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect::<BTreeMap<_, _>>(),
            attachments: Vec::new(),
            links: Default::default(),
            layout: Layout {
                primary_fields_allowlist: BTreeSet::from(["Subject".to_string()]),
                used_in_body: BTreeSet::from(["Body".to_string()]),
            },
        }
    }

    #[test]
    fn excludes_primary_and_body_fields() {
        let doc = doc_with_fields(vec![
            ("Subject", Field::Text { value: "hi".to_string() }),
            ("Body", Field::RichText { text: "body".to_string(), runs: vec![] }),
            ("Category", Field::Text { value: "finance".to_string() }),
        ]);
        let rows = appendix_rows(&doc);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Category");
    }

    #[test]
    fn excludes_dollar_prefixed_fields() {
        let doc = doc_with_fields(vec![("$Revisions", Field::Text { value: "x".to_string() })]);
        assert!(appendix_rows(&doc).is_empty());
    }

    #[test]
    fn truncates_long_preview() {
        let long = "a".repeat(300);
        let doc = doc_with_fields(vec![("Notes", Field::Text { value: long })]);
        let rows = appendix_rows(&doc);
        assert_eq!(rows[0].preview.chars().count(), PREVIEW_MAX_LEN + 1);
        assert!(rows[0].preview.ends_with('\u{2026}'));
    }

    #[test]
    fn rows_sorted_by_name() {
        let doc = doc_with_fields(vec![
            ("Zeta", Field::Text { value: "z".to_string() }),
            ("Alpha", Field::Text { value: "a".to_string() }),
        ]);
        let rows = appendix_rows(&doc);
        assert_eq!(rows[0].name, "Alpha");
        assert_eq!(rows[1].name, "Zeta");
    }
}
