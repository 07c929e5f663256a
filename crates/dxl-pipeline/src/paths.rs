//! Output directory composition: `<out_base>/<db>/<form>/<up to 2
//! categories>/Doc_<date>_<title>/`, plus detection of a pre-existing
//! slash-split legacy layout.

use dxl_core::hash::sanitize_filename;
use std::path::{Path, PathBuf};

/// Matches the lineage's `_ensure_safe_name` truncation length for path
/// segments (longer than an attachment filename's 200-char budget, since
/// segments compose into a full path).
const SEGMENT_MAX_LEN: usize = 120;

fn segment(name: &str) -> String {
    if name.trim().is_empty() {
        return "NoName".to_string();
    }
    sanitize_filename(name, SEGMENT_MAX_LEN)
}

/// Composes the standard (non-legacy) output directory for a document.
#[must_use]
pub fn compose_doc_dir(out_base: &Path, db_title: &str, form: &str, categories: &[String], date_yyyymmdd: &str, title: &str) -> PathBuf {
    let mut p = out_base.join(segment(db_title)).join(segment(if form.is_empty() { "NoForm" } else { form }));
    for cat in categories.iter().take(2) {
        p = p.join(segment(cat));
    }
    p.join(format!("Doc_{date_yyyymmdd}_{}", segment(if title.is_empty() { "NoTitle" } else { title })))
}

/// Reproduces the legacy layout from when a `/`-containing title was treated
/// as nested subfolders, to *detect* (not create) an existing legacy
/// directory.
#[must_use]
pub fn compose_doc_dir_legacy_slashsplit(out_base: &Path, db_title: &str, form: &str, categories: &[String], date_yyyymmdd: &str, title: &str) -> PathBuf {
    let mut p = out_base.join(segment(db_title)).join(segment(if form.is_empty() { "NoForm" } else { form }));
    for cat in categories.iter().take(2) {
        p = p.join(segment(cat));
    }
    let title = if title.is_empty() { "NoTitle" } else { title };
    let mut parts = title.split(['/', '\\']).filter(|s| !s.is_empty());
    let head = parts.next().unwrap_or("NoTitle");
    p = p.join(format!("Doc_{date_yyyymmdd}_{}", segment(head)));
    for tail in parts {
        p = p.join(segment(tail));
    }
    p
}

/// Resolves the doc directory to use: the standard path unless an existing
/// legacy slash-split directory is found on disk and the standard one isn't.
#[must_use]
pub fn resolve_doc_dir(out_base: &Path, db_title: &str, form: &str, categories: &[String], date_yyyymmdd: &str, title: &str) -> PathBuf {
    let standard = compose_doc_dir(out_base, db_title, form, categories, date_yyyymmdd, title);
    if standard.exists() {
        return standard;
    }
    let legacy = compose_doc_dir_legacy_slashsplit(out_base, db_title, form, categories, date_yyyymmdd, title);
    if legacy.exists() {
        log::warn!("using pre-existing legacy slash-split directory: {}", legacy.display());
        return legacy;
    }
    standard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_standard_layout_with_up_to_two_categories() {
        let p = compose_doc_dir(Path::new("/out"), "MyDb", "Memo", &["Finance".to_string(), "Q1".to_string(), "Extra".to_string()], "20240102", "Hello");
        assert_eq!(p, Path::new("/out/MyDb/Memo/Finance/Q1/Doc_20240102_Hello"));
    }

    #[test]
    fn blank_title_falls_back_to_notitle() {
        let p = compose_doc_dir(Path::new("/out"), "Db", "Memo", &[], "NODATE", "");
        assert_eq!(p, Path::new("/out/Db/Memo/Doc_NODATE_NoTitle"));
    }

    #[test]
    fn legacy_slashsplit_nests_tail_segments() {
        let p = compose_doc_dir_legacy_slashsplit(Path::new("/out"), "Db", "Memo", &[], "20240102", "A/B/C");
        assert_eq!(p, Path::new("/out/Db/Memo/Doc_20240102_A/B/C"));
    }

    #[test]
    fn resolve_prefers_standard_when_it_exists() {
        let dir = tempfile::tempdir().unwrap();
        let standard = compose_doc_dir(dir.path(), "Db", "Memo", &[], "20240102", "Hello");
        std::fs::create_dir_all(&standard).unwrap();
        let resolved = resolve_doc_dir(dir.path(), "Db", "Memo", &[], "20240102", "Hello");
        assert_eq!(resolved, standard);
    }

    #[test]
    fn resolve_falls_back_to_legacy_when_only_legacy_exists() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = compose_doc_dir_legacy_slashsplit(dir.path(), "Db", "Memo", &[], "20240102", "A/B");
        std::fs::create_dir_all(&legacy).unwrap();
        let resolved = resolve_doc_dir(dir.path(), "Db", "Memo", &[], "20240102", "A/B");
        assert_eq!(resolved, legacy);
    }
}
