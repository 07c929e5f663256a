//! Per-document pipeline: `PARSE -> COMPOSE_PATH -> WRITE_INITIAL_IR ->
//! EXTRACT -> WRITE_FINAL_IR -> RENDER(per format)`, grounded on
//! `pipelines/flows.py::process_one`. Any phase failure is logged, recorded
//! as a `*.FAILED_<phase>.json` artifact carrying the best-available IR, and
//! returned as an error for the caller (manifest runner / CLI) to journal —
//! it never panics and never aborts a whole run over one bad document.

use crate::paths::resolve_doc_dir;
use anyhow::{Context, Result};
use dxl_core::hash::sanitize_filename;
use dxl_core::ndoc::{Field, NDoc};
use dxl_extract::IconPathMode;
use dxl_render::{DocxRenderer, HtmlRenderer, MarkdownRenderer, PdfRenderer, RenderOptions, RenderVisitor};
use std::path::{Path, PathBuf};

/// Longest filename segment before truncation, matching `dxl-pipeline::paths`.
const SEGMENT_MAX_LEN: usize = 120;

/// One of the four renderable output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Html,
    Markdown,
    Docx,
    Pdf,
}

impl OutputFormat {
    /// Parses a CLI-facing format name (`html`, `md`, `docx`, `pdf`).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "html" => Some(Self::Html),
            "md" | "markdown" => Some(Self::Markdown),
            "docx" => Some(Self::Docx),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Markdown => "md",
            Self::Docx => "docx",
            Self::Pdf => "pdf",
        }
    }
}

/// Process-wide configuration the orchestrator needs, resolved once by the
/// CLI's `Config` and threaded down (kept separate from `dxl_cli::config`
/// to avoid a reverse dependency, same rationale as `dxl_render::RenderOptions`).
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub icon_path_mode: IconPathMode,
    /// If set, icons are written here instead of `<attachment_dir>/icons`.
    pub shared_icons_dir: Option<PathBuf>,
    pub render_options: RenderOptions,
    pub cjk_font_path: Option<PathBuf>,
    pub formats: Vec<OutputFormat>,
}

fn plain_text_of(field: &Field) -> Option<String> {
    match field {
        Field::Text { value } => Some(value.clone()),
        Field::TextList { value } => Some(value.join("; ")),
        Field::RichText { text, .. } => Some(text.clone()),
        _ => None,
    }
}

fn categories_of(doc: &NDoc) -> Vec<String> {
    match doc.fields.get("Categories") {
        Some(Field::TextList { value }) => value.clone(),
        Some(Field::Text { value }) => value.split(';').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

fn date_yyyymmdd(created: Option<&str>) -> String {
    let Some(created) = created else {
        return "NODATE".to_string();
    };
    match chrono::DateTime::parse_from_rfc3339(created) {
        Ok(dt) => dt.format("%Y%m%d").to_string(),
        Err(e) => {
            log::warn!("invalid created timestamp '{created}': {e}");
            "INVALIDDATE".to_string()
        }
    }
}

fn write_failed_artifact(doc: &NDoc, doc_dir: &Path, stem: &str, phase: &str, message: &str) {
    let mut failed = doc.clone();
    failed.meta.pipeline_error = Some(format!("{phase} FAILED: {message}"));
    let path = doc_dir.join(format!("{stem}.normalized.FAILED_{phase}.json"));
    if let Err(e) = dxl_core::json::write_to_file(&failed, &path) {
        log::error!("could not even write failure artifact {}: {e}", path.display());
    } else {
        log::info!("wrote failure artifact: {}", path.display());
    }
}

/// Runs the full pipeline for a single DXL file, returning the document's
/// output directory on success.
///
/// # Errors
/// Returns an error if any phase fails; a best-effort `*.FAILED_<phase>.json`
/// is written alongside (once a document directory exists) before the error
/// is returned.
pub fn process_document(dxl_path: &Path, out_base: &Path, db_title: &str, options: &PipelineOptions) -> Result<PathBuf> {
    log::info!("starting pipeline for {}", dxl_path.display());

    // Phase PARSE.
    let raw = std::fs::read(dxl_path).with_context(|| format!("reading {}", dxl_path.display()))?;
    let dxl_text = String::from_utf8(raw).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
    let mut doc = dxl_parser::parse_dxl_document_from_string(&dxl_text, db_title, dxl_parser::DEFAULT_RICHTEXT_ITEM_NAME);
    if doc.meta.unid.is_empty() {
        anyhow::bail!("parsed document for {} is missing a UNID", dxl_path.display());
    }
    if let Some(err) = &doc.meta.error {
        log::warn!("PARSE produced a minimal IR for {}: {err}", dxl_path.display());
    }
    log::info!("PARSE complete for UNID {}", doc.meta.unid);

    // Phase COMPOSE_PATH.
    let title = doc.fields.get("Subject").and_then(plain_text_of).filter(|s| !s.trim().is_empty()).unwrap_or_else(|| format!("NoTitle_{}", doc.meta.unid));
    let form = if doc.meta.form.is_empty() { "NoForm".to_string() } else { doc.meta.form.clone() };
    let categories = categories_of(&doc);
    let date = date_yyyymmdd(doc.meta.created.as_deref());
    let doc_dir = resolve_doc_dir(out_base, db_title, &form, &categories, &date, &title);
    let attachment_dir = doc_dir.join("attachments");
    let title_safe = sanitize_filename(&title, SEGMENT_MAX_LEN);
    let stem = format!("Doc_{date}_{title_safe}");
    let json_path = doc_dir.join(format!("{stem}.normalized.json"));

    if let Err(e) = std::fs::create_dir_all(&doc_dir) {
        anyhow::bail!("COMPOSE_PATH failed to create {}: {e}", doc_dir.display());
    }
    log::info!("COMPOSE_PATH complete: {}", doc_dir.display());

    // Phase WRITE_INITIAL_IR.
    if let Err(e) = dxl_core::json::write_to_file(&doc, &json_path) {
        write_failed_artifact(&doc, &doc_dir, &stem, "WRITE_INITIAL_IR", &e.to_string());
        return Err(e).with_context(|| format!("WRITE_INITIAL_IR failed for {}", doc.meta.unid));
    }
    log::info!("WRITE_INITIAL_IR complete: {}", json_path.display());

    // Phase EXTRACT.
    let sanitized = dxl_parser::xml_util::sanitize_dxl_text(&dxl_text);
    let xml_doc = match roxmltree::Document::parse(&sanitized) {
        Ok(d) => d,
        Err(e) => {
            write_failed_artifact(&doc, &doc_dir, &stem, "EXTRACT", &e.to_string());
            anyhow::bail!("EXTRACT failed to re-parse DXL for {}: {e}", doc.meta.unid);
        }
    };
    let icon_root_dir = options.shared_icons_dir.clone().unwrap_or_else(|| attachment_dir.join("icons"));
    let displayname_map = dxl_extract::collect_displayname_map(&doc.fields);
    dxl_extract::extract_all(xml_doc.root_element(), &mut doc.attachments, &displayname_map, &attachment_dir, &icon_root_dir, options.icon_path_mode);
    if doc.attachments.iter().any(|a| a.extraction_error.is_some()) {
        log::warn!("one or more attachments failed extraction for {}", doc.meta.unid);
    }
    if let Some(Field::RichText { runs, .. }) = doc.fields.get_mut(dxl_parser::DEFAULT_RICHTEXT_ITEM_NAME) {
        dxl_extract::update_runs_paths(runs, &doc.attachments, &displayname_map);
    }
    log::info!("EXTRACT complete for {}", doc.meta.unid);

    // Phase WRITE_FINAL_IR.
    if let Err(e) = dxl_core::json::write_to_file(&doc, &json_path) {
        write_failed_artifact(&doc, &doc_dir, &stem, "WRITE_FINAL_IR", &e.to_string());
        return Err(e).with_context(|| format!("WRITE_FINAL_IR failed for {}", doc.meta.unid));
    }
    log::info!("WRITE_FINAL_IR complete: {}", json_path.display());

    // Phase RENDER (best-effort per format; a renderer's own internal errors
    // are already handled by `try_render`/`get_output_on_error`).
    // Renderers resolve `content_path`/`icon_path` (both recorded as
    // "attachments/...") relative to the document directory, not the
    // attachments directory itself.
    for format in &options.formats {
        let render_path = doc_dir.join(format!("{stem}.{}", format.extension()));
        let write_result = match format {
            OutputFormat::Html => {
                let mut renderer = HtmlRenderer::new(&doc, &doc_dir, options.render_options.clone());
                std::fs::write(&render_path, renderer.render(&doc))
            }
            OutputFormat::Markdown => {
                let mut renderer = MarkdownRenderer::new(&doc, &doc_dir, options.render_options.clone());
                std::fs::write(&render_path, renderer.render(&doc))
            }
            OutputFormat::Docx => {
                let cjk_font = options.cjk_font_path.as_ref().map(|p| p.to_string_lossy().into_owned());
                let mut renderer = DocxRenderer::new(&doc, &doc_dir, cjk_font);
                std::fs::write(&render_path, renderer.render(&doc))
            }
            OutputFormat::Pdf => match PdfRenderer::new(&doc, &doc_dir, options.cjk_font_path.clone()) {
                Ok(mut renderer) => std::fs::write(&render_path, renderer.render(&doc)),
                Err(e) => {
                    log::error!("could not construct PDF renderer for {}: {e}", doc.meta.unid);
                    continue;
                }
            },
        };
        match write_result {
            Ok(()) => log::info!("RENDER[{}] complete: {}", format.extension(), render_path.display()),
            Err(e) => log::warn!("RENDER[{}] failed to write {}: {e}", format.extension(), render_path.display()),
        }
    }
    log::info!("RENDER complete for {}", doc.meta.unid);

    Ok(doc_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_format_names() {
        assert_eq!(OutputFormat::parse("html"), Some(OutputFormat::Html));
        assert_eq!(OutputFormat::parse("MD"), Some(OutputFormat::Markdown));
        assert_eq!(OutputFormat::parse("docx"), Some(OutputFormat::Docx));
        assert_eq!(OutputFormat::parse("pdf"), Some(OutputFormat::Pdf));
        assert_eq!(OutputFormat::parse("xyz"), None);
    }

    #[test]
    fn date_yyyymmdd_handles_missing_and_invalid() {
        assert_eq!(date_yyyymmdd(None), "NODATE");
        assert_eq!(date_yyyymmdd(Some("not-a-date")), "INVALIDDATE");
        assert_eq!(date_yyyymmdd(Some("2024-01-02T03:04:05+00:00")), "20240102");
    }

    #[test]
    fn plain_text_of_joins_text_lists() {
        let field = Field::TextList { value: vec!["A".to_string(), "B".to_string()] };
        assert_eq!(plain_text_of(&field), Some("A; B".to_string()));
    }

    #[test]
    fn process_document_rejects_missing_unid() {
        let dir = tempfile::tempdir().unwrap();
        let dxl_path = dir.path().join("doc.xml");
        std::fs::write(&dxl_path, "<document form=\"Memo\"></document>").unwrap();
        let options = PipelineOptions {
            icon_path_mode: IconPathMode::Local,
            shared_icons_dir: None,
            render_options: RenderOptions::default(),
            cjk_font_path: None,
            formats: vec![OutputFormat::Html],
        };
        let result = process_document(&dxl_path, dir.path(), "TestDb", &options);
        assert!(result.is_err());
    }
}
