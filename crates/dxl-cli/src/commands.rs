//! Directory-batch operations backing the `normalize`/`extract`/`render`
//! subcommands: each walks a flat directory of files and drives exactly one
//! phase, independent of the full per-document orchestrator in
//! `dxl_pipeline` (which the `run-single-db`/`run-manifest` subcommands use
//! instead). Grounded on `docling-cli`'s `batch_command`, the one place in
//! the lineage that fans a directory of inputs out with `rayon`.
//!
//! `extract`'s `--attach-dir` is expected to be `<json-dir>/attachments`: the
//! extracted `content_path`/`icon_path` values are always written as
//! `attachments/<name>` (see `dxl_extract::extractor`), so `render` (which
//! has no `--attach-dir` flag of its own) resolves them relative to each
//! JSON file's own directory.

use anyhow::{Context, Result};
use dxl_core::ndoc::Field;
use dxl_extract::IconPathMode;
use dxl_pipeline::OutputFormat;
use dxl_render::{DocxRenderer, HtmlRenderer, MarkdownRenderer, PdfRenderer, RenderOptions, RenderVisitor};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

fn list_files_with_ext(dir: &Path, ext: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    collect_files_with_ext(dir, ext, recursive, &mut out)?;
    out.sort();
    Ok(out)
}

fn collect_files_with_ext(dir: &Path, ext: &str, recursive: bool, out: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if recursive {
                collect_files_with_ext(&path, ext, recursive, out)?;
            }
        } else if path.extension().is_some_and(|e| e.eq_ignore_ascii_case(ext)) {
            out.push(path);
        }
    }
    Ok(())
}

/// Strips a trailing `.normalized` segment from a JSON file's stem, per §6's
/// "output filename derives from the JSON stem with any `.normalized`
/// segment removed".
fn output_stem(json_path: &Path) -> String {
    let stem = json_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    stem.strip_suffix(".normalized").map(str::to_string).unwrap_or(stem)
}

/// Parses DXL files under `dxl_dir` into normalized JSON IR under `json_dir`.
///
/// # Errors
/// Returns an error if `dxl_dir` can't be listed or `json_dir` can't be created.
pub fn normalize_directory(dxl_dir: &Path, json_dir: &Path, db_title: &str) -> Result<()> {
    std::fs::create_dir_all(json_dir).with_context(|| format!("creating {}", json_dir.display()))?;
    let files = list_files_with_ext(dxl_dir, "xml", false)?;
    log::info!("normalizing {} DXL files from {}", files.len(), dxl_dir.display());

    for path in files {
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("could not read {}: {e}", path.display());
                continue;
            }
        };
        let dxl_text = String::from_utf8(raw).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
        let doc = dxl_parser::parse_dxl_document_from_string(&dxl_text, db_title, dxl_parser::DEFAULT_RICHTEXT_ITEM_NAME);
        let out_path = json_dir.join(format!("{stem}.normalized.json"));
        if let Err(e) = dxl_core::json::write_to_file(&doc, &out_path) {
            log::error!("could not write {}: {e}", out_path.display());
        }
    }
    Ok(())
}

/// Extracts attachment payloads for every normalized JSON file under
/// `json_dir` with a matching `<stem>.xml` under `dxl_dir` (where `<stem>`
/// has any `.normalized` segment stripped), writing files under `attach_dir`
/// and updating each JSON file in place.
///
/// # Errors
/// Returns an error if `json_dir` can't be listed or `attach_dir` can't be created.
pub fn extract_directory(dxl_dir: &Path, json_dir: &Path, attach_dir: &Path, shared_icons_dir: Option<&Path>, icon_path_mode: IconPathMode) -> Result<()> {
    std::fs::create_dir_all(attach_dir).with_context(|| format!("creating {}", attach_dir.display()))?;
    let files = list_files_with_ext(json_dir, "json", false)?;
    log::info!("extracting attachments for {} documents from {}", files.len(), json_dir.display());
    let icon_root_dir = shared_icons_dir.map(Path::to_path_buf).unwrap_or_else(|| attach_dir.join("icons"));

    for json_path in files {
        let stem = output_stem(&json_path);
        let dxl_path = dxl_dir.join(format!("{stem}.xml"));
        let mut doc = match dxl_core::json::read_from_file(&json_path) {
            Ok(doc) => doc,
            Err(e) => {
                log::error!("could not read {}: {e}", json_path.display());
                continue;
            }
        };
        let raw = match std::fs::read(&dxl_path) {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("could not read matching DXL {}: {e}", dxl_path.display());
                continue;
            }
        };
        let dxl_text = String::from_utf8(raw).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
        let sanitized = dxl_parser::xml_util::sanitize_dxl_text(&dxl_text);
        let xml_doc = match roxmltree::Document::parse(&sanitized) {
            Ok(d) => d,
            Err(e) => {
                log::error!("could not re-parse {}: {e}", dxl_path.display());
                continue;
            }
        };

        let displayname_map = dxl_extract::collect_displayname_map(&doc.fields);
        dxl_extract::extract_all(xml_doc.root_element(), &mut doc.attachments, &displayname_map, attach_dir, &icon_root_dir, icon_path_mode);
        if let Some(Field::RichText { runs, .. }) = doc.fields.get_mut(dxl_parser::DEFAULT_RICHTEXT_ITEM_NAME) {
            dxl_extract::update_runs_paths(runs, &doc.attachments, &displayname_map);
        }
        if let Err(e) = dxl_core::json::write_to_file(&doc, &json_path) {
            log::error!("could not write {}: {e}", json_path.display());
        }
    }
    Ok(())
}

fn render_one(json_path: &Path, out: Option<&Path>, inplace: bool, stem: &str, formats: &[OutputFormat], render_options: &RenderOptions, cjk_font_path: Option<&Path>) {
    let doc = match dxl_core::json::read_from_file(json_path) {
        Ok(doc) => doc,
        Err(e) => {
            log::error!("could not read {}: {e}", json_path.display());
            return;
        }
    };
    let attachment_dir = json_path.parent().unwrap_or_else(|| Path::new("."));
    let dest_dir = if inplace { attachment_dir.to_path_buf() } else { out.expect("out or inplace required").to_path_buf() };
    if !inplace {
        if let Err(e) = std::fs::create_dir_all(&dest_dir) {
            log::error!("could not create {}: {e}", dest_dir.display());
            return;
        }
    }

    for format in formats {
        let render_path = dest_dir.join(format!("{stem}.{}", format.extension()));
        let write_result = match format {
            OutputFormat::Html => {
                let mut renderer = HtmlRenderer::new(&doc, attachment_dir, render_options.clone());
                std::fs::write(&render_path, renderer.render(&doc))
            }
            OutputFormat::Markdown => {
                let mut renderer = MarkdownRenderer::new(&doc, attachment_dir, render_options.clone());
                std::fs::write(&render_path, renderer.render(&doc))
            }
            OutputFormat::Docx => {
                let cjk_font = cjk_font_path.map(|p| p.to_string_lossy().into_owned());
                let mut renderer = DocxRenderer::new(&doc, attachment_dir, cjk_font);
                std::fs::write(&render_path, renderer.render(&doc))
            }
            OutputFormat::Pdf => match PdfRenderer::new(&doc, attachment_dir, cjk_font_path.map(Path::to_path_buf)) {
                Ok(mut renderer) => std::fs::write(&render_path, renderer.render(&doc)),
                Err(e) => {
                    log::error!("could not construct PDF renderer for {}: {e}", json_path.display());
                    continue;
                }
            },
        };
        if let Err(e) = write_result {
            log::warn!("failed to write {}: {e}", render_path.display());
        }
    }
}

/// Renders every normalized JSON file under `json_dir` (optionally walked
/// recursively) to each format in `formats`, fanned out across a `rayon`
/// thread pool since each document's render is independent once its IR is
/// on disk (§5).
///
/// # Errors
/// Returns an error if `json_dir` can't be listed, or if `out` is set but
/// can't be created.
pub fn render_directory(json_dir: &Path, out: Option<&Path>, inplace: bool, recursive: bool, formats: &[OutputFormat], render_options: &RenderOptions, cjk_font_path: Option<&Path>) -> Result<()> {
    let files = list_files_with_ext(json_dir, "json", recursive)?;
    log::info!("rendering {} documents from {} to {:?}", files.len(), json_dir.display(), formats);

    files.par_iter().for_each(|json_path| {
        let stem = output_stem(json_path);
        render_one(json_path, out, inplace, &stem, formats, render_options, cjk_font_path);
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_stem_strips_normalized_segment() {
        assert_eq!(output_stem(Path::new("Doc_20240102_Title.normalized.json")), "Doc_20240102_Title");
        assert_eq!(output_stem(Path::new("plain.json")), "plain");
    }

    #[test]
    fn normalize_directory_on_empty_dir_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let dxl_dir = dir.path().join("dxl");
        let json_dir = dir.path().join("json");
        let result = normalize_directory(&dxl_dir, &json_dir, "TestDb");
        assert!(result.is_ok());
        assert!(json_dir.exists());
    }

    #[test]
    fn normalize_directory_writes_one_json_per_xml_file() {
        let dir = tempfile::tempdir().unwrap();
        let dxl_dir = dir.path().join("dxl");
        std::fs::create_dir_all(&dxl_dir).unwrap();
        std::fs::write(dxl_dir.join("doc1.xml"), "<document unid=\"ABC123\" form=\"Memo\"></document>").unwrap();
        let json_dir = dir.path().join("json");

        normalize_directory(&dxl_dir, &json_dir, "TestDb").unwrap();

        let out_path = json_dir.join("doc1.normalized.json");
        assert!(out_path.exists());
    }

    #[test]
    fn render_directory_on_empty_dir_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let json_dir = dir.path().join("json");
        let result = render_directory(&json_dir, None, true, false, &[OutputFormat::Html], &RenderOptions::default(), None);
        assert!(result.is_ok());
    }
}
