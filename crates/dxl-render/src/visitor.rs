//! The Visitor base every format renderer implements: a default-provided
//! `render()`/`process_runs()` driver dispatching to per-format hooks.

use crate::context::RenderContext;
use dxl_core::error::{DxlError, Result};
use dxl_core::ndoc::{NDoc, ParAttrs, Run, StyleAttrs, StyleMark, TableColumn, TableRow};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Name of the richtext item treated as the document body, mirroring
/// `dxl_parser::DEFAULT_RICHTEXT_ITEM_NAME`.
pub const BODY_FIELD_NAME: &str = "Body";

fn body_runs(doc: &NDoc) -> &[Run] {
    match doc.fields.get(BODY_FIELD_NAME) {
        Some(dxl_core::ndoc::Field::RichText { runs, .. }) => runs,
        _ => &[],
    }
}

/// Visitor pattern over a document's body run stream. Each concrete
/// renderer implements the hooks below; `render()`/`process_runs()` are
/// provided and should not need overriding.
pub trait RenderVisitor {
    type Output;

    fn context(&mut self) -> &mut RenderContext;
    /// Directory `content_path`/`icon_path` values are relative to; used by
    /// [`resolve_attachment_path`].
    fn attachment_dir(&self) -> &Path;

    fn render_header(&mut self, doc: &NDoc) -> Result<()>;
    fn render_footer(&mut self, doc: &NDoc) -> Result<()>;
    fn render_appendix(&mut self, doc: &NDoc) -> Result<()>;

    fn start_paragraph(&mut self, par_style: &ParAttrs) -> Result<()>;
    fn finalize_paragraph(&mut self) -> Result<()>;
    fn ensure_paragraph_started(&mut self) -> Result<()>;

    fn handle_text(&mut self, text: &str, marks: &BTreeSet<StyleMark>, attrs: &StyleAttrs) -> Result<()>;
    fn handle_link(&mut self, run: &Run) -> Result<()>;
    fn handle_img(&mut self, alt: &str, src: Option<&str>) -> Result<()>;
    fn handle_table(
        &mut self,
        rows: &[TableRow],
        columns: &[TableColumn],
        attributes: Option<&std::collections::BTreeMap<String, String>>,
    ) -> Result<()>;
    fn handle_section(
        &mut self,
        title_runs: &[Run],
        body_runs: &[Run],
        attributes: Option<&std::collections::BTreeMap<String, String>>,
    ) -> Result<()>;
    fn handle_attachmentref(&mut self, name: &str, displayname: Option<&str>, content_path: Option<&str>) -> Result<()>;
    fn handle_hr(&mut self, attrs: Option<&std::collections::BTreeMap<String, String>>) -> Result<()>;
    fn handle_br(&mut self) -> Result<()>;

    fn get_output(&mut self) -> Self::Output;
    /// Fallback when any hook above returns an error: logs and returns
    /// whatever partial output has accumulated so far.
    fn get_output_on_error(&mut self, err: &DxlError) -> Self::Output {
        log::error!("render failed, returning partial output: {err}");
        self.get_output()
    }

    /// Entry point: header, body runs, footer, appendix, then the final
    /// output — best-effort on error rather than propagating.
    fn render(&mut self, doc: &NDoc) -> Self::Output {
        match self.try_render(doc) {
            Ok(()) => self.get_output(),
            Err(e) => self.get_output_on_error(&e),
        }
    }

    fn try_render(&mut self, doc: &NDoc) -> Result<()> {
        self.render_header(doc)?;
        self.process_runs(body_runs(doc))?;
        self.render_footer(doc)?;
        self.render_appendix(doc)?;
        Ok(())
    }

    /// Walks a run stream, dispatching `par` to paragraph start/finalize,
    /// table/hr/section/attachmentref as block-level (finalize first, reset
    /// list state), and text/link/img/br as inline (ensure a paragraph is
    /// open first). `Run` is a closed enum, so unlike a dynamically-typed
    /// token stream there is no "unknown token" fallback to dispatch.
    fn process_runs(&mut self, runs: &[Run]) -> Result<()> {
        if runs.is_empty() {
            self.ensure_paragraph_started()?;
            self.finalize_paragraph()?;
            return Ok(());
        }

        for run in runs {
            match run {
                Run::Par { attrs } => {
                    self.finalize_paragraph()?;
                    self.context().update_par_style(attrs.clone());
                    self.start_paragraph(attrs)?;
                }
                Run::Table { rows, attributes, columns } => {
                    self.finalize_paragraph()?;
                    self.handle_table(rows, columns, attributes.as_ref())?;
                    self.context().update_par_style(ParAttrs::default());
                }
                Run::Section { title_runs, body_runs, attributes } => {
                    self.finalize_paragraph()?;
                    self.handle_section(title_runs, body_runs, attributes.as_ref())?;
                    self.context().update_par_style(ParAttrs::default());
                }
                Run::Hr { a } => {
                    self.finalize_paragraph()?;
                    self.handle_hr(a.as_ref())?;
                    self.context().update_par_style(ParAttrs::default());
                }
                Run::AttachmentRef { name, displayname, content_path } => {
                    self.finalize_paragraph()?;
                    self.handle_attachmentref(name, displayname.as_deref(), content_path.as_deref())?;
                    self.context().update_par_style(ParAttrs::default());
                }
                Run::Text { text, s, a } => {
                    self.ensure_paragraph_started()?;
                    self.handle_text(text, s, a)?;
                }
                Run::Link { .. } => {
                    self.ensure_paragraph_started()?;
                    self.handle_link(run)?;
                }
                Run::Img { alt, src } => {
                    self.ensure_paragraph_started()?;
                    self.handle_img(alt, src.as_deref())?;
                }
                Run::Br => {
                    self.ensure_paragraph_started()?;
                    self.handle_br()?;
                }
            }
        }

        self.finalize_paragraph()
    }
}

/// Resolves a `content_path`/`icon_path` relative to `attachment_dir`,
/// denying (returning `None`, after logging) any result that would escape
/// that directory once canonicalized.
#[must_use]
pub fn resolve_attachment_path(attachment_dir: &Path, content_path: Option<&str>) -> Option<PathBuf> {
    let content_path = content_path?;
    if content_path.is_empty() {
        log::warn!("resolve_attachment_path called with empty content_path");
        return None;
    }

    let candidate = Path::new(content_path);
    let joined = if candidate.is_absolute() {
        log::warn!("content_path '{content_path}' is absolute, using it directly");
        candidate.to_path_buf()
    } else {
        attachment_dir.join(candidate)
    };

    let resolved_dir = match attachment_dir.canonicalize() {
        Ok(dir) => dir,
        Err(e) => {
            log::error!("attachment_dir '{}' does not exist: {e}", attachment_dir.display());
            return None;
        }
    };

    let resolved = match joined.canonicalize() {
        Ok(p) => p,
        Err(_) => {
            // File may not exist yet (e.g. icon about to be written); fall
            // back to lexical normalization relative to the resolved dir.
            resolved_dir.join(candidate)
        }
    };

    if !resolved.starts_with(&resolved_dir) {
        log::warn!(
            "resolved path '{}' is outside attachment directory '{}', denying",
            resolved.display(),
            resolved_dir.display()
        );
        return None;
    }

    Some(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn resolves_plain_relative_path() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("report.pdf"), b"x").unwrap();
        let resolved = resolve_attachment_path(dir.path(), Some("report.pdf")).unwrap();
        assert_eq!(resolved, dir.path().canonicalize().unwrap().join("report.pdf"));
    }

    #[test]
    fn denies_path_traversal_escape() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let attachment_dir = dir.path().join("sub");
        let resolved = resolve_attachment_path(&attachment_dir, Some("../../etc/passwd"));
        assert!(resolved.is_none());
    }

    #[test]
    fn empty_content_path_returns_none() {
        let dir = tempdir().unwrap();
        assert!(resolve_attachment_path(dir.path(), Some("")).is_none());
    }

    #[test]
    fn none_content_path_returns_none() {
        let dir = tempdir().unwrap();
        assert!(resolve_attachment_path(dir.path(), None).is_none());
    }
}
