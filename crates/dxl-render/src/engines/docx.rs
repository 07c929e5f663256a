//! Word-processor renderer: builds an in-memory `.docx` package with
//! `docx-rs`, embedding images at native resolution and persisting
//! attachment-reference links as external relationships.

use crate::appendix::appendix_rows;
use crate::context::RenderContext;
use crate::visitor::{resolve_attachment_path, RenderVisitor};
use dxl_core::error::{DxlError, Result};
use dxl_core::ndoc::{AttachmentMeta, Field, NDoc, ParAttrs, Run, StyleAttrs, StyleMark, TableColumn, TableRow};
use docx_rs::{AlignmentType, Docx, Hyperlink, HyperlinkType, Paragraph, Pic, RunFonts, Table as DocxTable, TableCell as DocxTableCell, TableRow as DocxTableRow, Run as DocxRun};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Renders an [`NDoc`] to a `.docx` package, returned as bytes.
pub struct DocxRenderer<'a> {
    ctx: RenderContext,
    attachment_dir: PathBuf,
    attachments_by_name: HashMap<&'a str, &'a AttachmentMeta>,
    cjk_font: Option<String>,
    paragraphs: Vec<Paragraph>,
    pending_tables: Vec<DocxTable>,
    current_runs: Option<Vec<DocxRun>>,
}

impl<'a> DocxRenderer<'a> {
    #[must_use]
    pub fn new(doc: &'a NDoc, attachment_dir: impl Into<PathBuf>, cjk_font: Option<String>) -> Self {
        let attachments_by_name = doc.attachments.iter().map(|a| (a.name.as_str(), a)).collect();
        Self {
            ctx: RenderContext::new(),
            attachment_dir: attachment_dir.into(),
            attachments_by_name,
            cjk_font,
            paragraphs: Vec::new(),
            pending_tables: Vec::new(),
            current_runs: None,
        }
    }

    fn styled_run(&self, text: &str, marks: &BTreeSet<StyleMark>, attrs: &StyleAttrs) -> DocxRun {
        let mut run = DocxRun::new().add_text(text);
        if marks.contains(&StyleMark::Bold) {
            run = run.bold();
        }
        if marks.contains(&StyleMark::Italic) {
            run = run.italic();
        }
        if marks.contains(&StyleMark::Underline) {
            run = run.underline("single");
        }
        if marks.contains(&StyleMark::Strike) {
            run = run.strike();
        }
        if let Some(color) = &attrs.color {
            run = run.color(color.trim_start_matches('#'));
        }
        if let Some(size) = &attrs.size {
            if let Ok(points) = size.parse::<usize>() {
                run = run.size(points * 2);
            }
        }
        if let Some(family) = self.cjk_font.as_deref().or(attrs.font_family.as_deref()) {
            run = run.fonts(RunFonts::new().east_asia(family).ascii(family));
        }
        run
    }

    fn push_run(&mut self, run: DocxRun) {
        self.current_runs.get_or_insert_with(Vec::new).push(run);
    }

    fn render_cell(&mut self, runs: &[Run]) -> Result<Vec<Paragraph>> {
        let saved_paragraphs = std::mem::take(&mut self.paragraphs);
        let saved_runs = self.current_runs.take();
        let result = self.process_runs(runs);
        self.finalize_paragraph()?;
        let rendered = std::mem::replace(&mut self.paragraphs, saved_paragraphs);
        self.current_runs = saved_runs;
        result?;
        Ok(rendered)
    }
}

impl<'a> RenderVisitor for DocxRenderer<'a> {
    type Output = Vec<u8>;

    fn context(&mut self) -> &mut RenderContext {
        &mut self.ctx
    }

    fn attachment_dir(&self) -> &Path {
        &self.attachment_dir
    }

    fn render_header(&mut self, doc: &NDoc) -> Result<()> {
        let subject = match doc.fields.get("Subject") {
            Some(Field::Text { value }) => value.clone(),
            _ => doc.meta.form.clone(),
        };
        self.paragraphs
            .push(Paragraph::new().add_run(DocxRun::new().add_text(subject).bold().size(32)));
        self.paragraphs
            .push(Paragraph::new().add_run(DocxRun::new().add_text(format!("UNID: {}", doc.meta.unid)).italic()));
        self.paragraphs.push(Paragraph::new());
        Ok(())
    }

    fn render_footer(&mut self, _doc: &NDoc) -> Result<()> {
        Ok(())
    }

    fn render_appendix(&mut self, doc: &NDoc) -> Result<()> {
        let rows = appendix_rows(doc);
        if rows.is_empty() {
            return Ok(());
        }
        self.paragraphs
            .push(Paragraph::new().add_run(DocxRun::new().add_text("Appendix").bold().size(28)));
        let mut table_rows = vec![DocxTableRow::new(vec![
            DocxTableCell::new().add_paragraph(Paragraph::new().add_run(DocxRun::new().add_text("Name").bold())),
            DocxTableCell::new().add_paragraph(Paragraph::new().add_run(DocxRun::new().add_text("Type").bold())),
            DocxTableCell::new().add_paragraph(Paragraph::new().add_run(DocxRun::new().add_text("Preview").bold())),
        ])];
        for row in rows {
            table_rows.push(DocxTableRow::new(vec![
                DocxTableCell::new().add_paragraph(Paragraph::new().add_run(DocxRun::new().add_text(row.name))),
                DocxTableCell::new().add_paragraph(Paragraph::new().add_run(DocxRun::new().add_text(row.field_type))),
                DocxTableCell::new().add_paragraph(Paragraph::new().add_run(DocxRun::new().add_text(row.preview))),
            ]));
        }
        self.paragraphs.push(Paragraph::new());
        // docx-rs tables live at document level, not inside a paragraph; queue it
        // for `get_output` to interleave after the paragraphs already built.
        self.pending_tables.push(DocxTable::new(table_rows));
        Ok(())
    }

    fn start_paragraph(&mut self, _par_style: &ParAttrs) -> Result<()> {
        self.current_runs = Some(Vec::new());
        Ok(())
    }

    fn finalize_paragraph(&mut self) -> Result<()> {
        let Some(runs) = self.current_runs.take() else {
            return Ok(());
        };
        if runs.is_empty() {
            return Ok(());
        }
        let mut paragraph = Paragraph::new();
        if self.ctx.current_par_style.align == Some(dxl_core::ndoc::Align::Center) {
            paragraph = paragraph.align(AlignmentType::Center);
        } else if self.ctx.current_par_style.align == Some(dxl_core::ndoc::Align::Right) {
            paragraph = paragraph.align(AlignmentType::Right);
        } else if self.ctx.current_par_style.align == Some(dxl_core::ndoc::Align::Justify) {
            paragraph = paragraph.align(AlignmentType::Justified);
        }
        for run in runs {
            paragraph = paragraph.add_run(run);
        }
        self.paragraphs.push(paragraph);
        Ok(())
    }

    fn ensure_paragraph_started(&mut self) -> Result<()> {
        if self.current_runs.is_none() {
            self.current_runs = Some(Vec::new());
        }
        Ok(())
    }

    fn handle_text(&mut self, text: &str, marks: &BTreeSet<StyleMark>, attrs: &StyleAttrs) -> Result<()> {
        let run = self.styled_run(text, marks, attrs);
        self.push_run(run);
        Ok(())
    }

    fn handle_link(&mut self, run: &Run) -> Result<()> {
        let Run::Link { url, text, .. } = run else {
            return Ok(());
        };
        let href = url.clone().unwrap_or_else(|| "#".to_string());
        let hyperlink = Hyperlink::new(href, HyperlinkType::External)
            .add_run(DocxRun::new().add_text(text).underline("single").color("0563C1"));
        self.finalize_paragraph()?;
        self.paragraphs.push(Paragraph::new().add_hyperlink(hyperlink));
        Ok(())
    }

    fn handle_img(&mut self, alt: &str, src: Option<&str>) -> Result<()> {
        let Some(resolved) = src.and_then(|s| resolve_attachment_path(&self.attachment_dir, Some(s))) else {
            log::warn!("skipping image with unresolved src for alt '{alt}'");
            self.push_run(DocxRun::new().add_text(format!("[image: {alt}]")).italic());
            return Ok(());
        };
        match std::fs::read(&resolved) {
            Ok(bytes) => {
                let pic = Pic::new(&bytes);
                self.push_run(DocxRun::new().add_image(pic));
            }
            Err(e) => {
                log::warn!("failed to read image '{}': {e}", resolved.display());
                self.push_run(DocxRun::new().add_text(format!("[image: {alt}]")).italic());
            }
        }
        Ok(())
    }

    fn handle_table(&mut self, rows: &[TableRow], _columns: &[TableColumn], _attributes: Option<&BTreeMap<String, String>>) -> Result<()> {
        let mut table_rows = Vec::new();
        for row in rows {
            let mut cells = Vec::new();
            for cell in &row.cells {
                let paragraphs = self.render_cell(&cell.runs)?;
                let mut docx_cell = DocxTableCell::new();
                for p in paragraphs {
                    docx_cell = docx_cell.add_paragraph(p);
                }
                if let Some(span) = cell.colspan {
                    docx_cell = docx_cell.grid_span(span as usize);
                }
                cells.push(docx_cell);
            }
            table_rows.push(DocxTableRow::new(cells));
        }
        self.pending_tables.push(DocxTable::new(table_rows));
        Ok(())
    }

    fn handle_section(&mut self, title_runs: &[Run], body_runs: &[Run], _attributes: Option<&BTreeMap<String, String>>) -> Result<()> {
        let title_paragraphs = self.render_cell(title_runs)?;
        for p in title_paragraphs {
            self.paragraphs.push(p);
        }
        self.process_runs(body_runs)?;
        Ok(())
    }

    fn handle_attachmentref(&mut self, name: &str, displayname: Option<&str>, content_path: Option<&str>) -> Result<()> {
        let label = displayname.unwrap_or(name).to_string();
        let _ = self.attachments_by_name.get(name);
        self.finalize_paragraph()?;
        match content_path {
            Some(path) => {
                let hyperlink = Hyperlink::new(path, HyperlinkType::External)
                    .add_run(DocxRun::new().add_text(label).underline("single").color("0563C1"));
                self.paragraphs.push(Paragraph::new().add_hyperlink(hyperlink));
            }
            None => {
                log::warn!("attachment '{name}' has no content_path; rendering label only");
                self.paragraphs.push(Paragraph::new().add_run(DocxRun::new().add_text(label).italic()));
            }
        }
        Ok(())
    }

    fn handle_hr(&mut self, _attrs: Option<&BTreeMap<String, String>>) -> Result<()> {
        self.finalize_paragraph()?;
        self.paragraphs
            .push(Paragraph::new().add_run(DocxRun::new().add_text("\u{2014}\u{2014}\u{2014}\u{2014}\u{2014}\u{2014}\u{2014}\u{2014}")));
        Ok(())
    }

    fn handle_br(&mut self) -> Result<()> {
        self.push_run(DocxRun::new().add_break(docx_rs::BreakType::TextWrapping));
        Ok(())
    }

    fn get_output(&mut self) -> Self::Output {
        let mut docx = Docx::new();
        for paragraph in std::mem::take(&mut self.paragraphs) {
            docx = docx.add_paragraph(paragraph);
        }
        for table in std::mem::take(&mut self.pending_tables) {
            docx = docx.add_table(table);
        }
        let mut buffer = Cursor::new(Vec::new());
        match docx.build().pack(&mut buffer) {
            Ok(()) => buffer.into_inner(),
            Err(e) => {
                log::error!("failed to pack docx: {e}");
                Vec::new()
            }
        }
    }

    fn get_output_on_error(&mut self, err: &DxlError) -> Self::Output {
        log::error!("DOCX render failed: {err}");
        self.paragraphs
            .push(Paragraph::new().add_run(DocxRun::new().add_text(format!("Render error: {err}")).italic()));
        self.get_output()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxl_core::ndoc::{Layout, Meta};
    use std::collections::BTreeMap as Map;
    use tempfile::tempdir;

    fn bare_doc(runs: Vec<Run>) -> NDoc {
        let mut fields = Map::new();
        fields.insert("Body".to_string(), Field::RichText { text: String::new(), runs });
        fields.insert("Subject".to_string(), Field::Text { value: "Hello".to_string() });
        NDoc {
            schema_version: "1.5".to_string(),
            meta: Meta {
                db_title: "Db".to_string(),
                unid: "UNID123".to_string(),
                form: "Memo".to_string(),
                created: None,
                modified: None,
                revised: None,
                schema_version: "1.5".to_string(),
                error: None,
                pipeline_error: None,
            },
            fields,
            attachments: Vec::new(),
            links: Default::default(),
            layout: Layout {
                primary_fields_allowlist: BTreeSet::from(["Subject".to_string()]),
                used_in_body: BTreeSet::from(["Body".to_string()]),
            },
        }
    }

    #[test]
    fn produces_non_empty_docx_package() {
        let doc = bare_doc(vec![
            Run::Par { attrs: ParAttrs::default() },
            Run::Text { text: "hi".to_string(), s: BTreeSet::new(), a: StyleAttrs::default() },
        ]);
        let dir = tempdir().unwrap();
        let mut r = DocxRenderer::new(&doc, dir.path(), None);
        let bytes = r.render(&doc);
        assert!(!bytes.is_empty());
        assert_eq!(&bytes[0..2], b"PK");
    }
}
