//! Lightweight-markup renderer: ignores purely visual attributes, encodes
//! tables in GitHub-flavored Markdown syntax with the first row synthesized
//! as the header.

use crate::appendix::appendix_rows;
use crate::context::RenderContext;
use crate::links::{notes_redirect_url, RenderOptions};
use crate::visitor::{resolve_attachment_path, RenderVisitor};
use dxl_core::error::{DxlError, Result};
use dxl_core::ndoc::{AttachmentMeta, Field, ListType, NDoc, ParAttrs, Run, StyleAttrs, StyleMark, TableColumn, TableRow};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('`', "\\`").replace('\n', "<br>")
}

/// Renders an [`NDoc`] to plain Markdown.
pub struct MarkdownRenderer<'a> {
    ctx: RenderContext,
    attachment_dir: PathBuf,
    options: RenderOptions,
    attachments_by_name: HashMap<&'a str, &'a AttachmentMeta>,
    lines: Vec<String>,
    current_paragraph: Option<String>,
}

impl<'a> MarkdownRenderer<'a> {
    #[must_use]
    pub fn new(doc: &'a NDoc, attachment_dir: impl Into<PathBuf>, options: RenderOptions) -> Self {
        let attachments_by_name = doc.attachments.iter().map(|a| (a.name.as_str(), a)).collect();
        Self {
            ctx: RenderContext::new(),
            attachment_dir: attachment_dir.into(),
            options,
            attachments_by_name,
            lines: Vec::new(),
            current_paragraph: None,
        }
    }

    fn push_inline(&mut self, text: &str) {
        match &mut self.current_paragraph {
            Some(buf) => buf.push_str(text),
            None => self.current_paragraph = Some(text.to_string()),
        }
    }

    fn list_marker(&self, par_style: &ParAttrs) -> Option<String> {
        match &par_style.list {
            Some(ListType::Number) => Some("1.".to_string()),
            Some(ListType::Bullet) => Some("-".to_string()),
            Some(ListType::Uncheck) => Some("- [ ]".to_string()),
            Some(other) => Some(format!("- ({other:?})")),
            None => None,
        }
    }

    fn decorate(&self, marks: &BTreeSet<StyleMark>, attrs: &StyleAttrs, text: &str) -> String {
        for dropped in [&attrs.color, &attrs.bgcolor, &attrs.size, &attrs.font_family] {
            if dropped.is_some() {
                log::debug!("markdown renderer drops visual attribute on text: '{text}'");
            }
        }
        let mut out = text.to_string();
        if marks.contains(&StyleMark::Mono) {
            out = format!("`{out}`");
        }
        if marks.contains(&StyleMark::Bold) {
            out = format!("**{out}**");
        }
        if marks.contains(&StyleMark::Italic) {
            out = format!("_{out}_");
        }
        if marks.contains(&StyleMark::Strike) {
            out = format!("~~{out}~~");
        }
        if marks.contains(&StyleMark::Underline) {
            out = format!("<u>{out}</u>");
        }
        out
    }

    fn link_href(&self, run: &Run) -> String {
        let Run::Link { url, server, replica, unid, .. } = run else {
            return String::new();
        };
        if let Some(url) = url {
            return url.clone();
        }
        let raw = format!(
            "notes:///{}/{}/0/{}?OpenDocument",
            server.as_deref().unwrap_or_default(),
            replica.as_deref().unwrap_or_default(),
            unid.as_deref().unwrap_or_default()
        );
        match &self.options.notes_redirect_base {
            Some(base) => notes_redirect_url(base, &raw),
            None => raw,
        }
    }

    fn render_table_lines(&mut self, rows: &[TableRow], _columns: &[TableColumn]) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let mut header_written = false;
        for row in rows {
            let mut cell_texts = Vec::new();
            for cell in &row.cells {
                let text = self.render_cell_plain(&cell.runs)?;
                cell_texts.push(escape_cell(&text));
            }
            if cell_texts.is_empty() {
                continue;
            }
            out.push(format!("| {} |", cell_texts.join(" | ")));
            if !header_written {
                out.push(format!("| {} |", vec!["---"; cell_texts.len()].join(" | ")));
                header_written = true;
            }
        }
        Ok(out)
    }

    fn render_cell_plain(&mut self, runs: &[Run]) -> Result<String> {
        let saved_lines = std::mem::take(&mut self.lines);
        let saved_paragraph = self.current_paragraph.take();
        let result = self.process_runs(runs);
        self.finalize_paragraph()?;
        let rendered = std::mem::replace(&mut self.lines, saved_lines).join(" ");
        self.current_paragraph = saved_paragraph;
        result?;
        Ok(rendered)
    }
}

impl<'a> RenderVisitor for MarkdownRenderer<'a> {
    type Output = String;

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
        self.lines.push(format!("# {subject}"));
        self.lines.push(format!("*UNID: {}*", doc.meta.unid));
        self.lines.push("---".to_string());
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
        self.lines.push(String::new());
        self.lines.push("## Appendix".to_string());
        self.lines.push("| Name | Type | Preview |".to_string());
        self.lines.push("| --- | --- | --- |".to_string());
        for row in rows {
            self.lines.push(format!(
                "| {} | {} | {} |",
                escape_cell(&row.name),
                escape_cell(row.field_type),
                escape_cell(&row.preview)
            ));
        }
        Ok(())
    }

    fn start_paragraph(&mut self, _par_style: &ParAttrs) -> Result<()> {
        self.current_paragraph = Some(String::new());
        Ok(())
    }

    fn finalize_paragraph(&mut self) -> Result<()> {
        let Some(content) = self.current_paragraph.take() else {
            return Ok(());
        };
        if content.trim().is_empty() {
            return Ok(());
        }
        let line = match self.list_marker(&self.ctx.current_par_style.clone()) {
            Some(marker) => format!("{marker} {content}"),
            None => content,
        };
        self.lines.push(line);
        Ok(())
    }

    fn ensure_paragraph_started(&mut self) -> Result<()> {
        if self.current_paragraph.is_none() {
            self.current_paragraph = Some(String::new());
        }
        Ok(())
    }

    fn handle_text(&mut self, text: &str, marks: &BTreeSet<StyleMark>, attrs: &StyleAttrs) -> Result<()> {
        let decorated = self.decorate(marks, attrs, text);
        self.push_inline(&decorated);
        Ok(())
    }

    fn handle_link(&mut self, run: &Run) -> Result<()> {
        let Run::Link { text, .. } = run else {
            return Ok(());
        };
        let href = self.link_href(run);
        self.push_inline(&format!("[{text}]({href})"));
        Ok(())
    }

    fn handle_img(&mut self, alt: &str, src: Option<&str>) -> Result<()> {
        match src.and_then(|s| resolve_attachment_path(&self.attachment_dir, Some(s)).map(|_| s)) {
            Some(path) => self.push_inline(&format!("![{alt}]({path})")),
            None => {
                log::warn!("skipping image with unresolved src for alt '{alt}'");
                self.push_inline(&format!("*[missing image: {alt}]*"));
            }
        }
        Ok(())
    }

    fn handle_table(&mut self, rows: &[TableRow], columns: &[TableColumn], _attributes: Option<&BTreeMap<String, String>>) -> Result<()> {
        let table_lines = self.render_table_lines(rows, columns)?;
        self.lines.push(String::new());
        self.lines.extend(table_lines);
        self.lines.push(String::new());
        Ok(())
    }

    fn handle_section(&mut self, title_runs: &[Run], body_runs: &[Run], _attributes: Option<&BTreeMap<String, String>>) -> Result<()> {
        let title = self.render_cell_plain(title_runs)?;
        self.lines.push(format!("<details><summary>{title}</summary>"));
        self.process_runs(body_runs)?;
        self.lines.push("</details>".to_string());
        Ok(())
    }

    fn handle_attachmentref(&mut self, name: &str, displayname: Option<&str>, content_path: Option<&str>) -> Result<()> {
        let label = displayname.unwrap_or(name);
        let _ = self.attachments_by_name.get(name);
        match content_path.and_then(|p| resolve_attachment_path(&self.attachment_dir, Some(p)).map(|_| p)) {
            Some(path) => self.lines.push(format!("[{label}]({path})")),
            None => {
                log::warn!("skipping attachment link for unresolved '{name}'");
                self.lines.push(format!("*[missing attachment: {label}]*"));
            }
        }
        Ok(())
    }

    fn handle_hr(&mut self, _attrs: Option<&BTreeMap<String, String>>) -> Result<()> {
        self.lines.push("---".to_string());
        Ok(())
    }

    fn handle_br(&mut self) -> Result<()> {
        self.push_inline("  \n");
        Ok(())
    }

    fn get_output(&mut self) -> Self::Output {
        self.lines.join("\n")
    }

    fn get_output_on_error(&mut self, err: &DxlError) -> Self::Output {
        log::error!("Markdown render failed: {err}");
        format!("{}\n\n> **render error:** {err}\n", self.lines.join("\n"))
    }
}
