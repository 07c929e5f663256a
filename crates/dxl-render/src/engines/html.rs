//! Hypertext renderer: a `minijinja` template for the outer document shell,
//! with inline decoration emitted as wrapping elements by the visitor hooks.

use crate::appendix::appendix_rows;
use crate::context::RenderContext;
use crate::links::{notes_redirect_url, RenderOptions};
use crate::visitor::{resolve_attachment_path, RenderVisitor};
use dxl_core::error::{DxlError, Result};
use dxl_core::ndoc::{AttachmentMeta, Field, ListType, NDoc, ParAttrs, Run, StyleAttrs, StyleMark, TableColumn, TableRow};
use minijinja::{context, Environment};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

const DOCUMENT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{ subject }}</title>
</head>
<body>
<h1>{{ subject }}</h1>
<p class="dxl-meta">UNID: {{ unid }}</p>
<hr class="dxl-header-rule">
{{ body|safe }}
{{ appendix|safe }}
</body>
</html>
"#;

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Renders an [`NDoc`] to a single self-contained HTML document.
pub struct HtmlRenderer<'a> {
    doc: &'a NDoc,
    ctx: RenderContext,
    attachment_dir: PathBuf,
    options: RenderOptions,
    attachments_by_name: HashMap<&'a str, &'a AttachmentMeta>,
    body: String,
    current_paragraph: Option<String>,
    table_counter: usize,
    pretty: bool,
}

impl<'a> HtmlRenderer<'a> {
    #[must_use]
    pub fn new(doc: &'a NDoc, attachment_dir: impl Into<PathBuf>, options: RenderOptions) -> Self {
        let attachments_by_name = doc.attachments.iter().map(|a| (a.name.as_str(), a)).collect();
        Self {
            doc,
            ctx: RenderContext::new(),
            attachment_dir: attachment_dir.into(),
            options,
            attachments_by_name,
            body: String::new(),
            current_paragraph: None,
            table_counter: 0,
            pretty: true,
        }
    }

    #[must_use]
    pub fn minified(mut self) -> Self {
        self.pretty = false;
        self
    }

    fn push_inline(&mut self, html: &str) {
        match &mut self.current_paragraph {
            Some(buf) => buf.push_str(html),
            None => {
                let mut buf = String::new();
                buf.push_str(html);
                self.current_paragraph = Some(buf);
            }
        }
    }

    fn list_wrap_open(&self, par_style: &ParAttrs) -> Option<&'static str> {
        match &par_style.list {
            Some(ListType::Number) | Some(ListType::Alphaupper) | Some(ListType::Alphalower)
            | Some(ListType::Romanupper) | Some(ListType::Romanlower) => Some("ol"),
            Some(_) => Some("ul"),
            None => None,
        }
    }

    fn style_span(&self, marks: &BTreeSet<StyleMark>, attrs: &StyleAttrs, inner: &str) -> String {
        let mut html = inner.to_string();
        if marks.contains(&StyleMark::Mono) {
            html = format!("<code>{html}</code>");
        }
        if marks.contains(&StyleMark::Bold) {
            html = format!("<strong>{html}</strong>");
        }
        if marks.contains(&StyleMark::Italic) {
            html = format!("<em>{html}</em>");
        }
        if marks.contains(&StyleMark::Underline) {
            html = format!("<u>{html}</u>");
        }
        if marks.contains(&StyleMark::Strike) {
            html = format!("<s>{html}</s>");
        }
        let mut style_decls = Vec::new();
        if let Some(color) = &attrs.color {
            style_decls.push(format!("color:{color}"));
        }
        if let Some(bg) = &attrs.bgcolor {
            style_decls.push(format!("background-color:{bg}"));
        }
        if let Some(size) = &attrs.size {
            style_decls.push(format!("font-size:{size}"));
        }
        if let Some(family) = &attrs.font_family {
            style_decls.push(format!("font-family:{family}"));
        }
        if style_decls.is_empty() {
            html
        } else {
            format!("<span style=\"{}\">{html}</span>", style_decls.join(";"))
        }
    }

    fn with_buffer<F>(&mut self, f: F) -> Result<String>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let saved_body = std::mem::take(&mut self.body);
        let saved_paragraph = self.current_paragraph.take();
        let result = f(self);
        self.finalize_paragraph()?;
        let rendered = std::mem::replace(&mut self.body, saved_body);
        self.current_paragraph = saved_paragraph;
        result?;
        Ok(rendered)
    }

    fn render_table(
        &mut self,
        rows: &[TableRow],
        _columns: &[TableColumn],
        attributes: Option<&BTreeMap<String, String>>,
    ) -> Result<String> {
        self.table_counter += 1;
        let is_tab_rendered = attributes.map(|a| a.contains_key("tablabel")).unwrap_or(false);
        let mut html = if is_tab_rendered {
            format!("<table data-dxl-tabgroup=\"tabgroup-{}\">\n", self.table_counter)
        } else {
            "<table>\n".to_string()
        };
        for row in rows {
            html.push_str("<tr>");
            for cell in &row.cells {
                let mut attrs = String::new();
                if let Some(colspan) = cell.colspan {
                    attrs.push_str(&format!(" colspan=\"{colspan}\""));
                }
                if let Some(rowspan) = cell.rowspan {
                    attrs.push_str(&format!(" rowspan=\"{rowspan}\""));
                }
                if let Some(style) = &cell.style {
                    if let Some(bg) = style.attrs.get("bgcolor") {
                        attrs.push_str(&format!(" style=\"background-color:{bg}\""));
                    }
                }
                let cell_html = self.with_buffer(|r| r.process_runs(&cell.runs))?;
                html.push_str(&format!("<td{attrs}>{cell_html}</td>"));
            }
            html.push_str("</tr>\n");
        }
        html.push_str("</table>\n");
        Ok(html)
    }

    fn link_href(&self, run: &Run) -> (String, bool) {
        let Run::Link { url, server, replica, unid, .. } = run else {
            return (String::new(), false);
        };
        if let Some(url) = url {
            return (url.clone(), true);
        }
        let raw = format!(
            "notes:///{}/{}/0/{}?OpenDocument",
            server.as_deref().unwrap_or_default(),
            replica.as_deref().unwrap_or_default(),
            unid.as_deref().unwrap_or_default()
        );
        match &self.options.notes_redirect_base {
            Some(base) => (notes_redirect_url(base, &raw), true),
            None => (raw, false),
        }
    }
}

impl<'a> RenderVisitor for HtmlRenderer<'a> {
    type Output = String;

    fn context(&mut self) -> &mut RenderContext {
        &mut self.ctx
    }

    fn attachment_dir(&self) -> &Path {
        &self.attachment_dir
    }

    fn render_header(&mut self, _doc: &NDoc) -> Result<()> {
        Ok(())
    }

    fn render_footer(&mut self, _doc: &NDoc) -> Result<()> {
        Ok(())
    }

    fn render_appendix(&mut self, _doc: &NDoc) -> Result<()> {
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
            // Collapse a visually empty paragraph into a soft break on the
            // previous block rather than an empty <p>.
            if !self.body.is_empty() {
                self.body.push_str("<br>\n");
            }
            return Ok(());
        }
        let tag = match self.list_wrap_open(&self.ctx.current_par_style) {
            Some(_) => "li",
            None => "p",
        };
        self.body.push_str(&format!("<{tag}>{content}</{tag}>\n"));
        Ok(())
    }

    fn ensure_paragraph_started(&mut self) -> Result<()> {
        if self.current_paragraph.is_none() {
            self.current_paragraph = Some(String::new());
        }
        Ok(())
    }

    fn handle_text(&mut self, text: &str, marks: &BTreeSet<StyleMark>, attrs: &StyleAttrs) -> Result<()> {
        let escaped = escape_html(text);
        let styled = self.style_span(marks, attrs, &escaped);
        self.push_inline(&styled);
        Ok(())
    }

    fn handle_link(&mut self, run: &Run) -> Result<()> {
        let Run::Link { text, .. } = run else {
            return Ok(());
        };
        let (href, external) = self.link_href(run);
        let attrs = if external { " target=\"_blank\" rel=\"noopener noreferrer\"" } else { "" };
        self.push_inline(&format!("<a href=\"{}\"{attrs}>{}</a>", escape_html(&href), escape_html(text)));
        Ok(())
    }

    fn handle_img(&mut self, alt: &str, src: Option<&str>) -> Result<()> {
        match src.and_then(|s| resolve_attachment_path(&self.attachment_dir, Some(s)).map(|_| s)) {
            Some(path) => self.push_inline(&format!("<img src=\"{}\" alt=\"{}\">", escape_html(path), escape_html(alt))),
            None => {
                log::warn!("skipping image with unresolved src for alt '{alt}'");
                self.push_inline(&format!("<span class=\"dxl-missing-image\">[image: {}]</span>", escape_html(alt)));
            }
        }
        Ok(())
    }

    fn handle_table(&mut self, rows: &[TableRow], columns: &[TableColumn], attributes: Option<&BTreeMap<String, String>>) -> Result<()> {
        let html = self.render_table(rows, columns, attributes)?;
        self.body.push_str(&html);
        Ok(())
    }

    fn handle_section(&mut self, title_runs: &[Run], body_runs: &[Run], _attributes: Option<&BTreeMap<String, String>>) -> Result<()> {
        let title_html = self.with_buffer(|r| r.process_runs(title_runs))?;
        let body_html = self.with_buffer(|r| r.process_runs(body_runs))?;
        self.body
            .push_str(&format!("<details>\n<summary>{title_html}</summary>\n{body_html}</details>\n"));
        Ok(())
    }

    fn handle_attachmentref(&mut self, name: &str, displayname: Option<&str>, content_path: Option<&str>) -> Result<()> {
        let label = displayname.unwrap_or(name);
        let Some(path) = content_path.and_then(|p| resolve_attachment_path(&self.attachment_dir, Some(p)).map(|_| p)) else {
            log::warn!("skipping attachment link for unresolved '{name}'");
            self.body.push_str(&format!("<p class=\"dxl-missing-attachment\">{}</p>\n", escape_html(label)));
            return Ok(());
        };
        let icon = self.attachments_by_name.get(name).and_then(|m| m.icon_path.as_deref());
        let icon_html = icon
            .map(|i| format!("<img class=\"dxl-attachment-icon\" src=\"{}\" alt=\"\">", escape_html(i)))
            .unwrap_or_default();
        self.body.push_str(&format!(
            "<p class=\"dxl-attachment\">{icon_html}<a href=\"{}\">{}</a></p>\n",
            escape_html(path),
            escape_html(label)
        ));
        Ok(())
    }

    fn handle_hr(&mut self, _attrs: Option<&BTreeMap<String, String>>) -> Result<()> {
        self.body.push_str("<hr>\n");
        Ok(())
    }

    fn handle_br(&mut self) -> Result<()> {
        self.push_inline("<br>");
        Ok(())
    }

    fn get_output(&mut self) -> Self::Output {
        let subject = match self.doc.fields.get("Subject") {
            Some(Field::Text { value }) => value.clone(),
            _ => self.doc.meta.form.clone(),
        };
        let rows = appendix_rows(self.doc);
        let mut appendix = String::new();
        if !rows.is_empty() {
            appendix.push_str("<h2>Appendix</h2>\n<table class=\"dxl-appendix\">\n<tr><th>Name</th><th>Type</th><th>Preview</th></tr>\n");
            for row in rows {
                appendix.push_str(&format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                    escape_html(&row.name),
                    escape_html(row.field_type),
                    escape_html(&row.preview)
                ));
            }
            appendix.push_str("</table>\n");
        }

        let mut env = Environment::new();
        if env.add_template("document", DOCUMENT_TEMPLATE).is_err() {
            return format!("<html><body><h1>{}</h1>{}</body></html>", escape_html(&subject), self.body);
        }
        let tmpl = env.get_template("document").expect("just registered");
        let rendered = tmpl
            .render(context! { subject => subject, unid => self.doc.meta.unid.clone(), body => self.body.clone(), appendix => appendix })
            .unwrap_or_else(|e| format!("<html><body>render error: {e}</body></html>"));
        if self.pretty {
            rendered
        } else {
            rendered.lines().map(str::trim).collect::<Vec<_>>().join("")
        }
    }

    fn get_output_on_error(&mut self, err: &DxlError) -> Self::Output {
        log::error!("HTML render failed: {err}");
        format!("<html><body><p class=\"dxl-render-error\">{}</p>{}</body></html>", escape_html(&err.to_string()), self.body)
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
    fn renders_bold_text_inside_paragraph() {
        let doc = bare_doc(vec![
            Run::Par { attrs: ParAttrs::default() },
            Run::Text {
                text: "hi".to_string(),
                s: BTreeSet::from([StyleMark::Bold]),
                a: StyleAttrs::default(),
            },
        ]);
        let dir = tempdir().unwrap();
        let mut r = HtmlRenderer::new(&doc, dir.path(), RenderOptions::default());
        let out = r.render(&doc);
        assert!(out.contains("<strong>hi</strong>"));
        assert!(out.contains("<h1>Hello</h1>"));
    }

    #[test]
    fn escapes_html_special_characters() {
        let doc = bare_doc(vec![
            Run::Par { attrs: ParAttrs::default() },
            Run::Text { text: "<script>".to_string(), s: BTreeSet::new(), a: StyleAttrs::default() },
        ]);
        let dir = tempdir().unwrap();
        let mut r = HtmlRenderer::new(&doc, dir.path(), RenderOptions::default());
        let out = r.render(&doc);
        assert!(out.contains("&lt;script&gt;"));
    }

    #[test]
    fn external_link_gets_target_blank() {
        let doc = bare_doc(vec![
            Run::Par { attrs: ParAttrs::default() },
            Run::Link {
                url: Some("https://example.com".to_string()),
                server: None,
                replica: None,
                unid: None,
                view: None,
                text: "click".to_string(),
            },
        ]);
        let dir = tempdir().unwrap();
        let mut r = HtmlRenderer::new(&doc, dir.path(), RenderOptions::default());
        let out = r.render(&doc);
        assert!(out.contains("target=\"_blank\""));
        assert!(out.contains("https://example.com"));
    }

    #[test]
    fn minified_output_has_no_newlines_between_tags() {
        let doc = bare_doc(vec![Run::Par { attrs: ParAttrs::default() }, Run::Text {
            text: "x".to_string(),
            s: BTreeSet::new(),
            a: StyleAttrs::default(),
        }]);
        let dir = tempdir().unwrap();
        let mut r = HtmlRenderer::new(&doc, dir.path(), RenderOptions::default()).minified();
        let out = r.render(&doc);
        assert!(!out.contains('\n'));
    }
}
