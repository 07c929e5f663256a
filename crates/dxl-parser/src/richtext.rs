//! The richtext sub-walker: converts a `<richtext>` element (or a table
//! cell, or a section title/body) into a typed run stream.

use crate::pardef::par_attrs_equal;
use crate::style::{style_from_generic_tag, StyleContribution};
use crate::xml_util::{element_children, find_child, find_children, local_name};
use dxl_core::ndoc::{
    AttachmentMeta, ParAttrs, Run, StyleAttrs, StyleMark, TableCell, TableColumn, TableRow,
};
use roxmltree::Node;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Converts one richtext field (or nested fragment) into runs plus its
/// plain-text projection.
pub struct RichTextParser<'a> {
    pardefs: &'a HashMap<String, ParAttrs>,
    /// Inline (non-icon) pictures, indexed by `Picture { index }` rather
    /// than by attachment-list position (the list is sorted by name for
    /// reporting, which does not match DXL-document order once there are
    /// ten or more inline images).
    inline_images: Vec<Option<&'a AttachmentMeta>>,
    ns: Option<&'a str>,
    runs: Vec<Run>,
    plain: Vec<String>,
    style_stack: Vec<StyleContribution>,
    pending_par_attrs: Option<ParAttrs>,
    emitted_anything: bool,
    inline_image_index: usize,
    emitted_content_since_last_par: bool,
}

/// Result of parsing a richtext fragment: the plain-text projection and the
/// run stream.
pub struct RichTextOutput {
    pub text: String,
    pub runs: Vec<Run>,
}

impl<'a> RichTextParser<'a> {
    #[must_use]
    pub fn new(
        pardefs: &'a HashMap<String, ParAttrs>,
        attachments: &'a [AttachmentMeta],
        ns: Option<&'a str>,
    ) -> Self {
        let max_index = attachments.iter().filter_map(inline_picture_index).max();
        let mut inline_images = vec![None; max_index.map_or(0, |m| m + 1)];
        for a in attachments {
            if let Some(index) = inline_picture_index(a) {
                inline_images[index] = Some(a);
            }
        }
        Self {
            pardefs,
            inline_images,
            ns,
            runs: Vec::new(),
            plain: Vec::new(),
            style_stack: Vec::new(),
            pending_par_attrs: Some(ParAttrs::default()),
            emitted_anything: false,
            inline_image_index: 0,
            emitted_content_since_last_par: false,
        }
    }

    /// Inherits the inline-image counter from a parent walker; used when
    /// re-entering for a table cell or a section title/body.
    pub fn with_inline_image_index(mut self, index: usize) -> Self {
        self.inline_image_index = index;
        self
    }

    #[must_use]
    pub fn inline_image_index(&self) -> usize {
        self.inline_image_index
    }

    /// Parses the content of a `<richtext>` element.
    pub fn parse(mut self, richtext_el: Node) -> RichTextOutput {
        if let Some(text) = richtext_el.text() {
            self.emit_text(text);
        }
        for child in element_children(richtext_el) {
            self.walk(child);
            if let Some(tail) = child.tail() {
                self.emit_text(tail);
            }
        }
        RichTextOutput {
            text: self.plain.concat().trim_end().to_string(),
            runs: self.runs,
        }
    }

    fn current_style(&self) -> (BTreeSet<StyleMark>, StyleAttrs) {
        let mut marks = BTreeSet::new();
        let mut attrs = StyleAttrs::default();
        for contribution in &self.style_stack {
            marks.extend(contribution.marks.iter().copied());
            attrs = attrs.merged_with(&contribution.attrs);
        }
        (marks, attrs)
    }

    fn ensure_par_before_content(&mut self) {
        if let Some(attrs) = self.pending_par_attrs.clone() {
            self.emit_par(attrs);
        }
        self.emitted_content_since_last_par = true;
    }

    /// Edge case 3: duplicate-empty-paragraph suppression.
    fn emit_par(&mut self, attrs: ParAttrs) {
        if let Some(Run::Par { attrs: last_attrs }) = self.runs.last() {
            if par_attrs_equal(last_attrs, &attrs) && !self.emitted_content_since_last_par {
                self.pending_par_attrs = Some(attrs);
                return;
            }
        }

        if self.emitted_anything && !self.plain.last().is_some_and(|s| s.ends_with('\n')) {
            self.plain.push("\n".to_string());
        }

        self.runs.push(Run::Par {
            attrs: attrs.clone(),
        });
        self.pending_par_attrs = None;
        self.emitted_anything = true;
        self.emitted_content_since_last_par = false;
    }

    /// Edge case 4: adjacent-text merging on identical normalized style.
    fn emit_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.ensure_par_before_content();

        let (marks, attrs) = self.current_style();

        if let Some(Run::Text { text: last_text, s: last_marks, a: last_attrs }) =
            self.runs.last_mut()
        {
            if *last_marks == marks && *last_attrs == attrs {
                last_text.push_str(text);
                if let Some(last_plain) = self.plain.last_mut() {
                    last_plain.push_str(text);
                } else {
                    self.plain.push(text.to_string());
                }
                self.emitted_anything = true;
                self.emitted_content_since_last_par = true;
                return;
            }
        }

        self.runs.push(Run::Text {
            text: text.to_string(),
            s: marks,
            a: attrs,
        });
        self.plain.push(text.to_string());
        self.emitted_anything = true;
        self.emitted_content_since_last_par = true;
    }

    fn emit_link(
        &mut self,
        url: Option<String>,
        label: &str,
        notes: Option<(Option<String>, Option<String>, Option<String>, Option<String>)>,
    ) {
        self.ensure_par_before_content();
        let label = label.trim();
        let fallback = url.clone().unwrap_or_else(|| "Notes Link".to_string());
        let text = if label.is_empty() { fallback } else { label.to_string() };

        let (server, replica, unid, view) = notes.unwrap_or((None, None, None, None));

        self.runs.push(Run::Link {
            url,
            server,
            replica,
            unid,
            view,
            text: text.clone(),
        });
        self.plain.push(text);
        self.emitted_anything = true;
        self.emitted_content_since_last_par = true;
    }

    /// Edge case 5: a stub attachmentref with no matching `$FILE`/icon entry
    /// is handled upstream (metadata extraction); here we only emit the run.
    fn emit_attachmentref(&mut self, name: &str, displayname: Option<&str>) {
        self.ensure_par_before_content();
        let effective = displayname.unwrap_or(name).trim().to_string();
        self.runs.push(Run::AttachmentRef {
            name: name.to_string(),
            displayname: Some(effective.clone()),
            content_path: None,
        });
        self.plain.push(format!("[{effective}]"));
        self.emitted_anything = true;
        self.emitted_content_since_last_par = true;
    }

    /// Edge case 2: only called for `<picture>` elements that are not
    /// icons (the caller filters those out via `inline_images`).
    fn emit_inline_image(&mut self) {
        self.ensure_par_before_content();
        match self.inline_images.get(self.inline_image_index).copied().flatten() {
            Some(meta) => {
                let alt = meta.name.clone();
                self.runs.push(Run::Img { alt: alt.clone(), src: None });
                self.plain.push(format!("[Image: {alt}]"));
                self.emitted_anything = true;
                self.inline_image_index += 1;
                self.emitted_content_since_last_par = true;
            }
            None => {
                log::error!(
                    "attempted to emit inline image index {} but no inline metadata entry found at that index",
                    self.inline_image_index
                );
            }
        }
    }

    fn walk(&mut self, el: Node) {
        let tag = local_name(el);

        match tag {
            "par" => {
                let attrs = el
                    .attribute("def")
                    .and_then(|id| self.pardefs.get(id))
                    .cloned()
                    .unwrap_or_default();
                self.emit_par(attrs);
                if let Some(text) = el.text() {
                    self.emit_text(text);
                }
                for child in element_children(el) {
                    self.walk(child);
                    if let Some(tail) = child.tail() {
                        self.emit_text(tail);
                    }
                }
            }
            "table" => {
                self.ensure_par_before_content();
                let table = self.parse_table(el);
                self.runs.push(table);
                self.emitted_anything = true;
                self.emitted_content_since_last_par = true;
            }
            "horizrule" => {
                self.ensure_par_before_content();
                let attrs = collect_attrs(el);
                self.runs.push(Run::Hr {
                    a: if attrs.is_empty() { None } else { Some(attrs) },
                });
                self.plain.push("\n---\n".to_string());
                self.emitted_anything = true;
                self.emitted_content_since_last_par = true;
            }
            "section" => self.walk_section(el),
            "run" => {
                let contribution = style_from_generic_tag(el);
                let pushed = !contribution.is_empty();
                if pushed {
                    self.style_stack.push(contribution);
                }
                if let Some(text) = el.text() {
                    self.emit_text(text);
                }
                for child in element_children(el) {
                    self.walk(child);
                    if let Some(tail) = child.tail() {
                        self.emit_text(tail);
                    }
                }
                if pushed {
                    self.style_stack.pop();
                }
            }
            "font" | "b" | "i" | "u" | "strike" | "sup" | "sub" => self.walk_style_tag(el, tag),
            "urllink" => {
                let href = el.attribute("href").unwrap_or("").to_string();
                let label = inner_text(el);
                let label = if label.trim().is_empty() {
                    el.attribute("title").unwrap_or(&href).to_string()
                } else {
                    label
                };
                self.emit_link(Some(href), &label, None);
            }
            "doclink" => {
                let server = el.attribute("server").map(str::to_string);
                let replica = el
                    .attribute("database")
                    .or_else(|| el.attribute("db"))
                    .map(str::to_string);
                let unid = el
                    .attribute("document")
                    .or_else(|| el.attribute("unid"))
                    .map(str::to_string);
                let view = el.attribute("view").map(str::to_string);
                let label = {
                    let t = inner_text(el);
                    if t.trim().is_empty() {
                        el.attribute("description").unwrap_or("DocLink").to_string()
                    } else {
                        t
                    }
                };
                self.emit_link(None, &label, Some((server, replica, unid, view)));
            }
            "attachmentref" => {
                if let Some(name) = el.attribute("name") {
                    self.emit_attachmentref(name, el.attribute("displayname"));
                } else {
                    log::warn!("<attachmentref> found without 'name' attribute");
                }
            }
            "picture" => self.emit_inline_image(),
            "br" | "break" => {
                self.ensure_par_before_content();
                self.runs.push(Run::Br);
                self.plain.push("\n".to_string());
                self.emitted_anything = true;
                self.emitted_content_since_last_par = true;
            }
            "pardef" | "parstyle" | "fonttable" | "colortable" | "object" | "file" | "filedata"
            | "gif" | "jpeg" | "png" | "bmp" | "notesbitmap" | "caption" | "region" => {}
            _ => {
                log::warn!("unhandled DXL tag <{tag}>; processing content/children as plain text");
                if let Some(text) = el.text() {
                    self.emit_text(text);
                }
                for child in element_children(el) {
                    self.walk(child);
                    if let Some(tail) = child.tail() {
                        self.emit_text(tail);
                    }
                }
            }
        }
    }

    /// Edge case 1: `<font attrs/>TEXT` — style applies to the tail, which
    /// is then consumed so the parent loop doesn't re-emit it.
    fn walk_style_tag(&mut self, el: Node, tag: &str) {
        let contribution = style_from_generic_tag(el);
        let pushed = !contribution.is_empty();

        let is_font_tail_pattern = tag == "font"
            && el.text().is_none_or(|t| t.trim().is_empty())
            && el.tail().is_some_and(|t| !t.trim().is_empty())
            && element_children(el).is_empty();

        if is_font_tail_pattern {
            if pushed {
                self.style_stack.push(contribution);
            }
            self.emit_text(el.tail().unwrap_or_default());
            if pushed {
                self.style_stack.pop();
            }
            return;
        }

        if pushed {
            self.style_stack.push(contribution);
        }
        if let Some(text) = el.text() {
            self.emit_text(text);
        }
        for child in element_children(el) {
            self.walk(child);
            if let Some(tail) = child.tail() {
                self.emit_text(tail);
            }
        }
        if pushed {
            self.style_stack.pop();
        }
    }

    fn walk_section(&mut self, el: Node) {
        self.ensure_par_before_content();

        let title_el = find_child(el, "sectiontitle");
        let mut title_sub = RichTextParser::new(self.pardefs, &[], self.ns);
        title_sub.inline_images = self.inline_images.clone();
        title_sub.inline_image_index = self.inline_image_index;
        if let Some(title_el) = title_el {
            if let Some(text) = title_el.text() {
                title_sub.emit_text(text);
            }
            for child in element_children(title_el) {
                title_sub.walk(child);
                if let Some(tail) = child.tail() {
                    title_sub.emit_text(tail);
                }
            }
        } else {
            log::warn!("<section> without <sectiontitle>; emitting empty title_runs");
        }
        self.inline_image_index = title_sub.inline_image_index;
        let title_runs = title_sub.runs;

        let mut body_sub = RichTextParser::new(self.pardefs, &[], self.ns);
        body_sub.inline_images = self.inline_images.clone();
        body_sub.inline_image_index = self.inline_image_index;
        if let Some(text) = el.text() {
            body_sub.emit_text(text);
        }
        for child in element_children(el) {
            let tag = local_name(child);
            if tag == "pardef" || tag == "sectiontitle" {
                if let Some(tail) = child.tail() {
                    body_sub.emit_text(tail);
                }
                continue;
            }
            body_sub.walk(child);
            if let Some(tail) = child.tail() {
                body_sub.emit_text(tail);
            }
        }
        self.inline_image_index = body_sub.inline_image_index;
        let body_runs = body_sub.runs;

        let attrs = collect_attrs(el);
        self.runs.push(Run::Section {
            title_runs,
            body_runs,
            attributes: if attrs.is_empty() { None } else { Some(attrs) },
        });
        self.emitted_anything = true;
        self.emitted_content_since_last_par = true;
    }

    fn parse_table(&mut self, tbl: Node) -> Run {
        let table_attrs = collect_attrs(tbl);

        let columns: Vec<TableColumn> = find_children(tbl, "tablecolumn")
            .into_iter()
            .map(|col| TableColumn {
                width: col.attribute("width").map(str::to_string),
            })
            .collect();

        let mut rows = Vec::new();
        for row_el in find_children(tbl, "tablerow") {
            let row_attrs = collect_attrs(row_el);
            let mut cells = Vec::new();
            for cell_el in find_children(row_el, "tablecell") {
                let colspan = cell_el.attribute("colspan").and_then(|v| v.parse().ok());
                let rowspan = cell_el.attribute("rowspan").and_then(|v| v.parse().ok());
                let mut cell_style = BTreeMap::new();
                for attr in cell_el.attributes() {
                    if attr.name() != "colspan" && attr.name() != "rowspan" {
                        cell_style.insert(attr.name().to_string(), attr.value().to_string());
                    }
                }

                let mut sub = RichTextParser::new(self.pardefs, &[], self.ns);
                sub.inline_images = self.inline_images.clone();
                sub.inline_image_index = self.inline_image_index;
                if let Some(text) = cell_el.text() {
                    sub.emit_text(text);
                }
                for child in element_children(cell_el) {
                    sub.walk(child);
                    if let Some(tail) = child.tail() {
                        sub.emit_text(tail);
                    }
                }
                self.inline_image_index = sub.inline_image_index;

                cells.push(TableCell {
                    colspan,
                    rowspan,
                    style: if cell_style.is_empty() {
                        None
                    } else {
                        Some(dxl_core::ndoc::CellStyle { attrs: cell_style })
                    },
                    runs: sub.runs,
                });
            }
            rows.push(TableRow {
                attributes: if row_attrs.is_empty() { None } else { Some(row_attrs) },
                cells,
            });
        }

        Run::Table {
            rows,
            attributes: if table_attrs.is_empty() { None } else { Some(table_attrs) },
            columns,
        }
    }
}

fn inline_picture_index(attachment: &AttachmentMeta) -> Option<usize> {
    match attachment.reference {
        dxl_core::ndoc::AttachmentRefKind::Picture { index } => Some(index),
        _ => None,
    }
}

fn collect_attrs(node: Node) -> BTreeMap<String, String> {
    node.attributes()
        .map(|a| (a.name().to_string(), a.value().to_string()))
        .collect()
}

fn inner_text(node: Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(roxmltree::Node::text)
        .collect::<String>()
}
