//! The normalized document (NDoc) intermediate representation.
//!
//! NDoc is produced by the parser, mutated exactly once by the attachment
//! extractor, and then treated as immutable input by every renderer.
//!
//! # Examples
//!
//! ```rust
//! use dxl_core::ndoc::{NDoc, Meta};
//!
//! let doc = NDoc {
//!     schema_version: "1.5".to_string(),
//!     meta: Meta {
//!         db_title: "TestDb".to_string(),
//!         unid: "ABC123".to_string(),
//!         form: "Document".to_string(),
//!         created: None,
//!         modified: None,
//!         revised: None,
//!         schema_version: "1.5".to_string(),
//!         error: None,
//!         pipeline_error: None,
//!     },
//!     fields: Default::default(),
//!     attachments: Vec::new(),
//!     links: Links::default(),
//!     layout: Layout::default(),
//! };
//! assert_eq!(doc.meta.unid, "ABC123");
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Current IR schema version emitted by this parser.
pub const SCHEMA_VERSION: &str = "1.5";

/// The root normalized-document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NDoc {
    /// IR dialect identifier, echoed in `meta.schema_version`.
    pub schema_version: String,
    /// Document-level metadata.
    pub meta: Meta,
    /// Field name -> typed field value. Keys never start with `$`.
    #[serde(default)]
    pub fields: BTreeMap<String, Field>,
    /// Ordered attachment metadata, one entry per file/image/ole reference.
    #[serde(default)]
    pub attachments: Vec<AttachmentMeta>,
    /// Links collected while walking richtext fields.
    #[serde(default)]
    pub links: Links,
    /// Appendix-driving field classification.
    #[serde(default)]
    pub layout: Layout,
}

impl NDoc {
    /// Builds a minimal error document for a DXL file that failed to parse
    /// at all (the fallback required by the `ParseError` phase contract).
    #[must_use]
    pub fn minimal_with_error(db_title: &str, message: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            meta: Meta {
                db_title: db_title.to_string(),
                unid: String::new(),
                form: String::new(),
                created: None,
                modified: None,
                revised: None,
                schema_version: SCHEMA_VERSION.to_string(),
                error: Some(message.to_string()),
                pipeline_error: None,
            },
            fields: BTreeMap::new(),
            attachments: Vec::new(),
            links: Links::default(),
            layout: Layout::default(),
        }
    }
}

/// Document-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// Title of the source database, as supplied to the parser/orchestrator.
    pub db_title: String,
    /// Notes-style universal id; unique per document.
    pub unid: String,
    /// Source form name.
    pub form: String,
    /// Creation timestamp, ISO-8601 with offset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    /// Last-modified timestamp, ISO-8601 with offset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    /// Last-revised timestamp, ISO-8601 with offset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised: Option<String>,
    /// Echo of the root-level `schema_version`.
    pub schema_version: String,
    /// Set when the parser could not produce a full IR (see `ParseError`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set by the orchestrator when a later phase fails (see `*.FAILED_<phase>.json`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_error: Option<String>,
}

/// A single document field, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Field {
    /// Scalar text value.
    #[serde(rename = "text")]
    Text { value: String },
    /// Scalar numeric value.
    #[serde(rename = "number")]
    Number { value: f64 },
    /// Scalar datetime, ISO-8601 with offset (or verbatim on parse failure).
    #[serde(rename = "datetime")]
    Datetime { value: String },
    /// List of text values.
    #[serde(rename = "textlist")]
    TextList { value: Vec<String> },
    /// List of numeric values.
    #[serde(rename = "numberlist")]
    NumberList { value: Vec<f64> },
    /// List of datetime values.
    #[serde(rename = "datetimelist")]
    DatetimeList { value: Vec<String> },
    /// Richtext field: plain-text projection plus the typed run stream.
    #[serde(rename = "richtext")]
    RichText { text: String, runs: Vec<Run> },
}

/// Style marks, merged by set-union across the style stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleMark {
    Bold,
    Italic,
    Underline,
    Strike,
    Mono,
}

/// Superscript/subscript script position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Script {
    Super,
    Sub,
}

/// Visual effects, merged by list-union across the style stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Shadow,
    Emboss,
    Extrude,
    Super,
    Sub,
}

/// Style attributes, merged by right-bias overwrite (except `fx`, which is
/// list-unioned).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleAttrs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bgcolor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<Script>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty", default)]
    pub fx: BTreeSet<Effect>,
}

impl StyleAttrs {
    /// Merges `other` on top of `self`: scalars are right-biased (overwritten
    /// by `other` when present), `fx` is unioned.
    #[must_use]
    pub fn merged_with(&self, other: &StyleAttrs) -> StyleAttrs {
        StyleAttrs {
            color: other.color.clone().or_else(|| self.color.clone()),
            bgcolor: other.bgcolor.clone().or_else(|| self.bgcolor.clone()),
            size: other.size.clone().or_else(|| self.size.clone()),
            font_family: other.font_family.clone().or_else(|| self.font_family.clone()),
            script: other.script.or(self.script),
            fx: self.fx.union(&other.fx).copied().collect(),
        }
    }

    /// True if no attribute is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.color.is_none()
            && self.bgcolor.is_none()
            && self.size.is_none()
            && self.font_family.is_none()
            && self.script.is_none()
            && self.fx.is_empty()
    }
}

/// Paragraph alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    Center,
    Right,
    Justify,
}

/// List marker type for a paragraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    Bullet,
    Number,
    Uncheck,
    Square,
    Alphaupper,
    Alphalower,
    Romanupper,
    Romanlower,
    /// Anything not in the canonical set, preserved verbatim.
    Raw(String),
}

/// Paragraph-definition attributes, keyed by pardef id in the parser and
/// carried on every `par` token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParAttrs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub align: Option<Align>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leftmargin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spaceafter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parstyle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list: Option<ListType>,
}

/// A single typed token in a richtext run stream, tagged by `t`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Run {
    /// Paragraph boundary.
    #[serde(rename = "par")]
    Par {
        #[serde(flatten)]
        attrs: ParAttrs,
    },
    /// Literal text, carrying style marks/attributes accumulated from the
    /// enclosing style stack.
    #[serde(rename = "text")]
    Text {
        text: String,
        #[serde(skip_serializing_if = "BTreeSet::is_empty", default)]
        s: BTreeSet<StyleMark>,
        #[serde(skip_serializing_if = "StyleAttrs::is_empty", default)]
        a: StyleAttrs,
    },
    /// Hyperlink, internal (Notes `server`/`replica`/`unid`) or external
    /// (`url`).
    #[serde(rename = "link")]
    Link {
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        server: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        replica: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        unid: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        view: Option<String>,
        text: String,
    },
    /// Inline image placeholder; `src` is populated by the extractor.
    #[serde(rename = "img")]
    Img {
        alt: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        src: Option<String>,
    },
    /// File-attachment reference; `content_path` is populated by the
    /// extractor.
    #[serde(rename = "attachmentref")]
    AttachmentRef {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        displayname: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        content_path: Option<String>,
    },
    /// Table.
    #[serde(rename = "table")]
    Table {
        rows: Vec<TableRow>,
        #[serde(skip_serializing_if = "Option::is_none")]
        attributes: Option<BTreeMap<String, String>>,
        #[serde(skip_serializing_if = "Vec::is_empty", default)]
        columns: Vec<TableColumn>,
    },
    /// Collapsible section.
    #[serde(rename = "section")]
    Section {
        title_runs: Vec<Run>,
        body_runs: Vec<Run>,
        #[serde(skip_serializing_if = "Option::is_none")]
        attributes: Option<BTreeMap<String, String>>,
    },
    /// Horizontal rule.
    #[serde(rename = "hr")]
    Hr {
        #[serde(skip_serializing_if = "Option::is_none")]
        a: Option<BTreeMap<String, String>>,
    },
    /// Explicit hard line break.
    #[serde(rename = "br")]
    Br,
}

/// `<tablecolumn>` metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
}

/// A table row; `attributes.tablabel` carries the row's `tablabel` when
/// present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, String>>,
    pub cells: Vec<TableCell>,
}

/// A table cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colspan: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rowspan: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<CellStyle>,
    pub runs: Vec<Run>,
}

/// Cell-level style attributes that aren't colspan/rowspan (e.g. `bgcolor`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellStyle {
    #[serde(flatten)]
    pub attrs: BTreeMap<String, String>,
}

/// Attachment kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
    File,
    Image,
    Ole,
}

/// How the attachment was discovered, carrying enough information for the
/// extractor to re-locate its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AttachmentRefKind {
    #[serde(rename = "file")]
    File,
    #[serde(rename = "picture")]
    Picture { index: usize },
    #[serde(rename = "attachmentref")]
    AttachmentRef { name: String },
}

/// Metadata for one attachment entry (file, inline image, or OLE object).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AttachmentType,
    #[serde(rename = "ref")]
    pub reference: AttachmentRefKind,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_error: Option<String>,
}

/// Links collected while walking richtext fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Links {
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub http: Vec<String>,
}

/// Appendix-generation hints: which fields are already surfaced elsewhere and
/// should be skipped when rendering the "everything else" appendix table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    #[serde(default)]
    pub primary_fields_allowlist: BTreeSet<String>,
    #[serde(default)]
    pub used_in_body: BTreeSet<String>,
}
