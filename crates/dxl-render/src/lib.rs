//! Render IR visitor base and per-format renderers (HTML, Markdown, DOCX, PDF).
//!
//! Every format engine implements [`RenderVisitor`] against the same
//! [`dxl_core::ndoc::NDoc`] run stream; `process_runs` (provided by the
//! trait) is the single dispatcher all four engines share.

pub mod appendix;
pub mod context;
pub mod engines {
    pub mod docx;
    pub mod html;
    pub mod markdown;
    pub mod pdf;
}
pub mod links;
pub mod visitor;

pub use context::{CharStyle, ListState, RenderContext};
pub use engines::docx::DocxRenderer;
pub use engines::html::HtmlRenderer;
pub use engines::markdown::MarkdownRenderer;
pub use engines::pdf::PdfRenderer;
pub use links::{box_search_url, notes_redirect_url, RenderOptions};
pub use visitor::{resolve_attachment_path, RenderVisitor};
