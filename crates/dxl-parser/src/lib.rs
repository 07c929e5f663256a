//! DXL XML walker: turns a raw Domino/Notes DXL export into the normalized
//! document IR defined by `dxl-core`.

pub mod attachments_meta;
pub mod datetime;
pub mod document;
pub mod pardef;
pub mod richtext;
pub mod style;
pub mod xml_util;

pub use document::parse_dxl_document_from_string;

/// Default name of the richtext item treated as the document body.
pub const DEFAULT_RICHTEXT_ITEM_NAME: &str = "Body";
