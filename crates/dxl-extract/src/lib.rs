//! Attachment payload extraction: turns the placeholder attachment metadata
//! produced by `dxl-parser` into saved files on disk, with content-addressed
//! deduplication and path rewriting back into the run stream.

pub mod dedup;
pub mod extractor;
pub mod icons;
pub mod payload;
pub mod rewrite;

pub use extractor::{collect_displayname_map, extract_all};
pub use icons::IconPathMode;
pub use rewrite::update_runs_paths;
