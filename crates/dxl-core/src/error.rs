//! Error types shared by every phase of the pipeline.
//!
//! Each phase (parse, extract, render, orchestrate) maps its failures onto one
//! of these kinds; see the module docs on [`DxlError`] for how each variant is
//! meant to be handled by callers.

use thiserror::Error;

/// Error conditions that can occur anywhere in the parse → extract → render
/// pipeline.
///
/// # Examples
///
/// ```rust
/// use dxl_core::error::DxlError;
///
/// fn resolve(path: &str) -> Result<(), DxlError> {
///     if path.contains("..") {
///         return Err(DxlError::PathEscape(path.to_string()));
///     }
///     Ok(())
/// }
///
/// match resolve("../etc/passwd") {
///     Err(DxlError::PathEscape(p)) => assert_eq!(p, "../etc/passwd"),
///     _ => panic!("expected PathEscape"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum DxlError {
    /// Missing inputs/output directories, or an invalid environment-variable
    /// combination. Fatal to the whole run.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed DXL. The parser recovers by emitting a minimal IR with
    /// `meta.error` set; this variant is for cases that can't even produce
    /// that (e.g. the XML itself doesn't parse).
    #[error("parse error: {0}")]
    Parse(String),

    /// A payload couldn't be located or decoded, or a run referenced an
    /// attachment that doesn't resolve.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// A resolved attachment path would escape the document's directory.
    #[error("path escape: {0}")]
    PathEscape(String),

    /// A renderer failed to produce output for a format.
    #[error("render error: {0}")]
    Render(String),

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for `Result<T, DxlError>`.
pub type Result<T> = std::result::Result<T, DxlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_display() {
        let err = DxlError::Configuration("missing --dxl-dir".to_string());
        assert_eq!(format!("{err}"), "configuration error: missing --dxl-dir");
    }

    #[test]
    fn path_escape_display() {
        let err = DxlError::PathEscape("../../etc".to_string());
        assert_eq!(format!("{err}"), "path escape: ../../etc");
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        let dxl_err: DxlError = io_err.into();
        match dxl_err {
            DxlError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[test]
    fn json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ not json }").unwrap_err();
        let dxl_err: DxlError = json_err.into();
        assert!(matches!(dxl_err, DxlError::Json(_)));
    }

    #[test]
    fn error_size_is_reasonable() {
        use std::mem::size_of;
        assert!(size_of::<DxlError>() < 128);
    }
}
