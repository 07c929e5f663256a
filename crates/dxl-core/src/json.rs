//! JSON (de)serialization for [`NDoc`](crate::ndoc::NDoc).
//!
//! Always pretty-printed with a two-space indent and non-ASCII characters
//! left unescaped, per the persisted-state contract: the IR on disk is meant
//! to be human-diffable.

use crate::error::Result;
use crate::ndoc::NDoc;
use std::io::Write;
use std::path::Path;

/// Serializes `doc` to a pretty-printed JSON string.
///
/// # Errors
/// Returns an error if serialization fails (should not happen for a
/// well-formed `NDoc`).
pub fn to_pretty_string(doc: &NDoc) -> Result<String> {
    Ok(serde_json::to_string_pretty(doc)?)
}

/// Writes `doc` as pretty-printed JSON to `path`, creating or truncating the
/// file.
///
/// # Errors
/// Returns an error on I/O failure or serialization failure.
pub fn write_to_file(doc: &NDoc, path: &Path) -> Result<()> {
    let json = to_pretty_string(doc)?;
    let mut file = std::fs::File::create(path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

/// Reads and deserializes an `NDoc` from `path`.
///
/// # Errors
/// Returns an error on I/O failure or malformed JSON.
pub fn read_from_file(path: &Path) -> Result<NDoc> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndoc::NDoc;

    #[test]
    fn roundtrips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.normalized.json");
        let doc = NDoc::minimal_with_error("Db", "oops");

        write_to_file(&doc, &path).unwrap();
        let back = read_from_file(&path).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn is_pretty_printed_with_two_space_indent() {
        let doc = NDoc::minimal_with_error("Db", "oops");
        let json = to_pretty_string(&doc).unwrap();
        assert!(json.contains("\n  \"meta\""));
    }
}
