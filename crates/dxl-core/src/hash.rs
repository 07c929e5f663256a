//! Content hashing and filesystem-safe filename utilities.
//!
//! These are pure functions; the dedup chain built on top of them lives in
//! `dxl-extract`.

use blake2::{Blake2b512, Digest as _};
use sha2::{Digest as _, Sha256};
use std::io::Read;
use std::path::Path;

/// Bytes hashed by the first-N-byte prefilter.
pub const FIRST_N: usize = 1024 * 1024;

/// Full-content BLAKE2b-512 digest, hex-encoded. Used as the final stage of
/// the three-stage identity test.
#[must_use]
pub fn blake2b_hex(data: &[u8]) -> String {
    let mut hasher = Blake2b512::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Streaming BLAKE2b-512 digest of a file, hex-encoded.
pub fn blake2b_hex_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Blake2b512::new();
    let mut buf = [0u8; 1024 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Full-content SHA-256 digest, hex-encoded. Used for the reporting
/// `sha256` field on attachment metadata.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA-256 digest of the first `n` bytes, hex-encoded. Used as the cheap
/// prefilter stage of the identity test.
#[must_use]
pub fn first_n_hash(data: &[u8], n: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(&data[..data.len().min(n)]);
    hex::encode(hasher.finalize())
}

/// SHA-256 digest of the first `n` bytes of a file, hex-encoded.
pub fn first_n_hash_file(path: &Path, n: usize) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut remaining = n;
    let mut buf = [0u8; 1024 * 1024];
    while remaining > 0 {
        let want = remaining.min(buf.len());
        let got = file.read(&mut buf[..want])?;
        if got == 0 {
            break;
        }
        hasher.update(&buf[..got]);
        remaining -= got;
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Replaces OS-forbidden characters, whitespace, and C0 controls with `_`,
/// collapses runs of `_`, strips leading/trailing `_`/`.`/space, and
/// truncates to `max_length` characters while preserving the extension.
#[must_use]
pub fn sanitize_filename(filename: &str, max_length: usize) -> String {
    if filename.is_empty() {
        return "_no_name_".to_string();
    }

    let is_bad = |c: char| "<>:\"/\\|?* \n\r\t".contains(c) || (c as u32) < 0x20;
    let replaced: String = filename.chars().map(|c| if is_bad(c) { '_' } else { c }).collect();
    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.' || c == '_');

    let collapsed = trimmed
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    if collapsed.is_empty() {
        return "_no_name_".to_string();
    }

    if collapsed.chars().count() <= max_length {
        return collapsed;
    }

    let (stem, ext) = split_extension(&collapsed);
    let ext_len = ext.chars().count();
    if max_length <= ext_len {
        return truncate_chars(&collapsed, max_length);
    }
    let allowed_stem_len = max_length - ext_len;
    let truncated_stem = truncate_chars(stem, allowed_stem_len);
    let truncated_stem = truncated_stem.trim_end_matches('_');
    if truncated_stem.is_empty() && ext.is_empty() {
        return "_sanitized_".to_string();
    }
    format!("{truncated_stem}{ext}")
}

fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Splits `name` into `(stem, extension)` where `extension` includes the
/// leading dot (empty if there is none).
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

/// Strips a three-digit sequence suffix (`.NNN`) immediately before the
/// extension, e.g. `report.002.txt` -> `report.txt`.
#[must_use]
pub fn strip_seq_suffix(filename: &str) -> String {
    let (stem, ext) = split_extension(filename);
    if let Some(idx) = stem.rfind('.') {
        let candidate = &stem[idx + 1..];
        if candidate.len() == 3 && candidate.chars().all(|c| c.is_ascii_digit()) {
            return format!("{}{}", &stem[..idx], ext);
        }
    }
    filename.to_string()
}

/// Allocates a collision-free name under `used`: returns `pretty` itself if
/// free, else `stem_2.ext`, `stem_3.ext`, … for the first free slot.
#[must_use]
pub fn allocate_unique_name(pretty: &str, used: &dyn Fn(&str) -> bool) -> String {
    if !used(pretty) {
        return pretty.to_string();
    }
    let (stem, ext) = split_extension(pretty);
    let mut n = 2;
    loop {
        let candidate = format!("{stem}_{n}{ext}");
        if !used(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_forbidden_chars() {
        assert_eq!(sanitize_filename("a/b:c?d", 200), "a_b_c_d");
    }

    #[test]
    fn sanitize_collapses_underscore_runs() {
        assert_eq!(sanitize_filename("a   b", 200), "a_b");
    }

    #[test]
    fn sanitize_empty_input_falls_back() {
        assert_eq!(sanitize_filename("", 200), "_no_name_");
    }

    #[test]
    fn sanitize_all_forbidden_falls_back() {
        assert_eq!(sanitize_filename("   ", 200), "_no_name_");
    }

    #[test]
    fn sanitize_preserves_extension_when_truncating() {
        let long_name = format!("{}.txt", "a".repeat(300));
        let sanitized = sanitize_filename(&long_name, 200);
        assert!(sanitized.ends_with(".txt"));
        assert!(sanitized.chars().count() <= 200);
    }

    #[test]
    fn strip_seq_suffix_removes_three_digit_suffix() {
        assert_eq!(strip_seq_suffix("report.002.txt"), "report.txt");
    }

    #[test]
    fn strip_seq_suffix_ignores_non_three_digit() {
        assert_eq!(strip_seq_suffix("report.02.txt"), "report.02.txt");
        assert_eq!(strip_seq_suffix("report.1234.txt"), "report.1234.txt");
    }

    #[test]
    fn allocate_unique_name_returns_pretty_when_free() {
        let used = |_: &str| false;
        assert_eq!(allocate_unique_name("a.pdf", &used), "a.pdf");
    }

    #[test]
    fn allocate_unique_name_finds_first_free_slot() {
        let taken = ["a.pdf", "a_2.pdf"];
        let used = |n: &str| taken.contains(&n);
        assert_eq!(allocate_unique_name("a.pdf", &used), "a_3.pdf");
    }

    #[test]
    fn blake2b_hex_is_stable() {
        let h1 = blake2b_hex(b"hello");
        let h2 = blake2b_hex(b"hello");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 128);
    }

    #[test]
    fn sha256_and_first_n_agree_on_short_input() {
        let data = b"short";
        assert_eq!(sha256_hex(data), first_n_hash(data, FIRST_N));
    }

    #[test]
    fn first_n_hash_file_matches_in_memory_for_small_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.bin");
        std::fs::write(&path, b"hello world").unwrap();
        let from_file = first_n_hash_file(&path, FIRST_N).unwrap();
        let from_mem = first_n_hash(b"hello world", FIRST_N);
        assert_eq!(from_file, from_mem);
    }

    #[test]
    fn blake2b_hex_file_matches_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.bin");
        std::fs::write(&path, b"hello world").unwrap();
        assert_eq!(blake2b_hex_file(&path).unwrap(), blake2b_hex(b"hello world"));
    }
}
