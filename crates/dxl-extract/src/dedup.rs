//! Same-name-or-dedup-name decision and atomic write.
//!
//! Mirrors the three-stage identity test: size, then first-1MiB SHA-256,
//! then full BLAKE2b. A manifest keyed by full-content hash was part of the
//! original design but its load/save were always no-ops there, so only the
//! filesystem existence checks drive reuse here.

use dxl_core::hash::{blake2b_hex, blake2b_hex_file, first_n_hash, first_n_hash_file, sanitize_filename, FIRST_N};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Outcome of [`decide_and_write`].
pub struct WriteOutcome {
    pub path: PathBuf,
    pub reused_existing: bool,
    pub size: u64,
    pub sha256_first1mib: String,
    pub blake2b: String,
}

/// Decides whether `data` matches an existing file named (a sanitized form
/// of) `pretty_name` under `out_dir`; reuses it if identical, otherwise picks
/// the first free `_2`, `_3`, ... suffix and writes atomically via a
/// temp-file-then-rename.
pub fn decide_and_write(pretty_name: &str, out_dir: &Path, data: &[u8]) -> io::Result<WriteOutcome> {
    fs::create_dir_all(out_dir)?;
    let pretty_safe = sanitize_filename(pretty_name, 200);

    let size = data.len() as u64;
    let first1 = first_n_hash(data, FIRST_N);
    let full_b2b = blake2b_hex(data);

    let candidate = out_dir.join(&pretty_safe);
    if candidate.exists() {
        if same_by_chain(&candidate, size, &first1, &full_b2b)? {
            return Ok(WriteOutcome {
                path: candidate,
                reused_existing: true,
                size,
                sha256_first1mib: first1,
                blake2b: full_b2b,
            });
        }

        let (stem, ext) = split_stem_ext(&pretty_safe);
        let mut n = 2;
        loop {
            let new_name = if ext.is_empty() {
                format!("{stem}_{n}")
            } else {
                format!("{stem}_{n}.{ext}")
            };
            let new_path = out_dir.join(&new_name);
            if !new_path.exists() {
                atomic_write(&new_path, data)?;
                return Ok(WriteOutcome {
                    path: new_path,
                    reused_existing: false,
                    size,
                    sha256_first1mib: first1,
                    blake2b: full_b2b,
                });
            }
            n += 1;
        }
    }

    atomic_write(&candidate, data)?;
    Ok(WriteOutcome {
        path: candidate,
        reused_existing: false,
        size,
        sha256_first1mib: first1,
        blake2b: full_b2b,
    })
}

fn same_by_chain(existing: &Path, size: u64, first1: &str, full_b2b: &str) -> io::Result<bool> {
    let metadata = match fs::metadata(existing) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if metadata.len() != size {
        return Ok(false);
    }
    if first_n_hash_file(existing, FIRST_N)? != first1 {
        return Ok(false);
    }
    if blake2b_hex_file(existing)? != full_b2b {
        return Ok(false);
    }
    Ok(true)
}

fn atomic_write(dest: &Path, data: &[u8]) -> io::Result<()> {
    let tmp = dest.with_extension(match dest.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    });
    fs::write(&tmp, data)?;
    fs::rename(&tmp, dest)?;
    Ok(())
}

fn split_stem_ext(name: &str) -> (String, String) {
    let path = Path::new(name);
    let stem = path.file_stem().map_or_else(|| name.to_string(), |s| s.to_string_lossy().to_string());
    let ext = path.extension().map_or_else(String::new, |e| e.to_string_lossy().to_string());
    (stem, ext)
}
