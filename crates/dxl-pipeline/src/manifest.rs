//! Manifest-driven multi-DB runs, grounded on `pipelines/flows.py`'s
//! `run_from_manifest`/`run_unified`. The live Notes connection those
//! functions drive is an external collaborator outside this system's scope;
//! here each manifest entry names a directory of already-exported DXL files
//! (`<dxl_root>/<db_file>/<unid>.xml`, the same naming `keep_dxl=True`
//! produced in the original), and the runner drives `process_document` over
//! that directory with the same resume-by-journal semantics.

use crate::journal::{read_journal, JournalStatus, JournalWriter};
use crate::orchestrator::{process_document, PipelineOptions};
use anyhow::{Context, Result};
use dxl_core::hash::sanitize_filename;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const SEGMENT_MAX_LEN: usize = 120;

/// One entry of the manifest JSON array. `server`/`view_name`/`views` are
/// part of the persisted schema but only meaningful to the external DXL
/// export collaborator; this runner ignores them and reads the directory
/// that collaborator already populated.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub title: String,
    pub db_file: String,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub view_name: Option<String>,
    #[serde(default)]
    pub views: Option<Vec<String>>,
}

/// Lists `*.xml` files directly under `dir`, sorted for deterministic runs.
fn list_dxl_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading DXL directory {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("xml")))
        .collect();
    files.sort();
    Ok(files)
}

/// Runs the pipeline over every DXL file for one DB, resuming from
/// `progress_path` per §4.8's replay rule.
///
/// # Errors
/// Returns an error only for conditions that abort the whole DB run
/// (unreadable DXL directory, unwritable journal); individual document
/// failures are journaled as `error` entries instead.
pub fn run_single_db(
    dxl_dir: &Path,
    db_title: &str,
    out_base: &Path,
    progress_path: &Path,
    pipeline_options: &PipelineOptions,
    retry_max: u32,
    retry_errors_only: bool,
    limit: Option<usize>,
) -> Result<()> {
    log::info!("starting run for DB '{db_title}' from {}", dxl_dir.display());
    std::fs::create_dir_all(out_base).with_context(|| format!("creating output base {}", out_base.display()))?;
    let writer = JournalWriter::new(progress_path)?;
    let state = read_journal(progress_path)?;

    let mut files = list_dxl_files(dxl_dir)?;
    if let Some(limit) = limit {
        files.truncate(limit);
    }
    let pairs: Vec<(String, String)> = files
        .iter()
        .filter_map(|p| p.file_stem().map(|s| (db_title.to_string(), s.to_string_lossy().into_owned())))
        .collect();

    let to_process: Vec<(String, String, u32)> = if retry_errors_only {
        pairs
            .iter()
            .filter_map(|(db, unid)| {
                let entry = state.get(&(db.clone(), unid.clone()))?;
                (entry.status == JournalStatus::Error && entry.try_count < retry_max).then(|| (db.clone(), unid.clone(), entry.try_count))
            })
            .collect()
    } else {
        crate::journal::remaining(&state, &pairs, retry_max)
    };
    log::info!("{} of {} documents to process for '{db_title}'", to_process.len(), pairs.len());

    for (db, unid, try_count) in to_process {
        let dxl_path = dxl_dir.join(format!("{unid}.xml"));
        let next_try = try_count + 1;
        writer.append(&db, &unid, JournalStatus::Processing, next_try, None, None)?;
        match process_document(&dxl_path, out_base, db_title, pipeline_options) {
            Ok(doc_dir) => writer.append(&db, &unid, JournalStatus::Done, next_try, None, Some(&doc_dir.display().to_string()))?,
            Err(e) => {
                log::error!("document {unid} failed: {e:#}");
                writer.append(&db, &unid, JournalStatus::Error, next_try, Some(&e.to_string()), None)?;
            }
        }
    }
    Ok(())
}

/// Runs every DB named in `manifest_path` against `dxl_root`, one state
/// journal per DB under `<state_base>/<safe title>/progress.jsonl`.
///
/// # Errors
/// Returns an error if the manifest file can't be read/parsed, or isn't a
/// JSON array; per-DB or per-document failures are logged and journaled,
/// not propagated.
pub fn run_manifest(
    manifest_path: &Path,
    dxl_root: &Path,
    out_base: &Path,
    state_base: &Path,
    pipeline_options: &PipelineOptions,
    retry_max: u32,
    retry_errors_only: bool,
    limit: Option<usize>,
) -> Result<()> {
    let raw = std::fs::read_to_string(manifest_path).with_context(|| format!("reading manifest {}", manifest_path.display()))?;
    let entries: Vec<ManifestEntry> = serde_json::from_str(&raw).with_context(|| format!("parsing manifest {}", manifest_path.display()))?;
    std::fs::create_dir_all(state_base)?;

    for (i, entry) in entries.iter().enumerate() {
        log::info!("--- processing DB #{} of {}: {} ---", i + 1, entries.len(), entry.title);
        let title_safe = sanitize_filename(&entry.title, SEGMENT_MAX_LEN);
        let progress_path = state_base.join(&title_safe).join("progress.jsonl");
        let dxl_dir = dxl_root.join(&entry.db_file);
        if let Err(e) = run_single_db(&dxl_dir, &entry.title, out_base, &progress_path, pipeline_options, retry_max, retry_errors_only, limit) {
            log::error!("DB '{}' failed: {e:#}", entry.title);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxl_extract::IconPathMode;
    use dxl_render::RenderOptions;

    fn options() -> PipelineOptions {
        PipelineOptions {
            icon_path_mode: IconPathMode::Local,
            shared_icons_dir: None,
            render_options: RenderOptions::default(),
            cjk_font_path: None,
            formats: vec![],
        }
    }

    #[test]
    fn parses_manifest_entries_ignoring_notes_specific_fields() {
        let json = r#"[{"title":"Sales","db_file":"sales.nsf","server":"srv1","view_name":"($All)"}]"#;
        let entries: Vec<ManifestEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Sales");
        assert_eq!(entries[0].db_file, "sales.nsf");
    }

    #[test]
    fn run_single_db_on_empty_directory_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let dxl_dir = dir.path().join("dxl");
        let out_base = dir.path().join("out");
        let progress_path = dir.path().join("state").join("progress.jsonl");
        let result = run_single_db(&dxl_dir, "Db", &out_base, &progress_path, &options(), 3, false, None);
        assert!(result.is_ok());
    }

    #[test]
    fn run_manifest_rejects_non_array_json() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("manifest.json");
        std::fs::write(&manifest_path, r#"{"not": "an array"}"#).unwrap();
        let result = run_manifest(&manifest_path, dir.path(), &dir.path().join("out"), &dir.path().join("state"), &options(), 3, false, None);
        assert!(result.is_err());
    }
}
