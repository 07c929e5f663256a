//! Subcommand surface: one `clap` derive `Parser` with one `Subcommand`
//! variant per external interface, each carrying its own flags as a nested
//! struct — the lineage's one-struct-per-subcommand layout (`docling-cli`'s
//! `Commands` enum), narrowed to this system's five operations.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dxl", about = "Normalize, extract, and render DXL exports", version)]
pub struct Cli {
    /// Directory icons are written under instead of `<attach-dir>/icons`.
    #[arg(long, global = true)]
    pub shared_icons_dir: Option<PathBuf>,

    /// `local` (default) or `shared`.
    #[arg(long, global = true)]
    pub icon_path_mode: Option<String>,

    /// URL prefix internal document links are rewritten against.
    #[arg(long, global = true)]
    pub notes_redirect_base: Option<String>,

    /// URL prefix for auxiliary external-search links.
    #[arg(long, global = true)]
    pub box_search_base: Option<String>,

    /// Font file used by the paginated (PDF) and word-processor (DOCX)
    /// renderers when a CJK glyph can't be drawn with the builtin font.
    #[arg(long, global = true)]
    pub font_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse a directory of DXL exports into normalized JSON IR.
    Normalize {
        #[arg(long)]
        dxl_dir: PathBuf,
        #[arg(long)]
        json_dir: PathBuf,
        #[arg(long)]
        db_title: String,
    },
    /// Extract attachment payloads for a directory of normalized JSON files
    /// (each with a matching `*.xml` of the same stem).
    Extract {
        #[arg(long)]
        dxl_dir: PathBuf,
        #[arg(long)]
        json_dir: PathBuf,
        #[arg(long)]
        attach_dir: PathBuf,
    },
    /// Render a directory of normalized JSON files to one or more formats.
    Render {
        #[arg(long)]
        json_dir: PathBuf,
        #[arg(long, conflicts_with = "inplace")]
        out: Option<PathBuf>,
        #[arg(long, conflicts_with = "out")]
        inplace: bool,
        #[arg(long)]
        recursive: bool,
        /// Comma-separated format list: any of `html`, `md`, `docx`, `pdf`.
        #[arg(long, value_delimiter = ',')]
        formats: Vec<String>,
    },
    /// Run the full per-document pipeline over one DB's directory of DXL
    /// files (an external export collaborator is assumed to have populated
    /// it; this process never talks to a live Notes server).
    RunSingleDb {
        #[arg(long)]
        dxl_dir: PathBuf,
        #[arg(long)]
        db_title: String,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        state: PathBuf,
        #[arg(long, value_delimiter = ',')]
        formats: Vec<String>,
        #[arg(long, default_value_t = 3)]
        retry_max: u32,
        #[arg(long)]
        retry_errors_only: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Run the full per-document pipeline for every DB named in a manifest.
    RunManifest {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        dxl_root: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        state: PathBuf,
        #[arg(long, value_delimiter = ',')]
        formats: Vec<String>,
        #[arg(long, default_value_t = 3)]
        retry_max: u32,
        #[arg(long)]
        retry_errors_only: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
}
