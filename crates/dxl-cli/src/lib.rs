//! Command-line entry point: parses DXL exports, extracts attachments,
//! renders to HTML/Markdown/DOCX/PDF, and drives the per-document
//! orchestrator over single databases or a manifest of them.
//!
//! Kept as a thin wrapper over `dxl-parser`/`dxl-extract`/`dxl-render`/
//! `dxl-pipeline`: this crate owns configuration resolution (`config`), the
//! `clap` subcommand surface (`cli`), and the directory-batch fan-out that
//! backs the standalone `normalize`/`extract`/`render` subcommands
//! (`commands`) as opposed to the full per-document pipeline the other two
//! subcommands delegate to `dxl_pipeline` for.

pub mod cli;
pub mod commands;
pub mod config;

pub use cli::{Cli, Commands};
pub use config::Config;
