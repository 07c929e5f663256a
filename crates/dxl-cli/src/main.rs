use anyhow::{Context, Result};
use clap::Parser;
use dxl_cli::cli::{Cli, Commands};
use dxl_cli::config::Config;
use dxl_cli::commands::{extract_directory, normalize_directory, render_directory};
use dxl_pipeline::{run_manifest, run_single_db, OutputFormat, PipelineOptions};

fn parse_formats(names: &[String]) -> Result<Vec<OutputFormat>> {
    names
        .iter()
        .map(|name| OutputFormat::parse(name).with_context(|| format!("unknown output format '{name}'")))
        .collect()
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::resolve(
        cli.shared_icons_dir.clone(),
        cli.icon_path_mode.as_deref(),
        cli.notes_redirect_base.clone(),
        cli.box_search_base.clone(),
        cli.font_path.clone(),
    )?;

    match cli.command {
        Commands::Normalize { dxl_dir, json_dir, db_title } => {
            normalize_directory(&dxl_dir, &json_dir, &db_title)?;
        }
        Commands::Extract { dxl_dir, json_dir, attach_dir } => {
            extract_directory(&dxl_dir, &json_dir, &attach_dir, config.shared_icons_dir.as_deref(), config.icon_path_mode)?;
        }
        Commands::Render { json_dir, out, inplace, recursive, formats } => {
            let formats = parse_formats(&formats)?;
            render_directory(&json_dir, out.as_deref(), inplace, recursive, &formats, &config.render_options(), config.font_path.as_deref())?;
        }
        Commands::RunSingleDb { dxl_dir, db_title, out, state, formats, retry_max, retry_errors_only, limit } => {
            let formats = parse_formats(&formats)?;
            let options = PipelineOptions {
                icon_path_mode: config.icon_path_mode,
                shared_icons_dir: config.shared_icons_dir.clone(),
                render_options: config.render_options(),
                cjk_font_path: config.font_path.clone(),
                formats,
            };
            run_single_db(&dxl_dir, &db_title, &out, &state, &options, retry_max, retry_errors_only, limit)?;
        }
        Commands::RunManifest { manifest, dxl_root, out, state, formats, retry_max, retry_errors_only, limit } => {
            let formats = parse_formats(&formats)?;
            let options = PipelineOptions {
                icon_path_mode: config.icon_path_mode,
                shared_icons_dir: config.shared_icons_dir.clone(),
                render_options: config.render_options(),
                cjk_font_path: config.font_path.clone(),
                formats,
            };
            run_manifest(&manifest, &dxl_root, &out, &state, &options, retry_max, retry_errors_only, limit)?;
        }
    }

    Ok(())
}
