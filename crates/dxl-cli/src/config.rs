//! Process-wide configuration, resolved once from CLI flags, then
//! environment variables, then built-in defaults (CLI wins).
//!
//! Grounded on `docling-cli`'s `Config::resolve_output_format`/`resolve_backend`
//! precedence helpers, adapted to this system's single-layer (no config file)
//! CLI > env > default chain per spec.

use dxl_core::error::DxlError;
use dxl_extract::IconPathMode;
use std::path::PathBuf;

fn icon_path_mode_from_str(s: &str) -> Option<IconPathMode> {
    match s.to_ascii_lowercase().as_str() {
        "local" => Some(IconPathMode::Local),
        "shared" => Some(IconPathMode::Shared),
        _ => None,
    }
}

/// Resolved configuration shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Config {
    pub shared_icons_dir: Option<PathBuf>,
    pub icon_path_mode: IconPathMode,
    pub notes_redirect_base: Option<String>,
    pub box_search_base: Option<String>,
    pub font_path: Option<PathBuf>,
}

impl Config {
    /// Resolves configuration from CLI flags (highest precedence),
    /// environment variables, then defaults.
    ///
    /// # Errors
    /// Returns [`DxlError::Configuration`] if `--icon-path-mode`/`ICON_PATH_MODE`
    /// names neither `local` nor `shared`, or if `shared_icons_dir` cannot be
    /// created.
    pub fn resolve(
        cli_shared_icons_dir: Option<PathBuf>,
        cli_icon_path_mode: Option<&str>,
        cli_notes_redirect_base: Option<String>,
        cli_box_search_base: Option<String>,
        cli_font_path: Option<PathBuf>,
    ) -> Result<Self, DxlError> {
        let shared_icons_dir = cli_shared_icons_dir.or_else(|| std::env::var("SHARED_ICONS_DIR").ok().map(PathBuf::from));

        let icon_path_mode_str = cli_icon_path_mode.map(str::to_string).or_else(|| std::env::var("ICON_PATH_MODE").ok());
        let icon_path_mode = match icon_path_mode_str {
            None => IconPathMode::Local,
            Some(ref s) => icon_path_mode_from_str(s)
                .ok_or_else(|| DxlError::Configuration(format!("invalid icon path mode '{s}', expected 'local' or 'shared'")))?,
        };

        let notes_redirect_base = cli_notes_redirect_base.or_else(|| std::env::var("NOTES_REDIRECT_BASE").ok());
        let box_search_base = cli_box_search_base.or_else(|| std::env::var("BOX_SEARCH_BASE").ok());
        let font_path = cli_font_path.or_else(|| std::env::var("FONT_PATH").ok().map(PathBuf::from));

        if let Some(dir) = &shared_icons_dir {
            std::fs::create_dir_all(dir).map_err(|e| DxlError::Configuration(format!("cannot create shared icons dir {}: {e}", dir.display())))?;
        }

        Ok(Self { shared_icons_dir, icon_path_mode, notes_redirect_base, box_search_base, font_path })
    }

    /// Builds the [`dxl_render::RenderOptions`] this configuration implies.
    #[must_use]
    pub fn render_options(&self) -> dxl_render::RenderOptions {
        dxl_render::RenderOptions {
            notes_redirect_base: self.notes_redirect_base.clone(),
            box_search_base: self.box_search_base.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flag_wins_over_env() {
        std::env::set_var("ICON_PATH_MODE", "shared");
        let config = Config::resolve(None, Some("local"), None, None, None).unwrap();
        assert_eq!(config.icon_path_mode, IconPathMode::Local);
        std::env::remove_var("ICON_PATH_MODE");
    }

    #[test]
    fn defaults_to_local_icon_mode() {
        std::env::remove_var("ICON_PATH_MODE");
        let config = Config::resolve(None, None, None, None, None).unwrap();
        assert_eq!(config.icon_path_mode, IconPathMode::Local);
    }

    #[test]
    fn rejects_unknown_icon_path_mode() {
        let result = Config::resolve(None, Some("bogus"), None, None, None);
        assert!(result.is_err());
    }
}
