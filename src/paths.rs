//! Path resolution for converge
//!
//! # Manifest Resolution Priority
//!
//! 1. `--manifest` flag
//! 2. `CONVERGE_MANIFEST` environment variable
//! 3. `./converge.toml` in the current directory
//! 4. `<config dir>/converge/manifest.toml`:
//!    - Linux: `$XDG_CONFIG_HOME/converge` or `~/.config/converge`
//!    - macOS: `~/Library/Application Support/converge`
//!    - Windows: `%APPDATA%\converge`
//!
//! Relative paths inside a manifest (data layers, templates) are resolved
//! against the manifest's directory.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

/// Environment variable for the manifest path
pub const ENV_MANIFEST: &str = "CONVERGE_MANIFEST";

/// Manifest file name looked up in the current directory
pub const LOCAL_MANIFEST: &str = "converge.toml";

/// Get the converge config directory path
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine config directory")?;
    Ok(base.join("converge"))
}

/// Locate the manifest to load
pub fn manifest_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        let path = expand(&path.to_string_lossy());
        log::debug!("Using manifest from --manifest: {}", path.display());
        return Ok(path);
    }

    if let Ok(value) = std::env::var(ENV_MANIFEST) {
        let path = expand(&value);
        log::debug!("Using manifest from {}: {}", ENV_MANIFEST, path.display());
        return Ok(path);
    }

    let local = PathBuf::from(LOCAL_MANIFEST);
    if local.exists() {
        log::debug!("Using manifest in current directory");
        return Ok(local);
    }

    let default = config_dir()?.join("manifest.toml");
    if default.exists() {
        log::debug!("Using default manifest: {}", default.display());
        return Ok(default);
    }

    bail!(
        "No manifest found. Pass --manifest, set {}, or create ./{}",
        ENV_MANIFEST,
        LOCAL_MANIFEST
    )
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Expand a manifest-relative path
pub fn resolve(base_dir: &Path, path: &str) -> PathBuf {
    let expanded = expand(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    }
}

// ============================================================================
// Tests
// ============================================================================
