//! File adapter - managed content and mode
//!
//! Attributes:
//! - `content`: literal content, rendered as a template
//! - `template`: path to a template file, relative to the manifest
//! - `mode`: octal permissions, `"0644"` or `0o644`
//!
//! Without `content` or `template` only existence (and mode) is managed.
//! Content is compared by blake3 digest so large files never end up in a
//! run report.

use super::template_vars;
use crate::config::Options;
use crate::paths;
use crate::template::Renderer;
use anyhow::{Context, Result, bail};
use declarative::{
    ApplyContext, DesiredState, Ensure, KindAdapter, ObservedState, PropertyChange, Transition,
};
use serde_json::Value;
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::path::{Path, PathBuf};

pub struct FileAdapter {
    base_dir: PathBuf,
    options: Options,
    renderer: Renderer,
}

impl FileAdapter {
    pub fn new(base_dir: &Path, options: Options) -> Result<Self> {
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            options,
            renderer: Renderer::new()?,
        })
    }

    /// Content the file should have, if content is managed
    fn desired_content(&self, name: &str, desired: &DesiredState) -> Result<Option<String>> {
        let source = match (desired.attr_str("content"), desired.attr_str("template")) {
            (Some(_), Some(_)) => bail!("'content' and 'template' are mutually exclusive"),
            (Some(content), None) => content.to_string(),
            (None, Some(template)) => {
                let path = paths::resolve(&self.base_dir, template);
                fs::read_to_string(&path)
                    .with_context(|| format!("Could not read template: {}", path.display()))?
            }
            (None, None) => return Ok(None),
        };

        let vars = template_vars(&self.options, name, Some(desired));
        let rendered = self
            .renderer
            .render(&source, &vars)
            .with_context(|| format!("Failed to render content for {name}"))?;
        Ok(Some(rendered))
    }

    /// Unified diff between the file on disk and its desired content
    ///
    /// `None` when content is not managed or already matches.
    pub fn content_diff(&self, name: &str, desired: &DesiredState) -> Result<Option<String>> {
        if desired.ensure == Ensure::Absent {
            return Ok(None);
        }
        let Some(wanted) = self.desired_content(name, desired)? else {
            return Ok(None);
        };
        let path = paths::expand(name);
        let current = if path.is_file() {
            fs::read_to_string(&path).unwrap_or_default()
        } else {
            String::new()
        };
        if current == wanted {
            return Ok(None);
        }

        let diff = TextDiff::from_lines(&current, &wanted);
        let mut out = String::new();
        for change in diff.iter_all_changes() {
            let sign = match change.tag() {
                ChangeTag::Delete => "-",
                ChangeTag::Insert => "+",
                ChangeTag::Equal => " ",
            };
            out.push_str(sign);
            out.push_str(change.value());
            if change.missing_newline() {
                out.push('\n');
            }
        }
        Ok(Some(out))
    }
}

fn digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn short(digest: &str) -> String {
    digest.chars().take(12).collect()
}

/// Parse a `mode` attribute into permission bits
pub(crate) fn parse_mode(value: &Value) -> Result<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|m| u32::try_from(m).ok())
            .filter(|m| *m <= 0o7777)
            .with_context(|| format!("invalid mode {n}")),
        Value::String(s) => {
            let digits = s.trim().trim_start_matches("0o");
            u32::from_str_radix(digits, 8)
                .ok()
                .filter(|m| *m <= 0o7777)
                .with_context(|| format!("invalid mode '{s}'"))
        }
        other => bail!("invalid mode {other}"),
    }
}

pub(crate) fn format_mode(mode: u32) -> String {
    format!("{:04o}", mode & 0o7777)
}

#[cfg(unix)]
pub(crate) fn current_mode(path: &Path) -> Result<Option<u32>> {
    use std::os::unix::fs::PermissionsExt;
    let meta = fs::metadata(path).with_context(|| format!("Failed to stat {}", path.display()))?;
    Ok(Some(meta.permissions().mode() & 0o7777))
}

#[cfg(not(unix))]
pub(crate) fn current_mode(_path: &Path) -> Result<Option<u32>> {
    Ok(None)
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to set mode on {}", path.display()))
}

#[cfg(not(unix))]
pub(crate) fn set_mode(path: &Path, _mode: u32) -> Result<()> {
    log::warn!("Ignoring mode for {}: not supported on this platform", path.display());
    Ok(())
}

/// Desired mode, if the resource declares one
pub(crate) fn desired_mode(desired: &DesiredState) -> Result<Option<u32>> {
    desired.attributes.get("mode").map(parse_mode).transpose()
}

/// Mode change needed, comparing against the observed `mode` attribute
pub(crate) fn mode_change(
    desired: &DesiredState,
    observed: &ObservedState,
) -> Result<Option<PropertyChange>> {
    let Some(mode) = desired_mode(desired)? else {
        return Ok(None);
    };
    let wanted = format_mode(mode);
    let current = observed.attributes.get("mode").and_then(Value::as_str);
    if current == Some(wanted.as_str()) || (current.is_none() && observed.exists()) {
        // Platforms without modes report none; nothing to compare against
        return Ok(None);
    }
    Ok(Some(PropertyChange::new(
        "mode",
        current.map(Value::from),
        Some(Value::from(wanted)),
    )))
}

impl KindAdapter for FileAdapter {
    fn query(&self, name: &str, _ctx: &ApplyContext) -> Result<ObservedState> {
        let path = paths::expand(name);
        if !path.exists() {
            return Ok(ObservedState::absent());
        }
        if path.is_dir() {
            return Ok(ObservedState::with_ensure(Ensure::Directory));
        }

        let bytes = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let mut observed = ObservedState::with_ensure(Ensure::File).attr("digest", digest(&bytes));
        if let Some(mode) = current_mode(&path)? {
            observed = observed.attr("mode", format_mode(mode));
        }
        Ok(observed)
    }

    fn changes(
        &self,
        name: &str,
        desired: &DesiredState,
        observed: &ObservedState,
    ) -> Result<Vec<PropertyChange>> {
        let from_ensure = observed.ensure.map(|e| Value::from(e.as_str()));

        if desired.ensure == Ensure::Absent {
            return Ok(if observed.exists() {
                vec![PropertyChange::new(
                    "ensure",
                    from_ensure,
                    Some(Value::from("absent")),
                )]
            } else {
                Vec::new()
            });
        }

        let mut changes = Vec::new();
        if observed.ensure != Some(Ensure::File) {
            changes.push(PropertyChange::new(
                "ensure",
                from_ensure,
                Some(Value::from("file")),
            ));
        }

        if let Some(content) = self.desired_content(name, desired)? {
            let wanted = digest(content.as_bytes());
            let current = observed.attributes.get("digest").and_then(Value::as_str);
            if current != Some(wanted.as_str()) {
                changes.push(PropertyChange::new(
                    "content",
                    current.map(|d| Value::from(short(d))),
                    Some(Value::from(short(&wanted))),
                ));
            }
        }

        changes.extend(mode_change(desired, observed)?);
        Ok(changes)
    }

    fn apply(&self, name: &str, desired: &DesiredState, _ctx: &ApplyContext) -> Result<Transition> {
        let path = paths::expand(name);

        if desired.ensure == Ensure::Absent {
            if path.is_dir() {
                bail!("{} is a directory, not a file", path.display());
            }
            if !path.exists() {
                return Ok(Transition::Unchanged);
            }
            fs::remove_file(&path).with_context(|| format!("Failed to remove {}", path.display()))?;
            log::info!("Removed {}", path.display());
            return Ok(Transition::Removed);
        }

        if path.is_dir() {
            bail!("{} is a directory, not a file", path.display());
        }

        let existed = path.exists();
        let mut changed = false;

        let content = self.desired_content(name, desired)?;
        let current = if existed { Some(fs::read(&path)?) } else { None };
        let write = match (&content, &current) {
            (Some(wanted), Some(bytes)) => wanted.as_bytes() != bytes.as_slice(),
            (Some(_), None) | (None, None) => true,
            (None, Some(_)) => false,
        };

        if write {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create parent directory: {}", parent.display())
                })?;
            }
            fs::write(&path, content.unwrap_or_default())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            changed = true;
        }

        if let Some(mode) = desired_mode(desired)? {
            if current_mode(&path)? != Some(mode) {
                set_mode(&path, mode)?;
                changed = true;
            }
        }

        Ok(match (existed, changed) {
            (false, _) => {
                log::info!("Created {}", path.display());
                Transition::Created
            }
            (true, true) => {
                log::info!("Updated {}", path.display());
                Transition::Updated
            }
            (true, false) => Transition::Unchanged,
        })
    }
}
