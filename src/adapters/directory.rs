//! Directory adapter
//!
//! Attributes: `mode` (octal), `force` (remove non-empty directories).

use super::file::{current_mode, desired_mode, format_mode, mode_change, set_mode};
use crate::paths;
use anyhow::{Context, Result, bail};
use declarative::{
    ApplyContext, DesiredState, Ensure, KindAdapter, ObservedState, PropertyChange, Transition,
};
use serde_json::Value;
use std::fs;

pub struct DirectoryAdapter;

impl KindAdapter for DirectoryAdapter {
    fn query(&self, name: &str, _ctx: &ApplyContext) -> Result<ObservedState> {
        let path = paths::expand(name);
        if !path.exists() {
            return Ok(ObservedState::absent());
        }
        if !path.is_dir() {
            return Ok(ObservedState::with_ensure(Ensure::File));
        }
        let mut observed = ObservedState::with_ensure(Ensure::Directory);
        if let Some(mode) = current_mode(&path)? {
            observed = observed.attr("mode", format_mode(mode));
        }
        Ok(observed)
    }

    fn changes(
        &self,
        _name: &str,
        desired: &DesiredState,
        observed: &ObservedState,
    ) -> Result<Vec<PropertyChange>> {
        let from_ensure = observed.ensure.map(|e| Value::from(e.as_str()));

        if desired.ensure == Ensure::Absent {
            return Ok(if observed.exists() {
                vec![PropertyChange::new("ensure", from_ensure, Some("absent".into()))]
            } else {
                Vec::new()
            });
        }

        let mut changes = Vec::new();
        if observed.ensure != Some(Ensure::Directory) {
            changes.push(PropertyChange::new(
                "ensure",
                from_ensure,
                Some("directory".into()),
            ));
        }
        changes.extend(mode_change(desired, observed)?);
        Ok(changes)
    }

    fn apply(&self, name: &str, desired: &DesiredState, _ctx: &ApplyContext) -> Result<Transition> {
        let path = paths::expand(name);

        if desired.ensure == Ensure::Absent {
            if !path.exists() {
                return Ok(Transition::Unchanged);
            }
            if !path.is_dir() {
                bail!("{} is not a directory", path.display());
            }
            let force = desired
                .attributes
                .get("force")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if force {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_dir(&path)
            }
            .with_context(|| format!("Failed to remove {}", path.display()))?;
            log::info!("Removed {}", path.display());
            return Ok(Transition::Removed);
        }

        if path.exists() && !path.is_dir() {
            bail!("{} exists and is not a directory", path.display());
        }

        let existed = path.exists();
        if !existed {
            fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create directory: {}", path.display()))?;
            log::info!("Created {}", path.display());
        }

        let mut changed = false;
        if let Some(mode) = desired_mode(desired)? {
            if current_mode(&path)? != Some(mode) {
                set_mode(&path, mode)?;
                changed = true;
            }
        }

        Ok(match (existed, changed) {
            (false, _) => Transition::Created,
            (true, true) => Transition::Updated,
            (true, false) => Transition::Unchanged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::Attributes;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn ctx() -> ApplyContext {
        ApplyContext::new(false, Duration::from_secs(5))
    }

    fn desired(ensure: Ensure, pairs: &[(&str, Value)]) -> DesiredState {
        DesiredState {
            ensure,
            attributes: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect::<Attributes>(),
        }
    }

    #[test]
    fn test_create_nested() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("srv/tftp/pxelinux.cfg");
        let name = path.to_str().unwrap();
        let want = desired(Ensure::Directory, &[]);

        let observed = DirectoryAdapter.query(name, &ctx()).unwrap();
        assert!(!DirectoryAdapter.in_sync(name, &want, &observed).unwrap());
        assert_eq!(DirectoryAdapter.apply(name, &want, &ctx()).unwrap(), Transition::Created);
        assert!(path.is_dir());

        let observed = DirectoryAdapter.query(name, &ctx()).unwrap();
        assert!(DirectoryAdapter.in_sync(name, &want, &observed).unwrap());
    }

    #[test]
    fn test_present_means_directory() {
        let dir = TempDir::new().unwrap();
        let name = dir.path().to_str().unwrap();
        let observed = DirectoryAdapter.query(name, &ctx()).unwrap();
        assert!(DirectoryAdapter.in_sync(name, &desired(Ensure::Present, &[]), &observed).unwrap());
    }

    #[test]
    fn test_file_in_the_way_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("occupied");
        fs::write(&path, "x").unwrap();
        let result = DirectoryAdapter.apply(path.to_str().unwrap(), &desired(Ensure::Directory, &[]), &ctx());
        assert!(result.is_err());
    }

    #[test]
    fn test_remove_requires_force_when_not_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("images");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("vmlinuz"), "x").unwrap();
        let name = path.to_str().unwrap();

        assert!(DirectoryAdapter.apply(name, &desired(Ensure::Absent, &[]), &ctx()).is_err());
        let forced = desired(Ensure::Absent, &[("force", json!(true))]);
        assert_eq!(DirectoryAdapter.apply(name, &forced, &ctx()).unwrap(), Transition::Removed);
        assert!(!path.exists());
    }
}
