//! Exec adapter - run a command
//!
//! Attributes:
//! - `command`: the script to run (defaults to the resource name)
//! - `creates`: skip when this path exists
//! - `unless`: skip when this script exits 0
//!
//! Usually declared `refresh_only`, so the command runs once per run when
//! something it is notified by changed (e.g. `cobbler sync` after a
//! settings change).

use super::template_vars;
use crate::config::Options;
use crate::paths;
use crate::runner;
use crate::template::Renderer;
use anyhow::{Context, Result};
use declarative::{
    ApplyContext, DesiredState, Ensure, KindAdapter, ObservedState, PropertyChange, Transition,
};
use serde_json::Value;
use std::time::Duration;

/// Upper bound for `creates`/`unless` checks during a query
const GUARD_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ExecAdapter {
    options: Options,
    renderer: Renderer,
}

impl ExecAdapter {
    pub fn new(options: Options) -> Result<Self> {
        Ok(Self {
            options,
            renderer: Renderer::new()?,
        })
    }

    fn render(&self, name: &str, desired: &DesiredState, script: &str) -> Result<String> {
        let vars = template_vars(&self.options, name, Some(desired));
        Ok(self.renderer.render(script, &vars)?)
    }

    fn command(&self, name: &str, desired: &DesiredState) -> Result<String> {
        let script = desired.attr_str("command").unwrap_or(name);
        self.render(name, desired, script)
    }

    /// Whether a `creates`/`unless` guard says the command already ran
    fn satisfied(&self, name: &str, desired: &DesiredState, timeout: Duration) -> Result<bool> {
        if let Some(creates) = desired.attr_str("creates") {
            let path = paths::expand(&self.render(name, desired, creates)?);
            if path.exists() {
                log::debug!("exec[{name}]: {} exists", path.display());
                return Ok(true);
            }
        }
        if let Some(unless) = desired.attr_str("unless") {
            let script = self.render(name, desired, unless)?;
            if runner::shell(&script, timeout)?.success {
                log::debug!("exec[{name}]: guard '{script}' succeeded");
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl KindAdapter for ExecAdapter {
    /// Exec instances have no state of their own. Guards need the desired
    /// attributes, so they are evaluated in `changes` instead.
    fn query(&self, _name: &str, _ctx: &ApplyContext) -> Result<ObservedState> {
        Ok(ObservedState::absent())
    }

    fn changes(
        &self,
        name: &str,
        desired: &DesiredState,
        _observed: &ObservedState,
    ) -> Result<Vec<PropertyChange>> {
        if desired.ensure == Ensure::Absent {
            return Ok(Vec::new());
        }
        if self.satisfied(name, desired, GUARD_TIMEOUT)? {
            return Ok(Vec::new());
        }
        let command = self.command(name, desired)?;
        Ok(vec![PropertyChange::new(
            "command",
            None,
            Some(Value::from(command)),
        )])
    }

    fn apply(&self, name: &str, desired: &DesiredState, ctx: &ApplyContext) -> Result<Transition> {
        if desired.ensure == Ensure::Absent || self.satisfied(name, desired, ctx.timeout)? {
            return Ok(Transition::Unchanged);
        }

        let command = self.command(name, desired)?;
        let output = runner::shell_checked(&command, ctx.timeout)
            .with_context(|| format!("exec[{name}] failed"))?;
        for line in output.lines() {
            log::info!("exec[{name}]: {line}");
        }
        Ok(Transition::Updated)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use declarative::Attributes;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn ctx() -> ApplyContext {
        ApplyContext::new(false, Duration::from_secs(5))
    }

    fn desired(pairs: &[(&str, Value)]) -> DesiredState {
        DesiredState {
            ensure: Ensure::Present,
            attributes: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect::<Attributes>(),
        }
    }

    #[test]
    fn test_runs_command() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("synced");
        let exec = ExecAdapter::new(Options::new()).unwrap();
        let want = desired(&[("command", json!(format!("touch {}", marker.display())))]);

        let observed = exec.query("cobbler-sync", &ctx()).unwrap();
        assert!(!exec.in_sync("cobbler-sync", &want, &observed).unwrap());
        assert_eq!(exec.apply("cobbler-sync", &want, &ctx()).unwrap(), Transition::Updated);
        assert!(marker.exists());
    }

    #[test]
    fn test_creates_guard() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("initialized");
        fs::write(&marker, "").unwrap();
        let exec = ExecAdapter::new(Options::new()).unwrap();
        let want = desired(&[
            ("command", json!("exit 1")),
            ("creates", json!(marker.to_str().unwrap())),
        ]);

        let observed = exec.query("init", &ctx()).unwrap();
        assert!(exec.in_sync("init", &want, &observed).unwrap());
        assert_eq!(exec.apply("init", &want, &ctx()).unwrap(), Transition::Unchanged);
    }

    #[test]
    fn test_unless_guard() {
        let exec = ExecAdapter::new(Options::new()).unwrap();
        let want = desired(&[("command", json!("exit 1")), ("unless", json!("true"))]);
        let observed = exec.query("noop", &ctx()).unwrap();
        assert!(exec.in_sync("noop", &want, &observed).unwrap());
    }

    #[test]
    fn test_failure_is_error() {
        let exec = ExecAdapter::new(Options::new()).unwrap();
        let want = desired(&[("command", json!("echo bad >&2; exit 2"))]);
        let err = exec.apply("broken", &want, &ctx()).unwrap_err();
        assert!(format!("{err:#}").contains("bad"));
    }

    #[test]
    fn test_command_is_rendered() {
        let dir = TempDir::new().unwrap();
        let mut options = Options::new();
        options.insert("root".to_string(), json!(dir.path().to_str().unwrap()));
        let exec = ExecAdapter::new(options).unwrap();
        let want = desired(&[("command", json!("touch {{root}}/{{name}}"))]);

        exec.apply("marker", &want, &ctx()).unwrap();
        assert!(dir.path().join("marker").exists());
    }
}
