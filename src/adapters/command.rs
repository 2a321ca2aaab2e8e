//! Command-backed adapter configured in the manifest
//!
//! ```toml
//! [adapters.service]
//! query = "systemctl is-active --quiet {{name}}"
//! found = "running"
//! missing = "stopped"
//! apply = "systemctl start {{name}}"
//! remove = "systemctl stop {{name}}"
//! refresh = "systemctl restart {{name}}"
//!
//! [adapters.distro]
//! query = "cobbler distro report --name={{name}} --format=kv"
//! apply = "cobbler distro add --name={{name}} --kernel={{kernel}} --initrd={{initrd}}"
//! list = "cobbler distro list"
//! delete = "cobbler distro remove --name={{name}}"
//! ```
//!
//! `query`, `list` and `delete` see only `{{name}}` and the manifest
//! options. `apply`, `remove` and `refresh` also see the resource's
//! attributes and `{{ensure}}`. Values are substituted verbatim; quote
//! them in the template where the shell needs it.

use super::template_vars;
use crate::config::{CommandSpec, Options, parse_ensure};
use crate::runner;
use crate::template::Renderer;
use anyhow::{Context, Result, bail};
use declarative::{
    ApplyContext, DesiredState, Ensure, KindAdapter, ObservedState, PropertyChange, Transition,
};
use serde_json::Value;
use std::collections::BTreeSet;

pub struct CommandAdapter {
    kind: String,
    spec: CommandSpec,
    options: Options,
    renderer: Renderer,
    found: Ensure,
    missing: Option<Ensure>,
}

impl CommandAdapter {
    pub fn new(kind: &str, spec: CommandSpec, options: Options) -> Result<Self> {
        if spec.query.is_none() {
            bail!("missing 'query' command");
        }
        if spec.apply.is_none() {
            bail!("missing 'apply' command");
        }
        if spec.delete.is_some() && spec.list.is_none() {
            bail!("'delete' needs a 'list' command to find members");
        }

        let found = spec.found.as_deref().map(parse_ensure).transpose()?;
        let missing = spec.missing.as_deref().map(parse_ensure).transpose()?;

        Ok(Self {
            kind: kind.to_string(),
            spec,
            options,
            renderer: Renderer::new()?,
            found: found.unwrap_or(Ensure::Present),
            missing,
        })
    }

    fn render(&self, script: &str, name: &str, desired: Option<&DesiredState>) -> Result<String> {
        let vars = template_vars(&self.options, name, desired);
        self.renderer
            .render(script, &vars)
            .with_context(|| format!("Failed to render command for {}[{}]", self.kind, name))
    }

    fn run(&self, script: &str, name: &str, desired: Option<&DesiredState>, ctx: &ApplyContext) -> Result<String> {
        let command = self.render(script, name, desired)?;
        runner::shell_checked(&command, ctx.timeout)
    }

    /// Whether reaching `ensure` means running `remove` rather than `apply`
    fn is_removal(&self, ensure: Ensure) -> bool {
        ensure == Ensure::Absent || self.missing == Some(ensure)
    }

    fn matches_ensure(&self, desired: Ensure, observed: Option<Ensure>) -> bool {
        match observed {
            Some(observed) => observed == desired,
            None => desired == Ensure::Absent,
        }
    }
}

/// `key=value` lines from query output; anything else is ignored
fn parse_observed(stdout: &str) -> impl Iterator<Item = (String, Value)> + '_ {
    stdout.lines().filter_map(|line| {
        let (key, value) = line.split_once('=')?;
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return None;
        }
        Some((key.to_string(), Value::from(value.trim())))
    })
}

/// Observed values are text; compare desired scalars by their text form
fn same_value(desired: &Value, observed: &Value) -> bool {
    match (desired, observed.as_str()) {
        (Value::String(d), Some(o)) => d == o,
        (Value::Bool(_) | Value::Number(_), Some(o)) => desired.to_string() == o,
        _ => desired == observed,
    }
}

impl KindAdapter for CommandAdapter {
    fn query(&self, name: &str, ctx: &ApplyContext) -> Result<ObservedState> {
        let Some(script) = &self.spec.query else {
            bail!("no query command for '{}'", self.kind);
        };
        let command = self.render(script, name, None)?;
        let output = runner::shell(&command, ctx.timeout)?;

        if !output.success {
            return Ok(ObservedState {
                ensure: self.missing,
                attributes: Default::default(),
            });
        }
        Ok(ObservedState {
            ensure: Some(self.found),
            attributes: parse_observed(&output.stdout).collect(),
        })
    }

    /// Only attributes the query reported are compared
    fn changes(
        &self,
        _name: &str,
        desired: &DesiredState,
        observed: &ObservedState,
    ) -> Result<Vec<PropertyChange>> {
        let mut changes = Vec::new();
        if !self.matches_ensure(desired.ensure, observed.ensure) {
            changes.push(PropertyChange::new(
                "ensure",
                observed.ensure.map(|e| Value::from(e.as_str())),
                Some(Value::from(desired.ensure.as_str())),
            ));
        }
        if self.is_removal(desired.ensure) {
            return Ok(changes);
        }

        for (key, wanted) in &desired.attributes {
            if let Some(current) = observed.attributes.get(key) {
                if !same_value(wanted, current) {
                    changes.push(PropertyChange::new(
                        key,
                        Some(current.clone()),
                        Some(wanted.clone()),
                    ));
                }
            }
        }
        Ok(changes)
    }

    fn apply(&self, name: &str, desired: &DesiredState, ctx: &ApplyContext) -> Result<Transition> {
        let observed = self.query(name, ctx)?;
        let in_sync = self.in_sync(name, desired, &observed)?;
        let existed = observed.exists();

        let transition = if in_sync {
            Transition::Unchanged
        } else if self.is_removal(desired.ensure) {
            let Some(remove) = &self.spec.remove else {
                bail!("no remove command for '{}'", self.kind);
            };
            self.run(remove, name, Some(desired), ctx)?;
            Transition::Removed
        } else {
            let Some(apply) = &self.spec.apply else {
                bail!("no apply command for '{}'", self.kind);
            };
            self.run(apply, name, Some(desired), ctx)?;
            if existed {
                Transition::Updated
            } else {
                Transition::Created
            }
        };

        if ctx.refresh && !self.is_removal(desired.ensure) {
            if let Some(refresh) = &self.spec.refresh {
                self.run(refresh, name, Some(desired), ctx)?;
                log::info!("Refreshed {}[{}]", self.kind, name);
            }
        }

        if transition.is_change() {
            log::info!("{}[{}]: {:?}", self.kind, name, transition);
        }
        Ok(transition)
    }

    fn supports_purge(&self) -> bool {
        self.spec.list.is_some() && (self.spec.delete.is_some() || self.spec.remove.is_some())
    }

    fn list(&self, ctx: &ApplyContext) -> Result<BTreeSet<String>> {
        let Some(script) = &self.spec.list else {
            bail!("no list command for '{}'", self.kind);
        };
        let command = self.renderer.render(script, &self.options)?;
        let stdout = runner::shell_checked(&command, ctx.timeout)?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect())
    }

    fn delete(&self, name: &str, ctx: &ApplyContext) -> Result<()> {
        let Some(script) = self.spec.delete.as_ref().or(self.spec.remove.as_ref()) else {
            bail!("no delete command for '{}'", self.kind);
        };
        self.run(script, name, None, ctx)?;
        log::info!("Deleted {}[{}]", self.kind, name);
        Ok(())
    }
}
