//! Manifest file schema
//!
//! ```toml
//! [options]
//! manage_dhcp = true
//! server = "10.0.0.1"
//!
//! [data]
//! paths = ["data/common.toml", "data/site.json"]
//!
//! [run]
//! jobs = 8
//!
//! [adapters.package]
//! query = "dpkg-query -W {{name}}"
//! apply = "apt-get install -y {{name}}"
//! remove = "apt-get remove -y {{name}}"
//!
//! [[resource]]
//! kind = "package"
//! name = "cobbler"
//!
//! [[resource]]
//! kind = "file"
//! name = "/etc/cobbler/dhcp.template"
//! template = "templates/dhcp.template"
//! when = "manage_dhcp"
//! notify = ["service[cobblerd]"]
//!
//! [[collection]]
//! kind = "distro"
//! purge = "purge_distro"
//!
//! [[materialize]]
//! key = "cobbler::distros"
//! kind = "distro"
//! ```
//!
//! Any key on a `[[resource]]` that is not one of the fixed fields below is
//! a desired-state attribute.

use anyhow::{Context, Result, bail};
use declarative::{
    Attributes, Ensure, FeatureFlags, FlagValue, Gate, ManagedCollection, Manifest,
    Materialization, Resource, ResourceId,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Flat option map: feature flags and free-form template values
pub type Options = BTreeMap<String, Value>;

// ============================================================================
// File Schema
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestFile {
    #[serde(default)]
    pub options: Options,

    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub run: RunConfig,

    /// Command-backed adapters, keyed by kind
    #[serde(default)]
    pub adapters: BTreeMap<String, CommandSpec>,

    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceDecl>,

    #[serde(default, rename = "collection")]
    pub collections: Vec<CollectionDecl>,

    #[serde(default, rename = "materialize")]
    pub materializations: Vec<MaterializeDecl>,
}

/// Layered data files for materializations
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    /// Lowest-priority layer first
    #[serde(default)]
    pub paths: Vec<String>,
}

/// Run defaults, overridable on the command line
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub jobs: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub max_refresh_passes: Option<usize>,
}

/// Shell command templates for one kind
///
/// Every command is rendered with `{{name}}`, `{{ensure}}`, the resource's
/// attributes and the manifest options before running under `sh -c`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSpec {
    /// Exits 0 when the instance exists; may print `key=value` lines
    pub query: Option<String>,
    /// Observed ensure when the query succeeds (default `present`)
    pub found: Option<String>,
    /// Observed ensure when the query fails (default: does not exist)
    pub missing: Option<String>,
    pub apply: Option<String>,
    pub remove: Option<String>,
    /// Run on notification, e.g. a service restart
    pub refresh: Option<String>,
    /// Prints one member name per line
    pub list: Option<String>,
    /// Removes an undeclared member; defaults to `remove`
    pub delete: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDecl {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub ensure: Option<String>,
    #[serde(default)]
    pub require: Vec<String>,
    #[serde(default)]
    pub notify: Vec<String>,
    #[serde(default)]
    pub refresh_only: bool,
    #[serde(default)]
    pub when: Option<WhenDecl>,
    #[serde(flatten)]
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionDecl {
    pub kind: String,
    #[serde(default)]
    pub purge: PurgeDecl,
    #[serde(default)]
    pub require: Vec<String>,
    #[serde(default)]
    pub when: Option<WhenDecl>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaterializeDecl {
    pub key: String,
    pub kind: String,
    #[serde(default)]
    pub ensure: Option<String>,
    #[serde(default)]
    pub defaults: Attributes,
    #[serde(default)]
    pub require: Vec<String>,
    #[serde(default)]
    pub notify: Vec<String>,
    #[serde(default)]
    pub when: Option<WhenDecl>,
}

/// `when = "flag"` or `when = { flag = "...", equals = ... }`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WhenDecl {
    Flag(String),
    Equals { flag: String, equals: FlagValue },
}

impl WhenDecl {
    fn to_gate(&self) -> Gate {
        match self {
            Self::Flag(flag) => Gate::enabled(flag),
            Self::Equals { flag, equals } => Gate::equals(flag, equals.clone()),
        }
    }
}

/// `purge = true` or `purge = "option_name"`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PurgeDecl {
    Fixed(bool),
    Option(String),
}

impl Default for PurgeDecl {
    fn default() -> Self {
        Self::Fixed(false)
    }
}

impl PurgeDecl {
    fn resolve(&self, flags: &FeatureFlags) -> bool {
        match self {
            Self::Fixed(purge) => *purge,
            Self::Option(name) => flags.enabled(name),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// A parsed manifest and where it came from
#[derive(Debug)]
pub struct LoadedManifest {
    pub path: PathBuf,
    pub file: ManifestFile,
}

impl LoadedManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read manifest: {}", path.display()))?;
        let file = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))?;
        log::debug!("Loaded manifest {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Directory relative paths in the manifest are resolved against
    pub fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Manifest options with `--set KEY=VALUE` overrides applied
    pub fn options(&self, overrides: &[String]) -> Result<Options> {
        let mut options = self.file.options.clone();
        for assignment in overrides {
            let (key, value) = parse_override(assignment)?;
            log::debug!("Option override: {key} = {value}");
            options.insert(key, value);
        }
        Ok(options)
    }

    /// Convert the file declarations into a core manifest
    ///
    /// Collections whose purge setting names an option are resolved against
    /// `flags` here, before composition.
    pub fn to_manifest(&self, flags: &FeatureFlags) -> Result<Manifest> {
        let mut manifest = Manifest::new();

        for decl in &self.file.resources {
            let resource = resource_from(decl)
                .with_context(|| format!("Invalid resource {}[{}]", decl.kind, decl.name))?;
            manifest = manifest.resource(resource);
        }

        for decl in &self.file.collections {
            let mut collection = ManagedCollection::new(&decl.kind).purge(decl.purge.resolve(flags));
            for reference in &decl.require {
                collection = collection.require(
                    parse_ref(reference)
                        .with_context(|| format!("Invalid collection '{}'", decl.kind))?,
                );
            }
            if let Some(when) = &decl.when {
                collection = collection.when(when.to_gate());
            }
            manifest = manifest.collection(collection);
        }

        for decl in &self.file.materializations {
            let materialization = materialization_from(decl)
                .with_context(|| format!("Invalid materialization '{}'", decl.key))?;
            manifest = manifest.materialize(materialization);
        }

        Ok(manifest)
    }
}

fn resource_from(decl: &ResourceDecl) -> Result<Resource> {
    let mut resource = Resource::new(&decl.kind, &decl.name).attributes(decl.attributes.clone());
    if let Some(ensure) = &decl.ensure {
        resource = resource.ensure(parse_ensure(ensure)?);
    }
    for reference in &decl.require {
        resource = resource.require(parse_ref(reference)?);
    }
    for reference in &decl.notify {
        resource = resource.notify(parse_ref(reference)?);
    }
    if decl.refresh_only {
        resource = resource.refresh_only();
    }
    if let Some(when) = &decl.when {
        resource = resource.when(when.to_gate());
    }
    Ok(resource)
}

fn materialization_from(decl: &MaterializeDecl) -> Result<Materialization> {
    let mut spec = Materialization::new(&decl.key, &decl.kind);
    if let Some(ensure) = &decl.ensure {
        spec = spec.ensure(parse_ensure(ensure)?);
    }
    for (key, value) in &decl.defaults {
        spec = spec.default_attr(key, value.clone());
    }
    for reference in &decl.require {
        spec = spec.require(parse_ref(reference)?);
    }
    for reference in &decl.notify {
        spec = spec.notify(parse_ref(reference)?);
    }
    if let Some(when) = &decl.when {
        spec = spec.when(when.to_gate());
    }
    Ok(spec)
}

fn parse_ref(reference: &str) -> Result<ResourceId> {
    Ok(reference.parse::<ResourceId>()?)
}

pub fn parse_ensure(value: &str) -> Result<Ensure> {
    value.parse::<Ensure>().map_err(anyhow::Error::msg)
}

/// Parse `KEY=VALUE`. `true`/`false` and integers keep their type.
fn parse_override(assignment: &str) -> Result<(String, Value)> {
    let Some((key, raw)) = assignment.split_once('=') else {
        bail!("Invalid option override '{assignment}' (expected KEY=VALUE)");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid option override '{assignment}' (empty key)");
    }

    let raw = raw.trim();
    let value = match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => raw
            .parse::<i64>()
            .map_or_else(|_| Value::String(raw.to_string()), Value::from),
    };
    Ok((key.to_string(), value))
}

// ============================================================================
// Tests
// ============================================================================
