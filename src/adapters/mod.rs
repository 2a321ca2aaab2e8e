//! Host adapters for the resource kinds a manifest can declare
//!
//! Built in:
//! - `file`: managed file content (literal or rendered template) and mode
//! - `directory`: directories and their mode
//! - `exec`: commands guarded by `creates`/`unless`, usually refresh-only
//!
//! Every other kind (package, service, distro, ...) is command-backed and
//! configured under `[adapters.<kind>]`. A command adapter replaces a
//! built-in of the same kind.

use crate::config::{LoadedManifest, Options};
use crate::template::Vars;
use anyhow::{Context, Result};
use declarative::{AdapterRegistry, DesiredState};
use std::sync::Arc;

pub mod command;
pub mod directory;
pub mod exec;
pub mod file;

pub use command::CommandAdapter;
pub use directory::DirectoryAdapter;
pub use exec::ExecAdapter;
pub use file::FileAdapter;

/// Registered adapters plus the handles commands need directly
pub struct Adapters {
    pub registry: AdapterRegistry,
    /// Built-in file adapter, unless the manifest replaced it
    pub files: Option<Arc<FileAdapter>>,
}

/// Build the adapter registry for a loaded manifest
pub fn build(loaded: &LoadedManifest, options: &Options) -> Result<Adapters> {
    let mut registry = AdapterRegistry::new();

    let files = Arc::new(FileAdapter::new(loaded.base_dir(), options.clone())?);
    registry
        .register_shared("file", Arc::clone(&files) as _)
        .register("directory", DirectoryAdapter)
        .register("exec", ExecAdapter::new(options.clone())?);

    let mut files = Some(files);
    for (kind, spec) in &loaded.file.adapters {
        if registry.contains(kind) {
            log::info!("Adapter '{kind}' from the manifest replaces the built-in one");
        }
        if kind == "file" {
            files = None;
        }
        let adapter = CommandAdapter::new(kind, spec.clone(), options.clone())
            .with_context(|| format!("Invalid adapter '{kind}'"))?;
        registry.register(kind.as_str(), adapter);
    }

    log::debug!("Registered adapters: {}", registry.kinds().join(", "));
    Ok(Adapters { registry, files })
}

/// Variables for rendering: options, then the resource's attributes,
/// then `name` and `ensure`
pub(crate) fn template_vars(options: &Options, name: &str, desired: Option<&DesiredState>) -> Vars {
    let mut vars = options.clone();
    if let Some(desired) = desired {
        vars.extend(
            desired
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        vars.insert("ensure".to_string(), desired.ensure.as_str().into());
    }
    vars.insert("name".to_string(), name.into());
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Attributes, Ensure};
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_attributes_shadow_options() {
        let mut options = Options::new();
        options.insert("server".to_string(), json!("10.0.0.1"));
        options.insert("port".to_string(), json!(80));

        let mut attributes = Attributes::new();
        attributes.insert("port".to_string(), json!(25151));
        let desired = DesiredState {
            ensure: Ensure::Running,
            attributes,
        };

        let vars = template_vars(&options, "cobblerd", Some(&desired));
        assert_eq!(vars["server"], json!("10.0.0.1"));
        assert_eq!(vars["port"], json!(25151));
        assert_eq!(vars["name"], json!("cobblerd"));
        assert_eq!(vars["ensure"], json!("running"));
    }

    #[test]
    fn test_manifest_adapter_replaces_builtin() {
        let mut manifest = NamedTempFile::new().unwrap();
        manifest
            .write_all(
                br#"
[adapters.package]
query = "true"
apply = "true"

[adapters.file]
query = "test -e {{name}}"
apply = "touch {{name}}"
"#,
            )
            .unwrap();
        let loaded = LoadedManifest::load(manifest.path()).unwrap();
        let adapters = build(&loaded, &Options::new()).unwrap();

        assert_eq!(
            adapters.registry.kinds(),
            vec!["directory", "exec", "file", "package"]
        );
        assert!(adapters.files.is_none());
    }
}
