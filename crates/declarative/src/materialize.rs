//! Bulk materialization of resources from external data

use crate::error::{ConfigError, Result};
use crate::resource::{Materialization, Resource};
use crate::types::{Attributes, Ensure, ResourceId};
use std::collections::HashSet;

/// One looked-up instance: name and its attributes
pub type Entry = (String, Attributes);

/// External hierarchical key/value data
///
/// `lookup` returns every entry found for a key, in hierarchy order and
/// without merging, so that an instance defined twice can be reported.
/// `Ok(None)` means the key has no data.
pub trait DataSource: Send + Sync {
    fn lookup(&self, key: &str) -> anyhow::Result<Option<Vec<Entry>>>;
}

/// Expand a materialization into resource declarations
///
/// Entry attributes are merged over the materialization defaults. An
/// `ensure` attribute overrides the default ensure. A missing data source
/// is treated as an empty mapping.
pub fn materialize(spec: &Materialization, source: Option<&dyn DataSource>) -> Result<Vec<Resource>> {
    let entries = match source {
        Some(source) => source
            .lookup(&spec.key)
            .map_err(|e| ConfigError::DataSource {
                key: spec.key.clone(),
                cause: format!("{e:#}"),
            })?
            .unwrap_or_default(),
        None => Vec::new(),
    };

    log::debug!(
        "Materializing {} {} resource(s) from '{}'",
        entries.len(),
        spec.kind,
        spec.key
    );

    let mut seen = HashSet::new();
    let mut resources = Vec::with_capacity(entries.len());

    for (name, attributes) in entries {
        let id = ResourceId::new(&spec.kind, &name);
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateResource {
                id,
                key: Some(spec.key.clone()),
            });
        }

        let mut merged = spec.defaults.clone();
        merged.extend(attributes);

        let ensure = match merged.remove("ensure") {
            None => spec.ensure,
            Some(value) => parse_ensure(&id, &value)?,
        };

        let mut resource = Resource::new(&spec.kind, &id.name)
            .ensure(ensure)
            .attributes(merged);
        resource.require = spec.require.clone();
        resource.notify = spec.notify.clone();
        resources.push(resource);
    }

    Ok(resources)
}

fn parse_ensure(id: &ResourceId, value: &serde_json::Value) -> Result<Ensure> {
    let invalid = |reason: String| ConfigError::InvalidAttribute {
        id: id.clone(),
        attribute: "ensure".to_string(),
        reason,
    };
    value
        .as_str()
        .ok_or_else(|| invalid(format!("expected a string, found {value}")))?
        .parse::<Ensure>()
        .map_err(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StaticData, attrs};
    use serde_json::json;

    fn distros() -> Materialization {
        Materialization::new("cobbler::distros", "distro")
            .default_attr("arch", "x86_64")
            .default_attr("breed", "redhat")
            .require(ResourceId::new("service", "cobblerd"))
    }

    #[test]
    fn test_missing_source_is_empty() {
        let resources = materialize(&distros(), None).unwrap();
        assert!(resources.is_empty());
    }

    #[test]
    fn test_missing_key_is_empty() {
        let data = StaticData::new();
        let resources = materialize(&distros(), Some(&data)).unwrap();
        assert!(resources.is_empty());
    }

    #[test]
    fn test_defaults_are_merged_under_entry() {
        let data = StaticData::new().entries(
            "cobbler::distros",
            vec![
                ("centos7".into(), attrs(&[("arch", json!("i386"))])),
                ("fedora".into(), attrs(&[("kernel", json!("/srv/vmlinuz"))])),
            ],
        );

        let resources = materialize(&distros(), Some(&data)).unwrap();
        assert_eq!(resources.len(), 2);

        let centos = &resources[0];
        assert_eq!(centos.id, ResourceId::new("distro", "centos7"));
        assert_eq!(centos.attributes["arch"], json!("i386"));
        assert_eq!(centos.attributes["breed"], json!("redhat"));
        assert_eq!(centos.require, vec![ResourceId::new("service", "cobblerd")]);

        let fedora = &resources[1];
        assert_eq!(fedora.attributes["arch"], json!("x86_64"));
        assert_eq!(fedora.attributes["kernel"], json!("/srv/vmlinuz"));
    }

    #[test]
    fn test_entry_ensure_override() {
        let data = StaticData::new().entries(
            "cobbler::distros",
            vec![("old".into(), attrs(&[("ensure", json!("absent"))]))],
        );
        let resources = materialize(&distros(), Some(&data)).unwrap();
        assert_eq!(resources[0].ensure, Ensure::Absent);
        assert!(!resources[0].attributes.contains_key("ensure"));
    }

    #[test]
    fn test_invalid_ensure_is_rejected() {
        let data = StaticData::new().entries(
            "cobbler::distros",
            vec![("bad".into(), attrs(&[("ensure", json!(3))]))],
        );
        let err = materialize(&distros(), Some(&data)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAttribute { .. }));
    }

    #[test]
    fn test_duplicate_entry_names_key() {
        let data = StaticData::new().entries(
            "cobbler::distros",
            vec![
                ("centos7".into(), Attributes::new()),
                ("centos7".into(), Attributes::new()),
            ],
        );

        let err = materialize(&distros(), Some(&data)).unwrap_err();
        match err {
            ConfigError::DuplicateResource { id, key } => {
                assert_eq!(id, ResourceId::new("distro", "centos7"));
                assert_eq!(key.as_deref(), Some("cobbler::distros"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_lookup_failure_is_config_error() {
        struct Broken;
        impl DataSource for Broken {
            fn lookup(&self, _key: &str) -> anyhow::Result<Option<Vec<Entry>>> {
                anyhow::bail!("unreadable layer")
            }
        }

        let err = materialize(&distros(), Some(&Broken)).unwrap_err();
        assert!(err.to_string().contains("unreadable layer"));
    }
}
