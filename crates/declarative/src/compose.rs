//! Conditional composition
//!
//! Feature flags are resolved once from the option map at the start of a
//! run. Every gated declaration is then either kept or dropped before the
//! graph is built, so the run itself never branches on a flag.

use crate::resource::{ManagedCollection, Manifest, Materialization, Resource};
use crate::types::ResourceId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Resolved value of a feature flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Text(String),
}

impl FlagValue {
    /// Booleans as-is; text is true unless empty or a false-like word
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Text(t) => {
                let t = t.trim();
                !(t.is_empty()
                    || ["false", "no", "off", "0"]
                        .iter()
                        .any(|f| t.eq_ignore_ascii_case(f)))
            }
        }
    }

    fn matches(&self, expected: &Self) -> bool {
        match (self, expected) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
            (Self::Bool(b), Self::Text(t)) | (Self::Text(t), Self::Bool(b)) => {
                t.trim().eq_ignore_ascii_case(if *b { "true" } else { "false" })
            }
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(t) => f.write_str(t),
        }
    }
}

impl From<bool> for FlagValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for FlagValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Feature flags for one run. A flag missing from the set is unset,
/// which closes every gate that names it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    flags: BTreeMap<String, FlagValue>,
}

impl FeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve flags from a flat option map
    ///
    /// Booleans, strings and numbers become flags. Null, arrays and tables
    /// are free-form attributes, not flags, and stay unset.
    pub fn from_options(options: &BTreeMap<String, Value>) -> Self {
        let flags = options
            .iter()
            .filter_map(|(name, value)| {
                let flag = match value {
                    Value::Bool(b) => FlagValue::Bool(*b),
                    Value::String(s) => FlagValue::Text(s.clone()),
                    Value::Number(n) => FlagValue::Text(n.to_string()),
                    _ => return None,
                };
                Some((name.clone(), flag))
            })
            .collect();
        Self { flags }
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<FlagValue>) -> Self {
        self.flags.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FlagValue> {
        self.flags.get(name)
    }

    /// Whether the flag is set and truthy
    pub fn enabled(&self, name: &str) -> bool {
        self.get(name).is_some_and(FlagValue::is_truthy)
    }
}

/// Condition under which a declaration is included
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    pub flag: String,
    /// Required value; `None` means "flag is truthy"
    #[serde(default)]
    pub equals: Option<FlagValue>,
}

impl Gate {
    /// Open when the flag is truthy
    pub fn enabled(flag: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            equals: None,
        }
    }

    /// Open when the flag equals a value
    pub fn equals(flag: impl Into<String>, value: impl Into<FlagValue>) -> Self {
        Self {
            flag: flag.into(),
            equals: Some(value.into()),
        }
    }

    pub fn is_open(&self, flags: &FeatureFlags) -> bool {
        match (flags.get(&self.flag), &self.equals) {
            (None, _) => false,
            (Some(value), None) => value.is_truthy(),
            (Some(value), Some(expected)) => value.matches(expected),
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.equals {
            None => f.write_str(&self.flag),
            Some(value) => write!(f, "{}={}", self.flag, value),
        }
    }
}

/// Declarations that survived gating, in declaration order
#[derive(Debug, Default)]
pub struct Composition<'m> {
    pub resources: Vec<Resource>,
    pub collections: Vec<&'m ManagedCollection>,
    pub materializations: Vec<&'m Materialization>,
    /// Declared resources dropped by a closed gate
    pub excluded: HashMap<ResourceId, Gate>,
    /// Materializations dropped by a closed gate, with that gate
    pub gated_materializations: Vec<(&'m Materialization, Gate)>,
}

fn is_included(gate: Option<&Gate>, flags: &FeatureFlags) -> bool {
    gate.is_none_or(|g| g.is_open(flags))
}

/// Apply feature flags to a manifest
pub fn compose<'m>(manifest: &'m Manifest, flags: &FeatureFlags) -> Composition<'m> {
    let mut composition = Composition::default();

    for resource in &manifest.resources {
        match &resource.gate {
            Some(gate) if !gate.is_open(flags) => {
                log::debug!("Excluding {} (gate '{}' closed)", resource.id, gate);
                composition
                    .excluded
                    .insert(resource.id.clone(), gate.clone());
            }
            _ => composition.resources.push(resource.clone()),
        }
    }

    composition.collections = manifest
        .collections
        .iter()
        .filter(|c| is_included(c.gate.as_ref(), flags))
        .collect();

    for spec in &manifest.materializations {
        match &spec.gate {
            Some(gate) if !gate.is_open(flags) => {
                log::debug!("Excluding materialization of '{}' (gate '{}' closed)", spec.key, gate);
                composition.gated_materializations.push((spec, gate.clone()));
            }
            _ => composition.materializations.push(spec),
        }
    }

    composition
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest() -> Manifest {
        Manifest::new()
            .resource(Resource::new("package", "cobbler"))
            .resource(Resource::new("package", "dhcp").when(Gate::enabled("manage_dhcp")))
            .resource(Resource::new("service", "cobblerd"))
            .resource(Resource::new("file", "/etc/cobbler/dhcp.template").when(Gate::enabled("manage_dhcp")))
            .resource(Resource::new("package", "bind").when(Gate::equals("manage_dns", "bind")))
    }

    fn names(c: &Composition<'_>) -> Vec<String> {
        c.resources.iter().map(|r| r.id.to_string()).collect()
    }

    #[test]
    fn test_flags_from_options() {
        let mut options = BTreeMap::new();
        options.insert("manage_dhcp".to_string(), json!(true));
        options.insert("manage_dns".to_string(), json!("bind"));
        options.insert("nameservers".to_string(), json!(["10.0.0.1"]));
        options.insert("port".to_string(), json!(80));

        let flags = FeatureFlags::from_options(&options);
        assert!(flags.enabled("manage_dhcp"));
        assert_eq!(flags.get("manage_dns"), Some(&FlagValue::Text("bind".into())));
        assert!(flags.get("nameservers").is_none());
        assert_eq!(flags.get("port"), Some(&FlagValue::Text("80".into())));
    }

    #[test]
    fn test_text_truthiness() {
        assert!(FlagValue::from("isc").is_truthy());
        assert!(!FlagValue::from("false").is_truthy());
        assert!(!FlagValue::from("").is_truthy());
        assert!(!FlagValue::from("Off").is_truthy());
    }

    #[test]
    fn test_unset_flag_closes_gate() {
        let gate = Gate::enabled("manage_tftp");
        assert!(!gate.is_open(&FeatureFlags::new()));
        assert!(!Gate::equals("manage_tftp", false).is_open(&FeatureFlags::new()));
    }

    #[test]
    fn test_equals_gate() {
        let flags = FeatureFlags::new().set("manage_dns", "BIND");
        assert!(Gate::equals("manage_dns", "bind").is_open(&flags));
        assert!(!Gate::equals("manage_dns", "dnsmasq").is_open(&flags));

        let flags = FeatureFlags::new().set("manage_dns", true);
        assert!(Gate::equals("manage_dns", "true").is_open(&flags));
    }

    #[test]
    fn test_disabled_flag_removes_subgraph() {
        let m = manifest();
        let c = compose(&m, &FeatureFlags::new().set("manage_dhcp", false));
        assert_eq!(names(&c), vec!["package[cobbler]", "service[cobblerd]"]);
        assert_eq!(c.excluded.len(), 3);
        assert_eq!(
            c.excluded[&ResourceId::new("package", "dhcp")].to_string(),
            "manage_dhcp"
        );
    }

    #[test]
    fn test_enabled_flag_restores_declaration_order() {
        let m = manifest();
        let c = compose(
            &m,
            &FeatureFlags::new()
                .set("manage_dhcp", true)
                .set("manage_dns", "bind"),
        );
        assert_eq!(
            names(&c),
            vec![
                "package[cobbler]",
                "package[dhcp]",
                "service[cobblerd]",
                "file[/etc/cobbler/dhcp.template]",
                "package[bind]",
            ]
        );
        assert!(c.excluded.is_empty());
    }
}
