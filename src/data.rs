//! Layered key/value data for materializations
//!
//! Each file in `[data].paths` is one layer, lowest priority first. A layer
//! is a table keyed by lookup key; each key holds a table of instance name
//! to attributes:
//!
//! ```toml
//! ["cobbler::distros".centos7]
//! arch = "x86_64"
//! kernel = "/srv/centos7/vmlinuz"
//! ```

use anyhow::{Context, Result, bail};
use declarative::{Attributes, DataSource, Entry};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// One loaded data file
#[derive(Debug)]
struct Layer {
    path: PathBuf,
    root: Map<String, Value>,
}

/// Data source made of ordered file layers
#[derive(Debug, Default)]
pub struct LayeredData {
    layers: Vec<Layer>,
}

impl LayeredData {
    /// Load every layer that exists. Missing files are skipped.
    pub fn load(paths: &[PathBuf]) -> Result<Self> {
        let mut layers = Vec::new();
        for path in paths {
            if !path.exists() {
                log::debug!("Skipping missing data layer {}", path.display());
                continue;
            }
            let root = load_layer(path)?;
            log::debug!("Loaded data layer {} ({} keys)", path.display(), root.len());
            layers.push(Layer {
                path: path.clone(),
                root,
            });
        }
        Ok(Self { layers })
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

fn load_layer(path: &Path) -> Result<Map<String, Value>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read data layer: {}", path.display()))?;

    let value = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str::<Value>(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?,
        Some("toml") => {
            let table: toml::Table = toml::from_str(&content)
                .with_context(|| format!("Invalid TOML format in {}", path.display()))?;
            serde_json::to_value(table)?
        }
        _ => bail!(
            "Unsupported data layer {} (expected .toml or .json)",
            path.display()
        ),
    };

    match value {
        Value::Object(root) => Ok(root),
        _ => bail!("Data layer {} must be a table", path.display()),
    }
}

impl DataSource for LayeredData {
    /// Entries of `key` from every layer, concatenated in layer order
    fn lookup(&self, key: &str) -> Result<Option<Vec<Entry>>> {
        let mut found = false;
        let mut entries = Vec::new();

        for layer in &self.layers {
            let Some(value) = layer.root.get(key) else {
                continue;
            };
            found = true;
            let Value::Object(instances) = value else {
                bail!("'{}' in {} must be a table of instances", key, layer.path.display());
            };
            for (name, attributes) in instances {
                entries.push((name.clone(), entry_attributes(layer, key, name, attributes)?));
            }
        }

        Ok(found.then_some(entries))
    }
}

fn entry_attributes(layer: &Layer, key: &str, name: &str, value: &Value) -> Result<Attributes> {
    match value {
        Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        _ => bail!(
            "'{}.{}' in {} must be a table of attributes",
            key,
            name,
            layer.path.display()
        ),
    }
}
