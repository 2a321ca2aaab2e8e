//! Execution engine for converge
//!
//! The engine wires a manifest file to the `declarative` core:
//! 1. Loading - Parse the manifest, apply `--set` overrides, load data layers
//! 2. Planning - Compose, materialize and validate the resource graph
//! 3. Executing - Run the plan with progress, display and a JSON report

use crate::adapters::{self, Adapters};
use crate::cli::RunArgs;
use crate::config::{LoadedManifest, Options};
use crate::data::LayeredData;
use crate::paths;
use anyhow::{Context, Result};
use declarative::{CancelToken, DataSource, FeatureFlags, Plan, RunOptions};
use std::path::Path;
use std::time::Duration;

pub mod display;
pub mod progress;
pub mod report;

pub use display::{display_plan, print_summary};
pub use progress::BarProgress;
pub use report::RunRecord;

/// A loaded manifest with everything needed to plan and run it
pub struct Session {
    pub loaded: LoadedManifest,
    pub options: Options,
    pub flags: FeatureFlags,
    pub adapters: Adapters,
    data: Option<LayeredData>,
}

impl Session {
    /// Locate and load the manifest, its data layers and adapters
    pub fn load(manifest: Option<&Path>, overrides: &[String]) -> Result<Self> {
        let path = paths::manifest_path(manifest)?;
        let loaded = LoadedManifest::load(&path)?;
        let options = loaded.options(overrides)?;
        let flags = FeatureFlags::from_options(&options);

        let data = if loaded.file.data.paths.is_empty() {
            None
        } else {
            let layers: Vec<_> = loaded
                .file
                .data
                .paths
                .iter()
                .map(|p| paths::resolve(loaded.base_dir(), p))
                .collect();
            Some(LayeredData::load(&layers)?)
        };

        let adapters = adapters::build(&loaded, &options)?;

        Ok(Self {
            loaded,
            options,
            flags,
            adapters,
            data,
        })
    }

    /// Compose, materialize and validate. No adapter is called.
    pub fn plan(&self) -> Result<Plan> {
        let manifest = self.loaded.to_manifest(&self.flags)?;
        let data = self.data.as_ref().map(|d| d as &dyn DataSource);
        let plan = Plan::build(&manifest, &self.flags, data, &self.adapters.registry)
            .with_context(|| format!("Invalid manifest {}", self.loaded.path.display()))?;
        log::debug!(
            "Planned {} resource(s) in {} wave(s)",
            plan.len(),
            plan.graph().waves().len()
        );
        Ok(plan)
    }

    /// Run options: command line over `[run]` over defaults
    pub fn run_options(&self, args: &RunArgs, dry_run: bool, cancel: CancelToken) -> RunOptions {
        let defaults = RunOptions::default();
        let run = &self.loaded.file.run;
        RunOptions {
            dry_run,
            parallelism: args.jobs.or(run.jobs).unwrap_or(defaults.parallelism).max(1),
            timeout: args
                .timeout
                .or(run.timeout_secs)
                .map_or(defaults.timeout, Duration::from_secs),
            max_refresh_passes: run
                .max_refresh_passes
                .unwrap_or(defaults.max_refresh_passes),
            cancel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_manifest(dir: &TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("converge.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_and_plan_with_data_layers() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("common.toml"),
            "[\"site::dirs\".a]\n[\"site::dirs\".b]\n",
        )
        .unwrap();
        let manifest = write_manifest(
            &dir,
            r#"
[data]
paths = ["common.toml", "missing.json"]

[[materialize]]
key = "site::dirs"
kind = "directory"
"#,
        );

        let session = Session::load(Some(&manifest), &[]).unwrap();
        let plan = session.plan().unwrap();
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_run_options_precedence() {
        let dir = TempDir::new().unwrap();
        let manifest = write_manifest(&dir, "[run]\njobs = 2\ntimeout_secs = 30\n");
        let session = Session::load(Some(&manifest), &[]).unwrap();

        let opts = session.run_options(&RunArgs::default(), false, CancelToken::new());
        assert_eq!(opts.parallelism, 2);
        assert_eq!(opts.timeout, Duration::from_secs(30));
        assert_eq!(opts.max_refresh_passes, 16);

        let args = RunArgs {
            jobs: Some(0),
            timeout: Some(5),
        };
        let opts = session.run_options(&args, true, CancelToken::new());
        assert_eq!(opts.parallelism, 1);
        assert_eq!(opts.timeout, Duration::from_secs(5));
        assert!(opts.dry_run);
    }

    #[test]
    fn test_unknown_kind_is_config_error() {
        let dir = TempDir::new().unwrap();
        let manifest = write_manifest(
            &dir,
            "[[resource]]\nkind = \"package\"\nname = \"cobbler\"\n",
        );
        let session = Session::load(Some(&manifest), &[]).unwrap();
        let err = session.plan().unwrap_err();
        assert!(format!("{err:#}").contains("no adapter registered for kind 'package'"));
    }
}
