use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "converge")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge this host to the state declared in a manifest", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Manifest file (default: $CONVERGE_MANIFEST, ./converge.toml, then the config dir)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply the manifest to this host
    Apply(ApplyArgs),

    /// Show what apply would change, without changing anything
    Plan(PlanArgs),

    /// Check the manifest for configuration errors
    Validate(OptionArgs),

    /// Show the evaluation order and apply waves
    Graph(GraphArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Option overrides shared by every manifest command
#[derive(Args, Debug, Default, Clone)]
pub struct OptionArgs {
    /// Override a manifest option (repeatable), e.g. --set manage_dhcp=true
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,
}

/// Execution tuning shared by apply and plan
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Number of resources applied in parallel within a wave
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Deadline for converging each resource (query plus apply), in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Query only; report what would change
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Write a JSON run report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Exit 2 when changes were applied, 4 on failures, 6 for both
    #[arg(long)]
    pub detailed_exitcodes: bool,

    #[command(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    pub options: OptionArgs,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Show content diffs for files that would change
    #[arg(short, long)]
    pub diff: bool,

    /// Write a JSON run report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    pub options: OptionArgs,
}

#[derive(Args)]
pub struct GraphArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = GraphFormat::Waves)]
    pub format: GraphFormat,

    #[command(flatten)]
    pub options: OptionArgs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    /// Apply waves, one block per wave
    Waves,
    /// Flat evaluation order
    Order,
    /// Graphviz dot
    Dot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::parse_from([
            "converge",
            "-m",
            "site.toml",
            "apply",
            "--dry-run",
            "-j",
            "8",
            "--set",
            "manage_dhcp=true",
            "--detailed-exitcodes",
        ]);
        assert_eq!(cli.manifest, Some(PathBuf::from("site.toml")));
        match cli.command {
            Command::Apply(args) => {
                assert!(args.dry_run);
                assert!(args.detailed_exitcodes);
                assert_eq!(args.run.jobs, Some(8));
                assert_eq!(args.options.set, vec!["manage_dhcp=true"]);
            }
            _ => panic!("expected apply"),
        }
    }
}
