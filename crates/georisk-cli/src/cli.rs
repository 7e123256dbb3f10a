use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level parser for the `georisk` binary.
#[derive(Debug, Parser)]
#[command(
    name = "georisk",
    version,
    about = "Generate AI-scored geopolitical risk reports"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Assess every (category, country) pair and write the report
    Run(RunArgs),

    /// Validate a risk matrix
    Validate(ValidateArgs),

    /// Convert a report CSV into JSON
    Convert(ConvertArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Risk matrix (YAML or JSON). Defaults to the built-in matrix
    #[arg(short, long)]
    pub matrix: Option<PathBuf>,

    /// Runtime configuration (YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// API keys (YAML or JSON map). Environment variables are used otherwise
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Restrict the run to these category ids (repeatable)
    #[arg(long = "category", value_name = "ID")]
    pub categories: Vec<String>,

    /// Directory for report files
    #[arg(short, long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Also write the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Override the in-flight pair cap
    #[arg(long, value_name = "N")]
    pub max_in_flight: Option<usize>,

    /// Override the OpenAI-compatible endpoint
    #[arg(long)]
    pub base_url: Option<String>,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Risk matrix (YAML or JSON). Defaults to the built-in matrix
    #[arg(short, long)]
    pub matrix: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Report CSV to convert
    pub csv: PathBuf,

    /// Output file. Defaults to the CSV path with a .json extension
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_args() {
        let cli = Cli::try_parse_from([
            "georisk",
            "run",
            "--category",
            "trade_war",
            "--category",
            "cyber_attacks",
            "--json",
            "--max-in-flight",
            "2",
            "--verbose",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.categories, vec!["trade_war", "cyber_attacks"]);
        assert!(args.json);
        assert_eq!(args.max_in_flight, Some(2));
        assert_eq!(args.out_dir, PathBuf::from("."));
        assert!(cli.verbose);
    }

    #[test]
    fn test_convert_requires_csv() {
        assert!(Cli::try_parse_from(["georisk", "convert"]).is_err());
        let cli = Cli::try_parse_from(["georisk", "convert", "report.csv", "-o", "out.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Convert(ref a) if a.out == Some(PathBuf::from("out.json"))));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["georisk", "-q", "-v", "validate"]).is_err());
    }
}
