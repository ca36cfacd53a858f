//! infra-aspects cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; infra-aspects ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run all configured policies against the declared resources
    ///
    /// Reads declarations from stdin unless any other source is provided (via --input-*).
    /// Exits with 1 when the verdict is failed and with 2 on any other error.
    Check(CheckCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct CheckCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub config: ConfigArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Report every finding as error
    ///
    /// Combined with `strict` of the configuration file: either one enables strict mode.
    #[clap(long)]
    pub strict: bool,

    /// Also list suppressed findings with their reason
    #[clap(long)]
    pub verbose: bool,
}

#[derive(Parser, Debug)]
pub struct InputArgs {
    /// Load *.infra.hcl files from work directory
    #[clap(short = 'w', long = "input-workdir")]
    pub workdir: bool,

    /// Load a file
    #[clap(short = 'f', long = "input-file")]
    pub files: Vec<PathBuf>,

    /// Load *.infra.hcl files from given directory
    #[clap(short = 'd', long = "input-dir")]
    pub directories: Vec<PathBuf>,

    /// Id of the root node all declarations are placed under
    #[clap(long = "root", default_value = "root")]
    pub root: String,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Aspect configuration file
    ///
    /// Defaults to `aspects.hcl` in the work directory. Without a configuration no policy is
    /// registered.
    #[clap(long = "config")]
    pub config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => f.write_str("text"),
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Loaded hcl documents
    Documents(DevInput),
    /// Resource tree after default tags were applied
    Tree(DevInput),
    /// Parsed aspect configuration
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct DevInput {
    #[clap(flatten)]
    pub input: InputArgs,
}
