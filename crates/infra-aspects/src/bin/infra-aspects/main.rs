mod cli;

use anyhow::Context;
use infra_aspects::config::AspectConfig;
use infra_aspects::engine::DiagnosticsReport;
use infra_aspects::hcl_documents::HclDocuments;
use infra_aspects::resource_tree::ResourceTree;
use std::path::PathBuf;
use std::process::ExitCode;

const DEFAULT_CONFIG_FILE: &str = "aspects.hcl";

const EXIT_FAILED: u8 = 1;
const EXIT_FATAL: u8 = 2;

fn main() -> ExitCode {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("INFRA_ASPECTS_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                return ExitCode::from(EXIT_FATAL);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    return ExitCode::from(EXIT_FATAL);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Check(check_cli) => check(check_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli).map(|()| true),
    };

    match command_result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_FAILED),
        Err(e) => {
            for error in e.chain() {
                eprintln!("{error}")
            }
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// Returns the verdict of the run
pub fn check(cli: cli::CheckCommand) -> anyhow::Result<bool> {
    let config = load_config(&cli.config)?;
    let tree = load_tree(&cli.input)?;
    let policies = config.policies()?;

    let strict = cli.strict || config.strict;
    let verbose = cli.verbose || config.verbose;

    let report = infra_aspects::engine::run(&tree, &policies, &config.suppressions, strict)?;

    output(&cli.output, &report, verbose)?;
    Ok(report.passed)
}

fn load(input: &cli::InputArgs) -> anyhow::Result<HclDocuments> {
    if !input.workdir && input.files.is_empty() && input.directories.is_empty() {
        let stdin = std::io::read_to_string(std::io::stdin())?;
        let body = hcl_edit::parser::parse_body(&stdin)?;
        return Ok(body.into());
    }

    let mut documents = HclDocuments::default();

    if input.workdir {
        documents.load_directory(&std::env::current_dir()?)?;
    }

    for file_path in &input.files {
        documents.load_file(file_path)?;
    }

    for dir_path in &input.directories {
        documents.load_directory(dir_path)?;
    }

    anyhow::ensure!(documents.source_count() > 0, "No files loaded");

    Ok(documents)
}

fn load_tree(input: &cli::InputArgs) -> anyhow::Result<ResourceTree> {
    let documents = load(input)?;
    Ok(infra_aspects::declarations::build_tree(&documents, &input.root)?)
}

fn load_config(args: &cli::ConfigArgs) -> anyhow::Result<AspectConfig> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !path.is_file() {
                tracing::warn!("no {DEFAULT_CONFIG_FILE} found, running without policies");
                return Ok(AspectConfig::default());
            }
            path
        }
    };

    let config = AspectConfig::load(&path)
        .with_context(|| format!("Invalid configuration {}", path.display()))?;
    Ok(config)
}

fn output(
    output: &cli::OutputArgs,
    report: &DiagnosticsReport,
    verbose: bool,
) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Text => print!("{}", infra_aspects::render::text(report, verbose)),
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), report)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), report)?,
    };

    Ok(())
}

/// (infra-aspects-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    match cli.command {
        Documents(dev_input) => {
            let documents = load(&dev_input.input)?;
            println!("{documents:#?}")
        }
        Tree(dev_input) => {
            let tree = load_tree(&dev_input.input)?;
            serde_yaml::to_writer(std::io::stdout(), &tree)?
        }
        Config(config_args) => {
            let config = load_config(&config_args)?;
            println!("{config:#?}")
        }
    }

    Ok(())
}
