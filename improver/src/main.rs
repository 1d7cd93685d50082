//! `improver` command-line entry point.
//!
//! Reads `improver.toml` from the working directory, then runs one
//! interactive improvement session against it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use improver::execute::ExecutionRunner;
use improver::exit_codes;
use improver::io::collaborator::{AiderCollaborator, AiderSettings};
use improver::io::config::{DEFAULT_CONFIG_PATH, load_config};
use improver::io::console::StdConsole;
use improver::logging;
use improver::session::Session;

#[derive(Parser, Debug)]
#[command(
    name = "improver",
    version,
    about = "Refine an idea into a structured prompt and iterate on the project until it works"
)]
struct Cli {
    /// Prompt template file. Overrides the `prompt` key of improver.toml.
    #[arg(long, value_name = "PATH")]
    prompt: Option<PathBuf>,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(&cli) {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(Path::new(DEFAULT_CONFIG_PATH), cli.prompt.as_deref())?;
    let workdir = std::env::current_dir().context("resolve working directory")?;

    let coder = AiderCollaborator::new(AiderSettings::from_config(
        &config,
        &config.coder_model,
        workdir.clone(),
    ));
    let evaluator = AiderCollaborator::new(AiderSettings::from_config(
        &config,
        &config.evaluator_model,
        workdir.clone(),
    ));
    let program = ExecutionRunner::from_config(&config, &workdir);
    let console = StdConsole::stdio();

    let report = Session::new(&config, &coder, &evaluator, &program, &console).run()?;
    info!(status = ?report.status, iterations = report.iterations, "exiting");
    Ok(())
}
