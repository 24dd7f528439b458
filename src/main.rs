mod changes;
mod cli;
mod config;
mod logger;
mod progress;
mod runner;
mod ui;

use anyhow::Result;
use changekit::{ChangeEngine, ChangeLog, LogFacade, Operation, RunOptions};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::{ConfigError, DevboxConfig};
use progress::TerminalProgress;
use runner::{CommandRunner, SystemRunner};
use serde::Serialize;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;

/// Exit code when any change ended FAILED
const EXIT_FAILED: u8 = 1;
/// Exit code for bad input or configuration; nothing was touched
const EXIT_USAGE: u8 = 2;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(cli.verbose, cli.quiet);

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match run(&ctx, cli) {
        Ok(code) => code,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn run(ctx: &Context, cli: Cli) -> Result<ExitCode> {
    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "devbox", &mut io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let config = DevboxConfig::load(cli.config.as_deref())?;
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let log: Arc<dyn ChangeLog> = Arc::new(LogFacade);
    let registry = changes::build_registry(&config, &runner, &log)?;
    let engine = ChangeEngine::new(registry, log);

    match cli.command {
        Command::List { json } => {
            list(&engine, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Apply(args) => batch(ctx, &engine, Operation::Apply, &args.selection()),
        Command::Rollback(args) => batch(ctx, &engine, Operation::Rollback, &args.selection()),
        Command::Completions { .. } => Ok(ExitCode::SUCCESS),
    }
}

#[derive(Serialize)]
struct ListEntry {
    name: String,
    description: String,
    builtin: bool,
}

fn list(engine: &ChangeEngine, json: bool) -> Result<()> {
    let entries = engine.list();
    if json {
        let entries: Vec<ListEntry> = entries
            .into_iter()
            .map(|(name, description)| ListEntry {
                builtin: changes::is_builtin(&name),
                name,
                description,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        ui::change_table(&entries);
    }
    Ok(())
}

fn batch(
    ctx: &Context,
    engine: &ChangeEngine,
    operation: Operation,
    names: &[String],
) -> Result<ExitCode> {
    let opts = RunOptions {
        verbose: ctx.verbose > 0,
    };
    let mut progress = TerminalProgress::new(ctx.quiet);
    let report = engine.run(operation, names, &opts, &mut progress)?;

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_FAILED))
    }
}

/// Map an error that stopped the run to a process exit code
fn exit_code_for(err: &anyhow::Error) -> u8 {
    let usage = err.chain().any(|cause| {
        cause.is::<ConfigError>()
            || cause
                .downcast_ref::<changekit::Error>()
                .is_some_and(changekit::Error::is_configuration)
    });
    if usage { EXIT_USAGE } else { EXIT_FAILED }
}
