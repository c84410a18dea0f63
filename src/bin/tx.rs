// src/bin/tx.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::io::IsTerminal;
use tokio::io::AsyncReadExt;
use tx::{
    CallSite, CommandLine, Config, ExecutionError, Executor,
    cli::{self, Cli, CliError, ScriptSource},
    core::config::{config_file_path, load_config_file},
};

/// The main entry point of the `tx` binary.
/// Sets up logging and the runtime, runs the script, and maps errors to exit codes.
fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("\n{}: {}", "Fatal".red().bold(), e);
            std::process::exit(1);
        }
    };

    let code = match runtime.block_on(run_cli(cli)) {
        Ok(code) => code,
        Err(e) => report(&e),
    };
    std::process::exit(code);
}

/// Prints an error the way a user expects to read it and picks the exit code.
fn report(error: &anyhow::Error) -> i32 {
    if let Some(ExecutionError::Process(output)) = error.downcast_ref::<ExecutionError>() {
        eprintln!("{}: {}", "Error".red().bold(), output.message());
    } else if let Some(e) = error.downcast_ref::<CliError>() {
        eprintln!("{}: {}", "Error".red().bold(), e);
    } else {
        eprintln!("\n{}: {:#}", "Fatal".red().bold(), error);
    }
    1
}

/// Builds the effective config: detected defaults, then the config file, then flags.
fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::detect();
    match config_file_path() {
        Ok(path) => {
            if let Some(file) = load_config_file(&path)? {
                config = config.merge(file);
            }
        }
        Err(e) => log::debug!("{e}"),
    }
    if cli.quiet {
        config.verbose = false;
    }
    if let Some(shell) = &cli.shell {
        config.shell = shell.clone();
    }
    if let Some(prefix) = &cli.prefix {
        config.prefix = prefix.clone();
    }
    Ok(config)
}

async fn run_cli(cli: Cli) -> Result<i32> {
    log::debug!("CLI args parsed: {:?}", cli);

    if cli.version {
        println!("tx version {}", env!("CARGO_PKG_VERSION"));
        return Ok(0);
    }

    let config = resolve_config(&cli)?;
    Config::set_global(config.clone());

    let source = ScriptSource::resolve(cli.script.as_deref())?;
    let script = match &source {
        ScriptSource::Stdin => {
            if std::io::stdin().is_terminal() {
                print!("{}", cli::usage());
                return Ok(2);
            }
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("Could not read the script from stdin")?;
            if text.trim().is_empty() {
                print!("{}", cli::usage());
                return Ok(2);
            }
            text
        }
        ScriptSource::Url(url) => cli::fetch_script(url).await?,
        ScriptSource::File(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Could not read script '{}'", path.display()))?,
    };

    // Lives as long as the process; diagnostics point back at it.
    let origin = CallSite::Script(Box::leak(source.to_string().into_boxed_str()));
    let promise = Executor::new(config).run(CommandLine::with_origin(script, origin));
    if source == ScriptSource::Stdin {
        // The script itself came through stdin; the shell gets an empty one.
        drop(promise.stdin());
    }
    promise.await?;
    Ok(0)
}
