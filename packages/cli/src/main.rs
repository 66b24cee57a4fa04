mod commands;
mod config;
mod http;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{check, fmt, render, submit, CheckArgs, FmtArgs, RenderArgs, SubmitArgs};
use tracing_subscriber::EnvFilter;

/// Pages CLI - check, format, render and submit Direktiv page documents
#[derive(Parser, Debug)]
#[command(name = "pages")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log verbosity when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse page documents and report problems
    Check(CheckArgs),

    /// Print a page in canonical form
    Fmt(FmtArgs),

    /// Render a page and print the render tree as JSON
    Render(RenderArgs),

    /// Execute a form's mutation against the configured API
    Submit(SubmitArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays pipeable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cwd = match std::env::current_dir() {
        Ok(dir) => dir.display().to_string(),
        Err(err) => {
            eprintln!("{} Cannot get current directory: {}", "Error:".red().bold(), err);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Check(args) => check(args, &cwd),
        Command::Fmt(args) => fmt(args, &cwd),
        Command::Render(args) => render(args, &cwd).await,
        Command::Submit(args) => submit(args, &cwd).await,
    };

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
