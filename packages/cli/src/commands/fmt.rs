use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;
use pages_schema::{parse_str, serialize_pretty};
use std::fs;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct FmtArgs {
    /// Page document to format
    pub input: PathBuf,

    /// Rewrite the file in place instead of printing it
    #[arg(short, long)]
    pub write: bool,

    /// Exit with an error if the file is not canonically formatted
    #[arg(long, conflicts_with = "write")]
    pub check: bool,
}

pub fn fmt(args: FmtArgs, _cwd: &str) -> Result<()> {
    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let document = parse_str(&source)?;
    let formatted = format!("{}\n", serialize_pretty(&document)?);

    if args.check {
        if formatted != source {
            return Err(anyhow!("{} is not formatted", args.input.display()));
        }
        println!("{} {}", "✓".green(), args.input.display());
    } else if args.write {
        if formatted != source {
            fs::write(&args.input, &formatted)?;
            println!("{} {}", "formatted".green().bold(), args.input.display());
        }
    } else {
        print!("{}", formatted);
    }

    Ok(())
}
