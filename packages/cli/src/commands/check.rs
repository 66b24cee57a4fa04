use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use pages_common::BlockIndex;
use pages_schema::{parse_str, PageDocument, SchemaError};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Page document or directory of `*.json` pages
    pub input: PathBuf,

    /// Show every file, not only the ones with problems
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn check(args: CheckArgs, _cwd: &str) -> Result<()> {
    let files = if args.input.is_file() {
        vec![args.input.clone()]
    } else if args.input.is_dir() {
        find_page_files(&args.input)
    } else {
        return Err(anyhow!("Input path does not exist: {}", args.input.display()));
    };

    let mut errors = 0;
    let mut warnings = 0;

    for file in &files {
        match check_file(file) {
            Ok((document, notes)) => {
                warnings += notes.len();
                if notes.is_empty() {
                    if args.verbose || files.len() == 1 {
                        println!(
                            "{} {} ({} blocks)",
                            "✓".green(),
                            file.display(),
                            document.blocks.len()
                        );
                    }
                } else {
                    println!("{} {}", "!".yellow(), file.display());
                    for note in notes {
                        println!("  {} {}", "warning".yellow().bold(), note);
                    }
                }
            }
            Err(err) => {
                errors += 1;
                eprintln!("{} {}", "✗".red(), file.display());
                eprintln!("  {} {}", "error".red().bold(), err);
                if let Some(path) = err.downcast_ref::<SchemaError>().and_then(SchemaError::path) {
                    eprintln!("  {} block {}", "at".dimmed(), path);
                }
            }
        }
    }

    println!();
    println!("   Files checked: {}", files.len());
    if warnings > 0 {
        println!("   {} {}", "Warnings:".yellow(), warnings);
    }
    if errors > 0 {
        return Err(anyhow!("{} of {} pages failed to load", errors, files.len()));
    }

    Ok(())
}

/// Parse one page and collect reference warnings
fn check_file(path: &Path) -> Result<(PageDocument, Vec<String>)> {
    let source = fs::read_to_string(path)?;
    let document = parse_str(&source)?;

    let index = BlockIndex::build(&document);
    let mut notes = Vec::new();
    for (at, id) in index.dangling_references() {
        notes.push(format!("block {} references unknown id \"{}\"", at, id));
    }
    for (at, id) in index.forward_references() {
        notes.push(format!(
            "block {} references \"{}\" before it is declared; it will render as unresolved",
            at, id
        ));
    }

    Ok((document, notes))
}

pub fn find_page_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.is_file()
                && path.extension().map(|e| e == "json").unwrap_or(false)
                && path
                    .file_name()
                    .map(|name| name != crate::config::DEFAULT_CONFIG_NAME)
                    .unwrap_or(true)
        })
        .collect();
    files.sort();
    files
}
