//! Build, persist, and diff content-addressed directory Merkle trees.
mod cli;
mod compare;
mod digest;
mod error;
mod generate;
mod logger;
mod merkle;
mod serialize;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

pub use merkle::Merkle;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    logger::init_logger(&cli.global_options);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: cli::Commands) -> Result<()> {
    match command {
        cli::Commands::Generate(args) => run_generate(args),
        cli::Commands::Compare(args) => run_compare(args),
    }
}

fn run_generate(args: cli::GenerateArgs) -> Result<()> {
    let tree = generate::generate(&args.path, args.continue_on_error)
        .with_context(|| format!("generating a tree for '{}'", args.path.display()))?;

    if !args.no_save {
        let saved_path = match &args.filename {
            Some(filename) => {
                serialize::save_as(&tree, filename)?;
                filename.clone()
            }
            None => serialize::save(&tree, Path::new("."))?,
        };
        log::info!("saved {}", saved_path.display());
    }

    if args.print {
        print_tree(&tree)?;
    }

    Ok(())
}

fn run_compare(args: cli::CompareArgs) -> Result<()> {
    let tree1 = generate_or_load(&args.path1, args.no_save)
        .with_context(|| format!("loading or generating '{}'", args.path1.display()))?;
    let tree2 = generate_or_load(&args.path2, args.no_save)
        .with_context(|| format!("loading or generating '{}'", args.path2.display()))?;

    let report = compare::compare_subtrees(
        &tree1,
        args.sub_path1.as_deref(),
        &tree2,
        args.sub_path2.as_deref(),
    )?;

    print_report(&report);
    Ok(())
}

/// Classify `path` at runtime: a directory is walked fresh, anything else is
/// loaded as a previously saved document.
fn generate_or_load(path: &Path, no_save: bool) -> Result<Merkle> {
    if path.is_dir() {
        let tree = generate::generate(path, false)?;
        if !no_save {
            let saved_path = serialize::save(&tree, Path::new("."))?;
            log::info!("saved {}", saved_path.display());
        }
        Ok(tree)
    } else {
        Ok(serialize::load(path)?)
    }
}

fn print_tree(tree: &Merkle) -> Result<()> {
    let value = serialize::to_json_value(tree)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_report(report: &compare::Report) {
    for (paths1, paths2) in &report.matches {
        println!("MATCH {} <-> {}", format_paths(paths1), format_paths(paths2));
    }
    for paths in &report.unmatched_1 {
        println!("ONLY IN FIRST {}", format_paths(paths));
    }
    for paths in &report.unmatched_2 {
        println!("ONLY IN SECOND {}", format_paths(paths));
    }
}

fn format_paths(paths: &[std::path::PathBuf]) -> String {
    paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
}
