use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(about = "Build, persist, and diff content-addressed directory Merkle trees.")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    #[clap(flatten)]
    pub global_options: GlobalOptions,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a Merkle tree for a directory and print/save it.
    Generate(GenerateArgs),
    /// Compare two Merkle trees (generated fresh, or loaded from `.dmerk` documents).
    Compare(CompareArgs),
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Directory to walk.
    pub path: PathBuf,
    /// Skip writing a `.dmerk` document to disk.
    #[clap(long)]
    pub no_save: bool,
    /// Print the resulting tree as JSON to stdout.
    #[clap(long)]
    pub print: bool,
    /// Filename to save to, overriding the default `<root_name>.dmerk`.
    #[clap(long)]
    pub filename: Option<PathBuf>,
    /// Skip unreadable or unclassifiable entries instead of failing the walk.
    #[clap(long)]
    pub continue_on_error: bool,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// First path: a directory to generate, or a `.dmerk` document to load.
    #[clap(long = "p1")]
    pub path1: PathBuf,
    /// Second path: a directory to generate, or a `.dmerk` document to load.
    #[clap(long = "p2")]
    pub path2: PathBuf,
    /// Subpath within the first tree to compare, instead of its root.
    #[clap(long = "sp1")]
    pub sub_path1: Option<PathBuf>,
    /// Subpath within the second tree to compare, instead of its root.
    #[clap(long = "sp2")]
    pub sub_path2: Option<PathBuf>,
    /// Skip writing `.dmerk` documents for any freshly generated side.
    #[clap(long)]
    pub no_save: bool,
}

#[derive(Args, Debug)]
pub struct GlobalOptions {
    /// Print commands while executing them.
    #[clap(long = "verbose", short, global = true, value_enum, default_value_t = Verbosity::None)]
    pub verbose: Verbosity,
}

#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Verbosity {
    /// Only show warnings and errors.
    None,
    /// Show per-entry progress.
    Details,
    /// For debugging walk/compare internals.
    Debug,
}
