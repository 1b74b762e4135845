use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

mod commands;
mod logging;

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Use verbose output.
    #[arg(global = true, long, short)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, empty repository.
    Init(InitArgs),
    /// Run a packet and insert its outputs into the repository.
    Run(RunArgs),
    /// Evaluate a search query against the repository.
    Search(SearchArgs),
    /// Manage configured locations.
    Location {
        #[command(subcommand)]
        command: LocationCommands,
    },
}

#[derive(Args)]
struct InitArgs {
    /// Path at which to create the repository.
    path: PathBuf,

    /// Relative path under which to maintain a human-readable archive tree.
    #[arg(long)]
    archive: Option<String>,

    /// Maintain a content-addressed file store under `.outpack/files`.
    #[arg(long)]
    use_file_store: bool,

    /// Require recursive pulls to complete the full dependency tree.
    #[arg(long)]
    require_complete_tree: bool,
}

#[derive(Args)]
struct RunArgs {
    /// The packet name.
    name: String,

    /// A string parameter, `-p key value`.
    #[arg(short = 'p', num_args = 2, value_names = ["KEY", "VALUE"])]
    string_param: Vec<String>,

    /// A numeric parameter, `-n key value`.
    #[arg(short = 'n', num_args = 2, value_names = ["KEY", "VALUE"])]
    number_param: Vec<String>,

    /// A boolean parameter, `-b key value`.
    #[arg(short = 'b', num_args = 2, value_names = ["KEY", "VALUE"])]
    bool_param: Vec<String>,
}

#[derive(Args)]
struct SearchArgs {
    query: String,

    /// Consider remote-known packets as well as local ones.
    #[arg(long)]
    allow_remote: bool,
}

#[derive(Subcommand)]
enum LocationCommands {
    List,
    Add { name: String, address: String },
    Remove { name: String },
    Rename { old: String, new: String },
}

fn pairs(flat: Vec<String>) -> anyhow::Result<Vec<(String, String)>> {
    if flat.len() % 2 != 0 {
        anyhow::bail!("parameter flags take a key and a value");
    }
    Ok(flat.chunks_exact(2).map(|c| (c[0].clone(), c[1].clone())).collect())
}

fn inner() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(if cli.verbose {
        logging::Level::Verbose
    } else {
        logging::Level::Default
    })?;

    match cli.command {
        Commands::Init(args) => commands::init::run(args.path, args.archive, args.use_file_store, args.require_complete_tree),
        Commands::Run(args) => {
            let strings = pairs(args.string_param)?;
            let numbers = pairs(args.number_param)?
                .into_iter()
                .map(|(k, v)| Ok((k, v.parse::<f64>()?)))
                .collect::<Result<Vec<_>>>()?;
            let bools = pairs(args.bool_param)?
                .into_iter()
                .map(|(k, v)| Ok((k, v.parse::<bool>()?)))
                .collect::<Result<Vec<_>>>()?;
            commands::run::run(args.name, strings, numbers, bools)
        }
        Commands::Search(args) => commands::search::run(args.query, args.allow_remote),
        Commands::Location { command } => match command {
            LocationCommands::List => commands::location::list(),
            LocationCommands::Add { name, address } => commands::location::add(name, address),
            LocationCommands::Remove { name } => commands::location::remove(name),
            LocationCommands::Rename { old, new } => commands::location::rename(old, new),
        },
    }
}

fn main() -> ExitCode {
    match inner() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
