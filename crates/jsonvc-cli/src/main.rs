//! Command line tool for tracking JSON files.
//!
//! Documents live in a content-addressed object store (a local directory or
//! an IPFS gateway); every tracked version is a node in a hash-linked graph.
//! The node cache persists between runs as `cache.json` next to the
//! configuration file.

mod cache_file;
mod commands;
mod config;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use jsonvc_graph::{FileVersionControl, SnapshotMode};

#[derive(Parser)]
#[command(name = "jsonvc")]
#[command(version)]
#[command(about = "Command line tool for tracking JSON files")]
struct Cli {
    /// Enable developer debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track a json file
    Track {
        /// The json file to track
        filename: PathBuf,
        /// Provide file to peers (IPFS only)
        #[arg(long)]
        provide: bool,
        /// The commit message
        #[arg(short, long)]
        message: String,
    },

    /// Show if a json file is tracked
    Istracked {
        /// The file whose track status is desired
        filename: PathBuf,
    },

    /// Update a json file
    Update {
        /// The current tracked JSON document
        old_objref: String,
        /// The new JSON document to replace it with
        new_objref: String,
        /// Force creation of node
        #[arg(long)]
        force: bool,
        /// Provide file to peers (IPFS only)
        #[arg(long)]
        provide: bool,
        /// The commit message
        #[arg(short, long)]
        message: String,
    },

    /// Update target file and remove source file
    Replace {
        /// The file to be updated
        target_file: PathBuf,
        /// The file with the updated JSON (will be moved over the target)
        update_file: PathBuf,
        /// Force replacement even if the new JSON document is already tracked
        #[arg(long)]
        force: bool,
        /// Target node hash to eliminate ambiguity
        #[arg(long)]
        targethash: Option<String>,
        /// Provide file to peers (IPFS only)
        #[arg(long)]
        provide: bool,
        /// The commit message
        #[arg(short, long)]
        message: String,
    },

    /// Show nodes associated with JSON document
    Showassoc {
        /// Show full hash in output
        #[arg(long = "full-hash")]
        full_hash: bool,
        /// JSON document reference
        objref: PathBuf,
    },

    /// Show history of a file
    Showlog {
        /// Show full hash in output
        #[arg(long = "full-hash")]
        full_hash: bool,
        /// JSON document whose history is desired
        objref: String,
    },

    /// Print json object on stdout
    Showdoc {
        /// JSON document reference
        objref: String,
        /// Enable indent for JSON output formatting
        #[arg(long)]
        indent: bool,
    },

    /// Print diff to previous json object on stdout
    Showdiff {
        /// Short-form hash of old object
        old_objref: String,
        /// Short-form hash of new object
        new_objref: String,
        /// Enable indent for JSON output formatting
        #[arg(long)]
        indent: bool,
    },

    /// Discover tracking nodes starting from seed nodes
    Discover {
        /// List with seed node hashes
        #[arg(required = true)]
        node_hashes: Vec<String>,
    },

    /// Management of configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show configuration directory
    Showdir,
    /// Show the configuration
    Show,
    /// Set configuration variable
    Set {
        /// variable name
        key: String,
        /// value
        value: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    telemetry::init(cli.debug);
    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            if cli.debug {
                eprintln!("{err:?}");
            } else {
                eprintln!("{err}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    if let Commands::Config { command } = &cli.command {
        return run_config(command);
    }

    let app_config = config::read_config()?;
    let storage = commands::build_storage(&app_config, wants_provide(&cli.command))?;
    let mut fvc = FileVersionControl::new(storage)?;
    let snapshot = cache_file::read_cache_file()?;
    fvc.doc_vc_mut()
        .cache_mut()
        .load_snapshot(snapshot, SnapshotMode::Merge);

    match &cli.command {
        Commands::Track {
            filename, message, ..
        } => commands::track(&mut fvc, filename, message),
        Commands::Istracked { filename } => commands::istracked(&fvc, filename),
        Commands::Update {
            old_objref,
            new_objref,
            force,
            message,
            ..
        } => commands::update(&mut fvc, old_objref, new_objref, message, *force),
        Commands::Replace {
            target_file,
            update_file,
            force,
            targethash,
            message,
            ..
        } => commands::replace(
            &mut fvc,
            target_file,
            update_file,
            message,
            *force,
            targethash.as_deref(),
        ),
        Commands::Showassoc { full_hash, objref } => {
            commands::showassoc(&mut fvc, objref, *full_hash)
        }
        Commands::Showlog { full_hash, objref } => commands::showlog(&mut fvc, objref, *full_hash),
        Commands::Showdoc { objref, indent } => commands::showdoc(&mut fvc, objref, *indent),
        Commands::Showdiff {
            old_objref,
            new_objref,
            indent,
        } => commands::showdiff(&mut fvc, old_objref, new_objref, *indent),
        Commands::Discover { node_hashes } => commands::discover(&mut fvc, node_hashes),
        Commands::Config { .. } => unreachable!("handled above"),
    }
}

fn wants_provide(command: &Commands) -> bool {
    match command {
        Commands::Track { provide, .. }
        | Commands::Update { provide, .. }
        | Commands::Replace { provide, .. } => *provide,
        _ => false,
    }
}

fn run_config(command: &ConfigCommands) -> Result<ExitCode> {
    match command {
        ConfigCommands::Showdir => {
            println!("{}", config::config_dir()?.display());
        }
        ConfigCommands::Show => {
            let cfg = config::read_config()?;
            println!("{}", serde_json::to_string_pretty(&cfg)?);
        }
        ConfigCommands::Set { key, value } => {
            let mut cfg = config::read_config()?;
            cfg.set(key, value)?;
            config::write_config(&cfg)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}
