use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use p4_workspace::{handlers, logger};

#[derive(Parser)]
#[command(name = "p4-workspace")]
#[command(about = "Resolve Perforce client workspaces for a project and manage offline changes", long_about = None)]
#[command(version)]
struct Cli {
    /// Show debug output on the console
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which client workspace each directory resolves to
    Resolve {
        /// Project directory (default: current directory)
        #[arg(short, long)]
        project: Option<PathBuf>,
    },

    /// Show the client workspace governing a file
    Lookup {
        /// File to look up
        path: PathBuf,

        /// Project directory (default: current directory)
        #[arg(short, long)]
        project: Option<PathBuf>,
    },

    /// List changes queued for the server
    Pending {
        /// Project directory (default: current directory)
        #[arg(short, long)]
        project: Option<PathBuf>,
    },

    /// Drop a queued change without sending it
    Discard {
        /// File mapping id or changelist number
        #[arg(allow_hyphen_values = true)]
        target: String,

        /// Project directory (default: current directory)
        #[arg(short, long)]
        project: Option<PathBuf>,
    },

    /// Start new connections offline
    Offline,

    /// Start new connections online
    Online,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logger::init_logger(cli.verbose) {
        eprintln!("{} {}", "Warning: logging unavailable:".yellow(), e);
    }

    match cli.command {
        Commands::Resolve { project } => {
            handlers::handle_resolve(project.as_deref())?;
        }
        Commands::Lookup { path, project } => {
            handlers::handle_lookup(&path, project.as_deref())?;
        }
        Commands::Pending { project } => {
            handlers::handle_pending(project.as_deref())?;
        }
        Commands::Discard { target, project } => {
            handlers::handle_discard(&target, project.as_deref())?;
        }
        Commands::Offline => {
            handlers::handle_set_offline(true)?;
        }
        Commands::Online => {
            handlers::handle_set_offline(false)?;
        }
    }

    Ok(())
}
