//! NoteSync CLI
//!
//! Command-line tools for NoteSync repositories.
//!
//! # Commands
//!
//! - `inspect` - Display repository statistics and metadata
//! - `init` - Configure a folder as the cloud location
//! - `sync` - Synchronize with the cloud location
//! - `safe` - Create, check and maintain safes
//! - `transfer-code` - Show the transfer code of the cloud repository

mod commands;

use clap::{Parser, Subcommand};
use notesync_core::StorageProfile;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// NoteSync command-line tools.
#[derive(Parser)]
#[command(name = "notesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the repository and settings
    #[arg(global = true, short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Use the development repository file
    #[arg(global = true, long)]
    dev: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display repository statistics and metadata
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Configure a folder as the cloud location
    Init {
        /// Folder acting as the cloud location
        #[arg(short, long)]
        cloud_dir: PathBuf,

        /// Transfer code of an existing cloud repository
        #[arg(short, long)]
        transfer_code: Option<String>,
    },

    /// Synchronize with the cloud location
    Sync {
        /// Folder acting as the cloud location, overrides the configured one
        #[arg(short, long)]
        cloud_dir: Option<PathBuf>,

        /// Never ask anything, skip whatever needs a decision
        #[arg(short, long)]
        silent: bool,
    },

    /// Create, check and maintain safes
    Safe {
        #[command(subcommand)]
        command: SafeCommands,
    },

    /// Show the transfer code of the cloud repository
    TransferCode,

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum SafeCommands {
    /// Create a new safe
    Create {
        /// Password of the new safe
        #[arg(short, long)]
        password: String,
    },
    /// Count the safes a password opens
    Check {
        /// Password to try
        #[arg(short, long)]
        password: String,
    },
    /// Change the password of every safe the old password opens
    ChangePassword {
        /// Current password
        #[arg(long)]
        old: String,
        /// New password
        #[arg(long)]
        new: String,
    },
    /// Encrypt a note with a safe the password opens
    Lock {
        /// Note id
        note: String,
        /// Password of the safe
        #[arg(short, long)]
        password: String,
    },
    /// Decrypt a locked note permanently
    Unlock {
        /// Note id
        note: String,
        /// Password of the note's safe
        #[arg(short, long)]
        password: String,
    },
    /// Remove every safe and erase the notes they protect
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let profile = if cli.dev {
        StorageProfile::Development
    } else {
        StorageProfile::Production
    };

    match cli.command {
        Commands::Inspect { format } => {
            commands::inspect::run(&cli.data_dir, profile, &format)?;
        }
        Commands::Init {
            cloud_dir,
            transfer_code,
        } => {
            commands::init::run(
                &cli.data_dir,
                profile,
                &cloud_dir,
                transfer_code.as_deref(),
            )?;
        }
        Commands::Sync { cloud_dir, silent } => {
            commands::sync::run(&cli.data_dir, profile, cloud_dir.as_deref(), silent)?;
        }
        Commands::Safe { command } => {
            let storage = commands::safe::open_storage(&cli.data_dir, profile);
            match command {
                SafeCommands::Create { password } => commands::safe::create(&storage, &password)?,
                SafeCommands::Check { password } => commands::safe::check(&storage, &password)?,
                SafeCommands::ChangePassword { old, new } => {
                    commands::safe::change_password(&storage, &old, &new)?
                }
                SafeCommands::Lock { note, password } => {
                    commands::safe::lock(&storage, &note, &password)?
                }
                SafeCommands::Unlock { note, password } => {
                    commands::safe::unlock(&storage, &note, &password)?
                }
                SafeCommands::Reset { yes } => {
                    if !yes {
                        return Err("reset erases every locked note, confirm with --yes".into());
                    }
                    commands::safe::reset(&storage)?
                }
            }
        }
        Commands::TransferCode => {
            commands::transfer_code::run(&cli.data_dir, profile)?;
        }
        Commands::Version => {
            println!("NoteSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Repository revision {}",
                notesync_core::NEWEST_SUPPORTED_REVISION
            );
        }
    }

    Ok(())
}
