//! CLI type definitions
//!
//! Clap structures for the `changeward` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "changeward")]
#[command(about = "changeward - groups file changes into reviewed change requests", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Read configuration from this file instead of .changeward/
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Consume JSON-lines file change events from stdin until EOF
    Run {
        /// Record VCS calls instead of touching git or the hosting API
        #[arg(long)]
        dry_run: bool,
    },

    /// Create the change request for one session
    Propose {
        /// Session ID
        session: String,

        /// Skip the threshold check
        #[arg(short, long)]
        force: bool,

        /// Record VCS calls instead of touching git or the hosting API
        #[arg(long)]
        dry_run: bool,
    },

    /// Complete sessions idle for longer than the given age
    Cleanup {
        /// Defaults to workflow.stale_after_minutes
        #[arg(short, long)]
        max_age_minutes: Option<u64>,
    },

    /// List stored sessions
    Sessions {
        /// Include completed sessions
        #[arg(short, long)]
        all: bool,
    },
}
