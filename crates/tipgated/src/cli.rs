//! CLI - Command-line argument parsing
//!
//! Keeps argument parsing separate from execution logic.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tipgate_common::WarrantUpdate;

/// Tip triage: legal gate, deconfliction and priority scoring
#[derive(Parser)]
#[command(name = "tipgated")]
#[command(
    about = "Legal compliance gate and priority scoring for exploitation tips",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// Config file (overrides /etc/tipgate/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a tip through the pipeline and store the result
    Process {
        /// Tip record as JSON
        input: PathBuf,
    },

    /// Record a warrant status for one file
    Warrant {
        tip_id: String,
        file_id: String,
        /// applied, granted or denied
        status: WarrantUpdate,
        /// Case-management staff member recording the status
        #[arg(long)]
        actor: String,
    },

    /// Grant exigent-circumstances access to a blocked file
    Exigent {
        tip_id: String,
        file_id: String,
        #[arg(long)]
        authorized_by: String,
        #[arg(long)]
        justification: String,
    },

    /// Record coordination with the agency holding an overlapping case
    Coordinate {
        tip_id: String,
        #[arg(long)]
        supervisor: String,
        #[arg(long)]
        agency: String,
        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Print the audit trail of a tip
    Audit { tip_id: String },

    /// List stored tips, most urgent first
    Queue,

    /// Check text for manipulation patterns without storing anything
    Scan { text: String },
}
