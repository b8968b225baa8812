//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: execute a goal through the step loop
//! - undo: revert a journal operation
//! - journal: print a journal operation's entries
//! - tools: list registered capabilities
//! - check: evaluate a path or command against the guardrails

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Deskpilot - guarded step loop for desktop automation goals
#[derive(Parser, Debug)]
#[command(name = "deskpilot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a goal through the planner/dispatch loop
    Run(RunArgs),

    /// Undo the file moves recorded in a journal operation
    Undo {
        /// Operation ID printed by `run`
        op_id: String,

        /// Report what would be reverted without moving anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the entries of a journal operation
    Journal {
        /// Operation ID
        op_id: String,
    },

    /// List registered capabilities
    Tools,

    /// Evaluate a path or command against the guardrails
    Check {
        #[command(subcommand)]
        target: CheckTarget,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Goal text; may contain inline `tool: arguments` lines
    pub goal: String,

    /// Plan and journal without touching anything
    #[arg(long)]
    pub dry_run: bool,

    /// Step budget (defaults to the guardrail policy)
    #[arg(long)]
    pub max_steps: Option<u32>,

    /// Only allow these capabilities (repeatable)
    #[arg(long = "allow", value_name = "TOOL")]
    pub allowed_tools: Vec<String>,

    /// Never dispatch these capabilities (repeatable)
    #[arg(long = "block", value_name = "TOOL")]
    pub blocked_tools: Vec<String>,

    /// Grant approval for a risk category (repeatable)
    #[arg(long = "approve", value_name = "CATEGORY")]
    pub approvals: Vec<String>,

    /// Session profile passed through to capabilities
    #[arg(long)]
    pub profile: Option<String>,

    /// Budget hint handed to the planner
    #[arg(long)]
    pub budget: Option<u32>,

    /// YAML/JSON list of plan steps to replay
    #[arg(long)]
    pub plan: Option<PathBuf>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CheckTarget {
    /// Sandbox check for a path
    Path {
        path: PathBuf,
    },

    /// Exec allow-list check for a binary and its arguments
    Exec {
        binary: String,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}
