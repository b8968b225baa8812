//! CLI module for deskpilot - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
