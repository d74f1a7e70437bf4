//! CLI module for boostgate - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running requests,
//! rendering planning prompts, classifying replies, and inspecting config.

pub mod commands;

pub use commands::Cli;
