//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: orchestrate one request against the configured endpoints
//! - prompt: render the planning prompt for a request
//! - classify: classify a planning reply
//! - config: show the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// boostgate - boost-directed tool calling for tool-less planning models
#[derive(Parser, Debug)]
#[command(name = "boostgate")]
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
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Where a request comes from
#[derive(clap::Args, Debug, Clone, PartialEq)]
pub struct RequestArgs {
    /// JSON request file (model, messages, tools, stream, ...)
    #[arg(short, long, conflicts_with = "text")]
    pub file: Option<PathBuf>,

    /// Client model name when building from text
    #[arg(short, long, default_value = "claude-opus-4")]
    pub model: String,

    /// JSON file holding a tool descriptor array
    #[arg(short, long)]
    pub tools: Option<PathBuf>,

    /// Request text, used as a single user message
    pub text: Option<String>,
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Orchestrate one request and print the result
    Run {
        #[command(flatten)]
        request: RequestArgs,

        /// Stream the executor output
        #[arg(short, long)]
        stream: bool,
    },

    /// Render the planning prompt for a request
    Prompt {
        #[command(flatten)]
        request: RequestArgs,
    },

    /// Classify a planning reply read from a file or stdin
    Classify {
        /// File containing the reply; stdin when omitted
        file: Option<PathBuf>,
    },

    /// Show the effective configuration with secrets masked
    Config,
}
