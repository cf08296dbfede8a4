// ABOUTME: CLI argument definitions for the promptui binary.
// ABOUTME: All clap structures live here so main.rs stays focused on dispatch.

use clap::{Parser, Subcommand};
use promptui_core::OutputFormat;

/// Render the built-in demo pages as agent prompts and drive their tools.
#[derive(Parser)]
#[command(name = "promptui", version, about)]
pub struct Cli {
    /// Prompt format (markdown or html). Overrides PROMPTUI_FORMAT.
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    /// Do not archive rendered prompts, whatever PROMPTUI_SNAPSHOTS says.
    #[arg(long, global = true)]
    pub no_snapshots: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render a page and print its prompt and tool catalogue.
    Render {
        /// Page address, e.g. prompt:///todos or /todos.
        #[arg(default_value = "/")]
        url: String,

        /// Print the whole render result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Render a page, call one of its tools, and print the page again.
    Exec {
        url: String,
        tool: String,

        /// Tool arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// Render a page and run a JSON array of {name, params} tool calls in order.
    Batch {
        url: String,

        /// e.g. '[{"name":"increment"},{"name":"set_count","params":{"value":3}}]'
        #[arg(long)]
        calls: String,
    },

    /// List archived prompts.
    Snapshots {
        /// Only show snapshots of this address.
        #[arg(long)]
        url: Option<String>,
    },
}
