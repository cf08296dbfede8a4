// ABOUTME: Text emitters turning a rendered VNode tree into the agent-facing prompt string.
// ABOUTME: Markdown and HTML outputs are deterministic and share no state.

pub mod html;
pub mod markdown;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::vnode::VNode;

pub use html::render_to_html;
pub use markdown::render_to_markdown;

/// Which emitter produces the prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Html,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Html => "html",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "html" => Ok(OutputFormat::Html),
            other => Err(format!("unknown output format: {}", other)),
        }
    }
}

/// Emit `node` in the requested format.
pub fn emit(node: &VNode, format: OutputFormat) -> String {
    match format {
        OutputFormat::Markdown => render_to_markdown(node),
        OutputFormat::Html => render_to_html(node),
    }
}

/// Concatenated text of `node` and its descendants, unescaped.
pub(crate) fn flatten(node: &VNode) -> String {
    node.text_content()
}

/// Flattened text of a list of nodes.
pub(crate) fn flatten_all(nodes: &[VNode]) -> String {
    nodes.iter().map(flatten).collect()
}
