// ABOUTME: Markdown emitter: headings, lists, paragraphs, tables, code fences and control labels.
// ABOUTME: Flowing text escapes * _ # [ ]; structural syntax such as [label] is written verbatim.

use crate::emit::{flatten, flatten_all};
use crate::vnode::{ElementNode, VNode};

/// Backslash-escape the characters Markdown would otherwise interpret.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '_' | '#' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Render a VNode tree as Markdown.
pub fn render_to_markdown(node: &VNode) -> String {
    match node {
        VNode::Text(text) => escape_markdown(text.content.trim()),
        VNode::Element(el) => render_element(el),
    }
}

fn heading_level(tag: &str) -> Option<usize> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn render_element(el: &ElementNode) -> String {
    if let Some(level) = heading_level(&el.tag) {
        let marker = "#".repeat(level);
        let content = flatten_all(&el.children);
        return if content.is_empty() {
            format!("{}\n", marker)
        } else {
            format!("{} {}\n", marker, content)
        };
    }

    match el.tag.as_str() {
        "ul" => list(el, |_| "- ".to_string()),
        "ol" => list(el, |i| format!("{}. ", i + 1)),
        "p" => {
            let content = flatten_all(&el.children);
            let content = content.trim();
            if content.is_empty() {
                String::new()
            } else {
                format!("{}\n", escape_markdown(content))
            }
        }
        "div" => {
            let body: String = el.children.iter().map(render_to_markdown).collect();
            if body.is_empty() {
                body
            } else {
                format!("{}\n", body)
            }
        }
        "span" => flatten_all(&el.children),
        "button" => format!("[{}]", el.text_content()),
        "input" => match el.props.non_empty_str("placeholder") {
            Some(placeholder) => format!("[Input: {}]", placeholder),
            None => "[Input]".to_string(),
        },
        "table" => table(el),
        "pre" | "code" => {
            let lang = el
                .props
                .non_empty_str("lang")
                .or_else(|| el.props.non_empty_str("language"))
                .unwrap_or_default();
            format!("```{}\n{}\n```\n", lang, flatten_all(&el.children))
        }
        "br" | "Br" => "\n".to_string(),
        "tab" | "Tab" => "    ".to_string(),
        "space" | "Space" => " ".repeat(space_count(el)),
        _ => el.children.iter().map(render_to_markdown).collect(),
    }
}

fn list(el: &ElementNode, marker: impl Fn(usize) -> String) -> String {
    let items: Vec<String> = el
        .children
        .iter()
        .enumerate()
        .map(|(i, child)| format!("{}{}", marker(i), flatten(child)))
        .collect();
    format!("{}\n", items.join("\n"))
}

fn table(el: &ElementNode) -> String {
    let rows: Vec<String> = el
        .children
        .iter()
        .filter_map(VNode::as_element)
        .filter(|row| row.tag == "tr")
        .map(|row| {
            let cells: Vec<String> = row.children.iter().map(flatten).collect();
            format!("| {} |", cells.join(" | "))
        })
        .collect();
    format!("{}\n", rows.join("\n"))
}

/// `count` prop of a space element; missing, zero or non-numeric means 1.
pub(crate) fn space_count(el: &ElementNode) -> usize {
    el.props
        .json("count")
        .and_then(serde_json::Value::as_u64)
        .filter(|n| *n > 0)
        .map_or(1, |n| n as usize)
}
