// ABOUTME: HTML emitter: a fixed tag vocabulary, links, tool buttons, and form controls.
// ABOUTME: Text and attribute values are escaped; unknown tags fall back to a plain div.

use serde_json::Value;

use crate::emit::flatten_all;
use crate::emit::markdown::space_count;
use crate::props::Props;
use crate::vnode::{ElementNode, VNode};

const HTML_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "div", "span", "strong", "b", "em", "i", "del", "s",
    "strike", "ul", "ol", "li", "table", "tr", "td", "th", "button",
];

/// Escape `& < > "` for text and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render a VNode tree as HTML.
pub fn render_to_html(node: &VNode) -> String {
    match node {
        VNode::Text(text) => escape_html(&text.content),
        VNode::Element(el) => render_element(el),
    }
}

fn render_children(el: &ElementNode) -> String {
    el.children.iter().map(render_to_html).collect()
}

/// ` key="value"` pairs for the listed props, in list order. Booleans are
/// written bare when true and omitted when false.
fn attrs(props: &Props, keys: &[&str]) -> String {
    let mut out = String::new();
    for key in keys {
        match props.json(key) {
            None | Some(Value::Null) => {}
            Some(Value::Bool(true)) => {
                out.push(' ');
                out.push_str(key);
            }
            Some(Value::Bool(false)) => {}
            Some(Value::String(s)) => out.push_str(&format!(" {}=\"{}\"", key, escape_html(s))),
            Some(other) => out.push_str(&format!(" {}=\"{}\"", key, escape_html(&other.to_string()))),
        }
    }
    out
}

fn lang_class(el: &ElementNode) -> String {
    el.props
        .non_empty_str("lang")
        .or_else(|| el.props.non_empty_str("language"))
        .map(|lang| format!(" class=\"language-{}\"", escape_html(lang)))
        .unwrap_or_default()
}

fn render_element(el: &ElementNode) -> String {
    let tag = el.tag.as_str();
    match tag {
        "br" | "Br" => "<br />".to_string(),
        "tab" | "Tab" => "<span class=\"tab\">&nbsp;&nbsp;&nbsp;&nbsp;</span>".to_string(),
        "space" | "Space" => format!(
            "<span class=\"space\">{}</span>",
            "&nbsp;".repeat(space_count(el))
        ),
        "Link" => {
            let href = el
                .props
                .non_empty_str("to")
                .or_else(|| el.props.non_empty_str("href"));
            match href {
                Some(href) => format!(
                    "<a href=\"{}\" data-navigate=\"true\">{}</a>",
                    escape_html(href),
                    render_children(el)
                ),
                None => format!("<a>{}</a>", render_children(el)),
            }
        }
        "a" => match el.props.non_empty_str("href") {
            Some(href) => format!("<a href=\"{}\">{}</a>", escape_html(href), render_children(el)),
            None => format!("<a>{}</a>", render_children(el)),
        },
        "tool" => format!(
            "<button class=\"tool-btn\" data-tool=\"{}\">{}</button>",
            escape_html(el.props.str("name").unwrap_or_default()),
            render_children(el)
        ),
        "input" => format!(
            "<input{} />",
            attrs(&el.props, &["type", "placeholder", "value", "name", "checked"])
        ),
        "checkbox" | "radio" => {
            let mut props = el.props.clone();
            props.insert("type", tag);
            format!("<input{} />", attrs(&props, &["type", "checked"]))
        }
        "select" => format!(
            "<select{}>{}</select>",
            attrs(&el.props, &["value", "placeholder"]),
            render_children(el)
        ),
        "textarea" => format!(
            "<textarea{}>{}</textarea>",
            attrs(&el.props, &["placeholder", "rows", "cols"]),
            render_children(el)
        ),
        "pre" => format!(
            "<pre><code{}>{}</code></pre>",
            lang_class(el),
            flatten_all(&el.children)
        ),
        "code" => format!("<code{}>{}</code>", lang_class(el), flatten_all(&el.children)),
        "button" => match el.props.non_empty_str("data-action") {
            Some(action) => format!(
                "<button data-action=\"{}\">{}</button>",
                escape_html(action),
                render_children(el)
            ),
            None => format!("<button>{}</button>", render_children(el)),
        },
        _ if HTML_TAGS.contains(&tag) => format!("<{}>{}</{}>", tag, render_children(el), tag),
        _ => format!("<div>{}</div>", render_children(el)),
    }
}
