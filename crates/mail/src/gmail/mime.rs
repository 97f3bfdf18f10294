//! MIME body extraction
//!
//! Flattens a message's (possibly nested) part tree into plain text. Every
//! text/plain and text/html leaf contributes one segment, in depth-first
//! pre-order, and segments are joined with newlines. HTML is reduced to its
//! visible text. A part that fails to decode is skipped on its own; the
//! rest of the message still comes through.

use base64::prelude::*;
use log::warn;
use scraper::{ElementRef, Html, Node};

use super::api::MessagePart;

/// Parts nested deeper than this are ignored
pub const MAX_DEPTH: usize = 32;

/// Elements whose content is never visible
const HIDDEN_TAGS: &[&str] = &["head", "script", "style", "title", "noscript", "template"];

/// Elements that start and end a line
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "table", "tr", "ul", "ol", "li", "h1",
    "h2", "h3", "h4", "h5", "h6", "blockquote", "pre", "hr",
];

/// A message part reduced to what extraction needs
#[derive(Debug, Clone, PartialEq)]
pub enum MimePart {
    Leaf {
        mime_type: String,
        /// base64url body data, absent for attachments stored out of line
        data: Option<String>,
    },
    Multipart {
        parts: Vec<MimePart>,
    },
}

impl MimePart {
    /// Build the tree from an API payload
    pub fn from_api(part: &MessagePart) -> Self {
        match &part.parts {
            Some(parts) if !parts.is_empty() => MimePart::Multipart {
                parts: parts.iter().map(MimePart::from_api).collect(),
            },
            _ => MimePart::Leaf {
                mime_type: part.mime_type.clone().unwrap_or_default(),
                data: part.body.as_ref().and_then(|b| b.data.clone()),
            },
        }
    }
}

/// Extract the plain text of an API payload
pub fn extract_payload(payload: &MessagePart) -> String {
    extract(&MimePart::from_api(payload))
}

/// Extract the plain text of a part tree
pub fn extract(part: &MimePart) -> String {
    let mut segments = Vec::new();
    collect(part, 0, &mut segments);
    segments.join("\n").trim().to_string()
}

fn collect(part: &MimePart, depth: usize, segments: &mut Vec<String>) {
    if depth > MAX_DEPTH {
        warn!("MIME tree deeper than {} levels, skipping the rest", MAX_DEPTH);
        return;
    }

    match part {
        MimePart::Multipart { parts } => {
            for sub in parts {
                collect(sub, depth + 1, segments);
            }
        }
        MimePart::Leaf { mime_type, data } => {
            let mime_type = mime_type.to_ascii_lowercase();
            let is_plain = mime_type.starts_with("text/plain");
            let is_html = mime_type.starts_with("text/html");
            if !is_plain && !is_html {
                return;
            }

            let Some(data) = data else { return };
            let Some(bytes) = decode_base64_body(data) else {
                warn!("Skipping undecodable {} part", mime_type);
                return;
            };

            let text = String::from_utf8_lossy(&bytes);
            let text = if is_html {
                html_to_text(&text)
            } else {
                text.trim().to_string()
            };

            if !text.is_empty() {
                segments.push(text);
            }
        }
    }
}

/// Decode base64-encoded body data
///
/// Gmail uses URL-safe base64 but padding can vary, so we try multiple decoders.
pub fn decode_base64_body(data: &str) -> Option<Vec<u8>> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    decoders
        .iter()
        .find_map(|decoder| decoder.decode(&cleaned).ok())
        .or_else(|| BASE64_URL_SAFE_NO_PAD.decode(cleaned.trim_end_matches('=')).ok())
}

/// Reduce an HTML document to its visible text
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();
    render(document.root_element(), &mut out, 0);

    let mut lines: Vec<&str> = Vec::new();
    for line in out.lines().map(str::trim) {
        if line.is_empty() && lines.last().is_none_or(|l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    lines.join("\n").trim().to_string()
}

fn render(element: ElementRef<'_>, out: &mut String, depth: usize) {
    if depth > MAX_DEPTH * 8 {
        return;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_text(out, text),
            Node::Element(el) => {
                let name = el.name();
                if HIDDEN_TAGS.contains(&name) {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                let Some(child_ref) = ElementRef::wrap(child) else {
                    continue;
                };

                let block = BLOCK_TAGS.contains(&name);
                if block {
                    break_line(out);
                }
                render(child_ref, out, depth + 1);
                if block {
                    break_line(out);
                } else if name == "td" || name == "th" {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

/// Append text with runs of whitespace collapsed to one space
fn push_text(out: &mut String, text: &str) {
    let at_line_start = out.is_empty() || out.ends_with(char::is_whitespace);
    let mut words = text.split_whitespace().peekable();

    if words.peek().is_none() {
        if !text.is_empty() && !at_line_start {
            out.push(' ');
        }
        return;
    }

    if text.starts_with(char::is_whitespace) && !at_line_start {
        out.push(' ');
    }
    let mut first = true;
    for word in words {
        if !first {
            out.push(' ');
        }
        out.push_str(word);
        first = false;
    }
    if text.ends_with(char::is_whitespace) {
        out.push(' ');
    }
}

fn break_line(out: &mut String) {
    let trimmed = out.trim_end_matches(' ').len();
    out.truncate(trimmed);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}
