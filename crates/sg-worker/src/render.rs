//! Placeholder rendering of markup sources.
//!
//! Markdown files are wrapped verbatim in a minimal HTML page and published
//! under an `.html` name. Every other file is published byte for byte.

use std::borrow::Cow;

const MARKDOWN_SUFFIXES: &[&str] = &[".md", ".markdown"];

/// A file ready to be written to the artifact store.
#[derive(Debug, PartialEq, Eq)]
pub struct RenderedFile<'a> {
    pub path: Cow<'a, str>,
    pub contents: Cow<'a, [u8]>,
}

fn markdown_stem(path: &str) -> Option<&str> {
    let lower = path.to_ascii_lowercase();
    MARKDOWN_SUFFIXES
        .iter()
        .find(|suffix| lower.ends_with(*suffix))
        .map(|suffix| &path[..path.len() - suffix.len()])
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// The path a tree entry is published under.
pub fn output_path(path: &str) -> Cow<'_, str> {
    match markdown_stem(path) {
        Some(stem) => Cow::Owned(format!("{stem}.html")),
        None => Cow::Borrowed(path),
    }
}

/// Map a tree entry to the file that gets published for it.
pub fn render<'a>(path: &'a str, payload: &'a [u8]) -> RenderedFile<'a> {
    match markdown_stem(path) {
        Some(_) => {
            let body = escape_html(&String::from_utf8_lossy(payload));
            RenderedFile {
                path: output_path(path),
                contents: Cow::Owned(
                    format!("<html><body><pre>{body}</pre></body></html>").into_bytes(),
                ),
            }
        }
        None => RenderedFile {
            path: Cow::Borrowed(path),
            contents: Cow::Borrowed(payload),
        },
    }
}
