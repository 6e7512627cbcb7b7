/*
 * markdown.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Markdown output backend.
 */

//! Markdown backend.
//!
//! Escapes Markdown metacharacters in text values, renders `#`-prefixed
//! headings (run-in levels as a bold lead-in), `[text](target)` links, and
//! anchor targets as `<a name="..."></a>`. Supports delayed markers.

use galley_core::output::{HeadingStyle, Output, OutputBackend, TextFormat};
use once_cell::sync::Lazy;
use regex::Regex;

static RX_MD_SPECIALS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\\`*_~{}\[\]<>()#+.!|-]").unwrap());

/// Backslash-escape Markdown metacharacters.
fn escape_markdown(s: &str) -> String {
    RX_MD_SPECIALS
        .replace_all(s, |caps: &regex::Captures<'_>| format!("\\{}", &caps[0]))
        .into_owned()
}

fn anchor(target_id: Option<&str>) -> String {
    match target_id {
        Some(id) => format!("<a name=\"{id}\"></a>"),
        None => String::new(),
    }
}

/// Markdown output backend.
#[derive(Debug, Clone, Default)]
pub struct MarkdownBackend;

impl MarkdownBackend {
    pub fn new() -> Self {
        Self
    }
}

impl OutputBackend for MarkdownBackend {
    fn format_name(&self) -> &str {
        "markdown"
    }

    fn supports_delayed_markers(&self) -> bool {
        true
    }

    fn render_value(&self, text: &str) -> Output {
        Output::text(escape_markdown(text))
    }

    fn render_join_blocks(&self, blocks: Vec<Output>) -> Output {
        let mut out = Output::empty();
        let mut first = true;
        for block in blocks {
            if block.is_empty() {
                continue;
            }
            if !first {
                out.push_str("\n\n");
            }
            first = false;
            out.append(block);
        }
        out
    }

    fn render_paragraph(&self, content: Output) -> Output {
        content
    }

    fn render_text_format(&self, formats: &[TextFormat], content: Output) -> Output {
        let mut out = content;
        for format in formats.iter().rev() {
            out = match format {
                TextFormat::Bold => Output::wrap("**", out, "**"),
                TextFormat::Emph => Output::wrap("*", out, "*"),
                TextFormat::Code => Output::wrap("`", out, "`"),
            };
        }
        out
    }

    fn render_heading(&self, content: Output, style: &HeadingStyle<'_>) -> Output {
        if style.run_in {
            let mut out = Output::text(anchor(style.target_id));
            out.append(Output::wrap("**", content, "**"));
            out.push_str(" ");
            return out;
        }
        let mut out = Output::text(anchor(style.target_id));
        out.push_str(&"#".repeat(style.level.clamp(1, 6) as usize));
        out.push_str(" ");
        out.append(content);
        out
    }

    fn render_link(
        &self,
        _role: &str,
        href: &str,
        display: Output,
        _annotations: &[String],
    ) -> Output {
        Output::wrap("[", display, &format!("]({href})"))
    }

    fn render_enumeration(&self, items: Vec<(Output, Output)>, _annotations: &[String]) -> Output {
        let mut blocks = Vec::with_capacity(items.len());
        for (tag, body) in items {
            let mut line = tag;
            line.push_str(": ");
            line.append(body);
            blocks.push(line);
        }
        self.render_join_blocks(blocks)
    }

    fn render_semantic_block(
        &self,
        content: Output,
        _role: &str,
        target_id: Option<&str>,
    ) -> Output {
        let mut out = Output::text(anchor(target_id));
        out.append(content);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markdown_metacharacters() {
        let backend = MarkdownBackend::new();
        assert_eq!(
            backend.render_value("a *b* [c]").into_text().unwrap(),
            "a \\*b\\* \\[c\\]"
        );
    }

    #[test]
    fn heading_levels_map_to_hash_prefixes() {
        let backend = MarkdownBackend::new();
        let h = backend.render_heading(
            backend.render_value("Intro"),
            &HeadingStyle {
                level: 2,
                run_in: false,
                target_id: Some("sec--Intro"),
            },
        );
        assert_eq!(
            h.into_text().unwrap(),
            "<a name=\"sec--Intro\"></a>## Intro"
        );
    }

    #[test]
    fn run_in_headings_render_bold() {
        let backend = MarkdownBackend::new();
        let h = backend.render_heading(
            backend.render_value("Note"),
            &HeadingStyle {
                level: 4,
                run_in: true,
                target_id: None,
            },
        );
        assert_eq!(h.into_text().unwrap(), "**Note** ");
    }

    #[test]
    fn nested_text_formats() {
        let backend = MarkdownBackend::new();
        let out = backend.render_text_format(
            &[TextFormat::Bold, TextFormat::Emph],
            backend.render_value("x"),
        );
        assert_eq!(out.into_text().unwrap(), "***x***");
    }
}
