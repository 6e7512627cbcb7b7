/*
 * latex.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * LaTeX output backend.
 */

//! LaTeX backend.
//!
//! Escapes TeX specials in text values, maps heading levels to the
//! sectioning commands, and renders anchor links as `\hyperref` against
//! pinned labels. No delayed-marker support, so documents with delayed
//! content render through the full second pass.

use galley_core::output::{HeadingStyle, Output, OutputBackend, TextFormat};

/// Prefix for generated `\label` names, keeping them clear of user labels.
const LABEL_PREFIX: &str = "x:";

/// Escape LaTeX special characters.
fn escape_latex(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            '%' => out.push_str("\\%"),
            '&' => out.push_str("\\&"),
            '#' => out.push_str("\\#"),
            '_' => out.push_str("\\_"),
            '$' => out.push_str("\\$"),
            '^' => out.push_str("\\^{}"),
            '~' => out.push_str("\\~{}"),
            '–' => out.push_str("--"),
            '—' => out.push_str("---"),
            _ => out.push(c),
        }
    }
    out
}

/// LaTeX output backend.
#[derive(Debug, Clone, Default)]
pub struct LatexBackend;

impl LatexBackend {
    pub fn new() -> Self {
        Self
    }

    fn heading_command(level: u8) -> &'static str {
        match level {
            1 => "section",
            2 => "subsection",
            3 => "subsubsection",
            4 => "paragraph",
            5 => "subparagraph",
            _ => "subsubparagraph",
        }
    }
}

impl OutputBackend for LatexBackend {
    fn format_name(&self) -> &str {
        "latex"
    }

    fn render_value(&self, text: &str) -> Output {
        Output::text(escape_latex(text))
    }

    fn render_join_blocks(&self, blocks: Vec<Output>) -> Output {
        // blocks often end in `%\n` comment glue; trim the edges so a
        // joined block cannot accidentally open a TeX paragraph break
        let mut out = Output::empty();
        let mut first = true;
        for block in blocks {
            let block = block.trim_edges();
            if block.is_empty() {
                continue;
            }
            if !first {
                out.push_str("\n\n");
            }
            first = false;
            out.append(block);
        }
        out.push_str("\n");
        out
    }

    fn render_paragraph(&self, content: Output) -> Output {
        content
    }

    fn render_text_format(&self, formats: &[TextFormat], content: Output) -> Output {
        let mut out = content;
        for format in formats.iter().rev() {
            let command = match format {
                TextFormat::Bold => "textbf",
                TextFormat::Emph => "textit",
                TextFormat::Code => "texttt",
            };
            out = Output::wrap(&format!("\\{command}{{"), out, "}");
        }
        out
    }

    fn render_heading(&self, content: Output, style: &HeadingStyle<'_>) -> Output {
        let command = Self::heading_command(style.level);
        let mut out = Output::wrap(&format!("\\{command}{{"), content, "}");
        if let Some(id) = style.target_id {
            out.push_str(&format!("%\n\\label{{{LABEL_PREFIX}{id}}}%\n"));
        }
        out
    }

    fn render_link(
        &self,
        _role: &str,
        href: &str,
        display: Output,
        _annotations: &[String],
    ) -> Output {
        match href.strip_prefix('#') {
            Some(target) => Output::wrap(
                &format!("\\hyperref[{LABEL_PREFIX}{target}]{{"),
                display,
                "}",
            ),
            None => Output::wrap(&format!("\\href{{{href}}}{{"), display, "}"),
        }
    }

    fn render_enumeration(&self, items: Vec<(Output, Output)>, _annotations: &[String]) -> Output {
        let mut out = Output::text("\\begin{itemize}\n");
        for (tag, body) in items {
            out.append(Output::wrap("\\item[{", tag, "}] "));
            out.append(body);
            out.push_str("\n");
        }
        out.push_str("\\end{itemize}");
        out
    }

    fn render_semantic_block(
        &self,
        content: Output,
        _role: &str,
        target_id: Option<&str>,
    ) -> Output {
        match target_id {
            Some(id) => {
                let mut out = Output::text(format!(
                    "\\phantomsection\\label{{{LABEL_PREFIX}{id}}}%\n"
                ));
                out.append(content);
                out
            }
            None => content,
        }
    }
}
