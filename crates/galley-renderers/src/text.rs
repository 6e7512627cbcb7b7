/*
 * text.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Plain-text output backend.
 */

//! Plain-text backend.
//!
//! No escaping. Headings at levels 1-3 are underlined (`=`, `-`, `~`);
//! run-in levels render as a `Title:` lead-in. Anchor links (`#...`)
//! display only their text; external links append the URL in angle
//! brackets. No delayed-marker support, so documents with delayed content
//! render through the full second pass.

use galley_core::output::{HeadingStyle, Output, OutputBackend, Segment, TextFormat};

/// Length of the visible text of an output (placeholders count for
/// nothing; they only occur in first-pass output, which is discarded for
/// this backend).
fn visible_len(out: &Output) -> usize {
    out.segments()
        .iter()
        .map(|s| match s {
            Segment::Text(t) => t.chars().count(),
            Segment::Placeholder(_) => 0,
        })
        .sum()
}

/// Plain-text output backend.
#[derive(Debug, Clone, Default)]
pub struct TextBackend;

impl TextBackend {
    pub fn new() -> Self {
        Self
    }
}

impl OutputBackend for TextBackend {
    fn format_name(&self) -> &str {
        "text"
    }

    fn render_value(&self, text: &str) -> Output {
        Output::text(text)
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

    fn render_text_format(&self, _formats: &[TextFormat], content: Output) -> Output {
        content
    }

    fn render_heading(&self, content: Output, style: &HeadingStyle<'_>) -> Output {
        match style.level {
            1 | 2 | 3 => {
                let underline_char = match style.level {
                    1 => '=',
                    2 => '-',
                    _ => '~',
                };
                let underline = underline_char.to_string().repeat(visible_len(&content));
                let mut out = content;
                out.push_str("\n");
                out.push_str(&underline);
                out
            }
            // run-in levels: an indented `Title:  ` lead-in
            level => {
                let indent = "    ".repeat((level.max(4) - 4) as usize);
                let mut out = Output::text(indent);
                out.append(content);
                out.push_str(":  ");
                out
            }
        }
    }

    fn render_link(
        &self,
        _role: &str,
        href: &str,
        display: Output,
        _annotations: &[String],
    ) -> Output {
        // never display local anchors
        if href.starts_with('#') {
            return display;
        }
        let mut out = display;
        out.push_str(&format!(" <{href}>"));
        out
    }

    fn render_enumeration(&self, items: Vec<(Output, Output)>, _annotations: &[String]) -> Output {
        let max_tag_width = items.iter().map(|(tag, _)| visible_len(tag)).max().unwrap_or(0);
        let mut blocks = Vec::with_capacity(items.len());
        for (tag, body) in items {
            let tag_text = tag.into_text().unwrap_or_default();
            let mut line = Output::text(format!("{:>width$} ", tag_text, width = max_tag_width + 2));
            line.append(body);
            blocks.push(line);
        }
        self.render_join_blocks(blocks)
    }

    fn render_semantic_block(
        &self,
        content: Output,
        _role: &str,
        _target_id: Option<&str>,
    ) -> Output {
        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_are_underlined() {
        let backend = TextBackend::new();
        let h = backend.render_heading(
            backend.render_value("Intro"),
            &HeadingStyle {
                level: 1,
                run_in: false,
                target_id: None,
            },
        );
        assert_eq!(h.into_text().unwrap(), "Intro\n=====");
    }

    #[test]
    fn run_in_headings_become_lead_ins() {
        let backend = TextBackend::new();
        let h = backend.render_heading(
            backend.render_value("Note"),
            &HeadingStyle {
                level: 5,
                run_in: true,
                target_id: None,
            },
        );
        assert_eq!(h.into_text().unwrap(), "    Note:  ");
    }

    #[test]
    fn anchor_links_show_only_their_text() {
        let backend = TextBackend::new();
        let local = backend.render_link("ref", "#eq-1", backend.render_value("eq. (1)"), &[]);
        assert_eq!(local.into_text().unwrap(), "eq. (1)");

        let external =
            backend.render_link("href", "https://example.org", backend.render_value("site"), &[]);
        assert_eq!(external.into_text().unwrap(), "site <https://example.org>");
    }

    #[test]
    fn enumeration_right_aligns_tags() {
        let backend = TextBackend::new();
        let out = backend.render_enumeration(
            vec![
                (backend.render_value("*"), backend.render_value("first")),
                (backend.render_value("**"), backend.render_value("second")),
            ],
            &[],
        );
        assert_eq!(out.into_text().unwrap(), "   * first\n\n  ** second");
    }
}
