/*
 * html.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * HTML output backend.
 */

//! HTML backend.
//!
//! Produces HTML fragments: paragraphs as `<p>`, headings as `<h1>`-`<h3>`
//! (deeper, run-in levels as `<span>`, which may legally sit inside the
//! paragraph element), enumerations as `<dl>` definition lists, and
//! semantic blocks as `<div>` containers. Supports delayed markers, so
//! assembly splices resolved content structurally into the first-pass
//! output.

use galley_core::output::{HeadingStyle, Output, OutputBackend, TextFormat};

/// Escape HTML special characters.
fn escape_html(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '&' => "&amp;".to_string(),
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&#39;".to_string(),
            _ => c.to_string(),
        })
        .collect()
}

/// `<tag attr="..." class="...">`, with attribute values escaped.
fn open_tag(tag: &str, attrs: &[(&str, &str)], classes: &[&str]) -> String {
    let mut s = format!("<{tag}");
    for (name, value) in attrs {
        s.push_str(&format!(" {name}=\"{}\"", escape_html(value)));
    }
    if !classes.is_empty() {
        s.push_str(&format!(" class=\"{}\"", escape_html(&classes.join(" "))));
    }
    s.push('>');
    s
}

fn wrap_in_tag(tag: &str, attrs: &[(&str, &str)], classes: &[&str], content: Output) -> Output {
    Output::wrap(&open_tag(tag, attrs, classes), content, &format!("</{tag}>"))
}

/// HTML output backend.
#[derive(Debug, Clone, Default)]
pub struct HtmlBackend;

impl HtmlBackend {
    pub fn new() -> Self {
        Self
    }

    /// The tag used for a heading level; levels 4-6 render as `<span>`
    /// because those run-in headings may sit inside `<p>...</p>`.
    fn heading_tag(level: u8) -> &'static str {
        match level {
            1 => "h1",
            2 => "h2",
            3 => "h3",
            _ => "span",
        }
    }
}

impl OutputBackend for HtmlBackend {
    fn format_name(&self) -> &str {
        "html"
    }

    fn supports_delayed_markers(&self) -> bool {
        true
    }

    fn render_value(&self, text: &str) -> Output {
        Output::text(escape_html(text))
    }

    fn render_join_blocks(&self, blocks: Vec<Output>) -> Output {
        let mut out = Output::empty();
        let mut first = true;
        for block in blocks {
            if block.is_empty() {
                continue;
            }
            if !first {
                out.push_str("\n");
            }
            first = false;
            out.append(block);
        }
        out
    }

    fn render_paragraph(&self, content: Output) -> Output {
        Output::wrap("<p>", content, "</p>")
    }

    fn render_text_format(&self, formats: &[TextFormat], content: Output) -> Output {
        let classes: Vec<&str> = formats
            .iter()
            .map(|f| match f {
                TextFormat::Bold => "textbf",
                TextFormat::Emph => "textit",
                TextFormat::Code => "texttt",
            })
            .collect();
        wrap_in_tag("span", &[], &classes, content)
    }

    fn render_heading(&self, content: Output, style: &HeadingStyle<'_>) -> Output {
        let mut classes = vec![format!("heading-level-{}", style.level)];
        if style.run_in {
            classes.push("heading-inline".to_owned());
        }
        let classes: Vec<&str> = classes.iter().map(String::as_str).collect();
        let attrs: Vec<(&str, &str)> = match style.target_id {
            Some(id) => vec![("id", id)],
            None => Vec::new(),
        };
        let mut out = wrap_in_tag(Self::heading_tag(style.level), &attrs, &classes, content);
        if style.run_in {
            // visually the space belongs after a run-in heading
            out.push_str(" ");
        }
        out
    }

    fn render_link(
        &self,
        role: &str,
        href: &str,
        display: Output,
        annotations: &[String],
    ) -> Output {
        let mut classes = vec![format!("href-{role}")];
        classes.extend(annotations.iter().cloned());
        let classes: Vec<&str> = classes.iter().map(String::as_str).collect();
        wrap_in_tag("a", &[("href", href)], &classes, display)
    }

    fn render_enumeration(&self, items: Vec<(Output, Output)>, annotations: &[String]) -> Output {
        let mut classes = vec!["enumeration"];
        classes.extend(annotations.iter().map(String::as_str));
        let mut body = Output::empty();
        for (tag, item) in items {
            body.append(wrap_in_tag("dt", &[], &[], tag));
            body.append(wrap_in_tag("dd", &[], &[], item));
        }
        wrap_in_tag("dl", &[], &classes, body)
    }

    fn render_semantic_block(
        &self,
        content: Output,
        role: &str,
        target_id: Option<&str>,
    ) -> Output {
        let attrs: Vec<(&str, &str)> = match target_id {
            Some(id) => vec![("id", id)],
            None => Vec::new(),
        };
        wrap_in_tag("div", &attrs, &[role], content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html_specials() {
        let backend = HtmlBackend::new();
        assert_eq!(
            backend.render_value("a < b & \"c\"").into_text().unwrap(),
            "a &lt; b &amp; &quot;c&quot;"
        );
    }

    #[test]
    fn paragraph_and_blocks() {
        let backend = HtmlBackend::new();
        let para = backend.render_paragraph(backend.render_value("hello"));
        let out = backend.render_join_blocks(vec![para, Output::empty()]);
        assert_eq!(out.into_text().unwrap(), "<p>hello</p>");
    }

    #[test]
    fn headings_by_level() {
        let backend = HtmlBackend::new();
        let h = backend.render_heading(
            backend.render_value("Intro"),
            &HeadingStyle {
                level: 1,
                run_in: false,
                target_id: Some("sec--Intro"),
            },
        );
        assert_eq!(
            h.into_text().unwrap(),
            "<h1 id=\"sec--Intro\" class=\"heading-level-1\">Intro</h1>"
        );

        let run_in = backend.render_heading(
            backend.render_value("Note"),
            &HeadingStyle {
                level: 4,
                run_in: true,
                target_id: None,
            },
        );
        assert_eq!(
            run_in.into_text().unwrap(),
            "<span class=\"heading-level-4 heading-inline\">Note</span> "
        );
    }

    #[test]
    fn links_carry_role_and_annotations() {
        let backend = HtmlBackend::new();
        let link = backend.render_link(
            "ref",
            "#eq-1",
            backend.render_value("eq. (1)"),
            &["ref-eq".to_owned()],
        );
        assert_eq!(
            link.into_text().unwrap(),
            "<a href=\"#eq-1\" class=\"href-ref ref-eq\">eq. (1)</a>"
        );
    }

    #[test]
    fn enumeration_renders_definition_list() {
        let backend = HtmlBackend::new();
        let out = backend.render_enumeration(
            vec![(backend.render_value("*"), backend.render_value("first"))],
            &["endnotes".to_owned()],
        );
        assert_eq!(
            out.into_text().unwrap(),
            "<dl class=\"enumeration endnotes\"><dt>*</dt><dd>first</dd></dl>"
        );
    }
}
