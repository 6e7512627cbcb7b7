//! Minimal plain-text backend for unit tests.

use crate::output::{HeadingStyle, Output, OutputBackend, TextFormat};

/// A no-escaping text backend with a switchable delayed-marker capability,
/// so both assembly strategies can be exercised against identical content.
#[derive(Debug, Clone)]
pub(crate) struct PlainBackend {
    pub markers: bool,
}

impl Default for PlainBackend {
    fn default() -> Self {
        Self { markers: true }
    }
}

impl OutputBackend for PlainBackend {
    fn format_name(&self) -> &str {
        "plain"
    }

    fn supports_delayed_markers(&self) -> bool {
        self.markers
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
        if style.run_in {
            let mut out = content;
            out.push_str(": ");
            return out;
        }
        let mut out = Output::text("#".repeat(style.level.max(1) as usize));
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
        let mut out = Output::empty();
        let mut first = true;
        for (tag, body) in items {
            if !first {
                out.push_str("\n");
            }
            first = false;
            out.append(tag);
            out.push_str(" ");
            out.append(body);
        }
        out
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
