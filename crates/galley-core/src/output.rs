/*
 * output.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Structured render output and the output-backend contract.
 */

//! Structured render output.
//!
//! The pipeline never assembles final text directly from strings: the first
//! render pass produces an [`Output`], a sequence of text segments
//! interleaved with [`Segment::Placeholder`] markers standing in for
//! delayed-render nodes. Substituting resolved content is then a structural
//! replacement ([`Output::substitute`]) rather than a textual scan, so no
//! sentinel string can ever collide with document content.
//!
//! [`OutputBackend`] is the contract the concrete output formats (HTML,
//! text, Markdown, LaTeX) implement. The core only assembles pieces
//! produced by a backend; it never formats text itself.

use indexmap::IndexMap;

use crate::error::{GalleyError, Result};
use crate::node::NodeId;

/// One segment of rendered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    /// Stand-in for the delayed-render node with this id.
    Placeholder(NodeId),
}

/// Rendered content: a flat run of text and placeholder segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    segments: Vec<Segment>,
}

impl Output {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            return Self::empty();
        }
        Self {
            segments: vec![Segment::Text(text)],
        }
    }

    pub fn placeholder(id: NodeId) -> Self {
        Self {
            segments: vec![Segment::Placeholder(id)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Append a text segment, merging with a trailing text segment.
    pub fn push_str(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Segment::Text(last)) = self.segments.last_mut() {
            last.push_str(text);
        } else {
            self.segments.push(Segment::Text(text.to_owned()));
        }
    }

    /// Append all segments of `other`.
    pub fn append(&mut self, other: Output) {
        for seg in other.segments {
            match seg {
                Segment::Text(t) => self.push_str(&t),
                Segment::Placeholder(id) => self.segments.push(Segment::Placeholder(id)),
            }
        }
    }

    /// `prefix` + `inner` + `suffix`, as one output.
    pub fn wrap(prefix: &str, inner: Output, suffix: &str) -> Output {
        let mut out = Output::text(prefix);
        out.append(inner);
        out.push_str(suffix);
        out
    }

    /// Concatenate a sequence of outputs.
    pub fn join(pieces: impl IntoIterator<Item = Output>) -> Output {
        let mut out = Output::empty();
        for piece in pieces {
            out.append(piece);
        }
        out
    }

    pub fn has_placeholders(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Placeholder(_)))
    }

    /// Replace every placeholder with its resolved content.
    ///
    /// Fails if a placeholder has no resolved value; a half-substituted
    /// output is never produced.
    pub fn substitute(self, resolved: &IndexMap<NodeId, Output>) -> Result<Output> {
        let mut out = Output::empty();
        for seg in self.segments {
            match seg {
                Segment::Text(t) => out.push_str(&t),
                Segment::Placeholder(id) => {
                    let value = resolved.get(&id).ok_or_else(|| {
                        GalleyError::render(format!(
                            "no resolved content for delayed node {id}"
                        ))
                    })?;
                    out.append(value.clone());
                }
            }
        }
        Ok(out)
    }

    /// Trim whitespace from the text edges of this output: leading
    /// whitespace of the leading text segments and trailing whitespace of
    /// the trailing ones. Placeholders are left untouched.
    pub fn trim_edges(self) -> Output {
        let mut segments = self.segments;
        for seg in segments.iter_mut() {
            match seg {
                Segment::Text(t) => {
                    *t = t.trim_start().to_owned();
                    if !t.is_empty() {
                        break;
                    }
                }
                Segment::Placeholder(_) => break,
            }
        }
        for seg in segments.iter_mut().rev() {
            match seg {
                Segment::Text(t) => {
                    *t = t.trim_end().to_owned();
                    if !t.is_empty() {
                        break;
                    }
                }
                Segment::Placeholder(_) => break,
            }
        }
        segments.retain(|seg| !matches!(seg, Segment::Text(t) if t.is_empty()));
        Output { segments }
    }

    /// Collapse to plain text. Fails if any placeholder remains.
    pub fn into_text(self) -> Result<String> {
        let mut out = String::new();
        for seg in self.segments {
            match seg {
                Segment::Text(t) => out.push_str(&t),
                Segment::Placeholder(id) => {
                    return Err(GalleyError::render(format!(
                        "unresolved placeholder for delayed node {id} in final output"
                    )));
                }
            }
        }
        Ok(out)
    }
}

impl From<&str> for Output {
    fn from(s: &str) -> Self {
        Output::text(s)
    }
}

impl From<String> for Output {
    fn from(s: String) -> Self {
        Output::text(s)
    }
}

/// Inline text formatting requested through [`OutputBackend::render_text_format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Bold,
    Emph,
    Code,
}

/// Heading rendering parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadingStyle<'a> {
    /// 1 (highest) through 6.
    pub level: u8,
    /// Run-in headings render as an inline lead-in of the following
    /// paragraph content rather than as their own block element.
    pub run_in: bool,
    pub target_id: Option<&'a str>,
}

/// The contract an output format implements.
///
/// All methods assemble or produce [`Output`] values; text escaping is the
/// backend's concern and happens exactly once, in `render_value`.
pub trait OutputBackend {
    /// Short name of the output format ("html", "text", ...).
    fn format_name(&self) -> &str;

    /// Whether placeholders may be embedded in this backend's first-pass
    /// output and spliced afterwards. Backends answering `false` get a full
    /// second render pass instead.
    fn supports_delayed_markers(&self) -> bool {
        false
    }

    /// Escape and render a plain text value.
    fn render_value(&self, text: &str) -> Output;

    /// Join inline pieces.
    fn render_join(&self, pieces: Vec<Output>) -> Output {
        Output::join(pieces)
    }

    /// Join block-level pieces (paragraphs, standalone blocks).
    fn render_join_blocks(&self, blocks: Vec<Output>) -> Output;

    /// Wrap finished inline content as one paragraph.
    fn render_paragraph(&self, content: Output) -> Output;

    /// Render nothing (placed where a construct intentionally produces no
    /// output).
    fn render_nothing(&self) -> Output {
        Output::empty()
    }

    /// Apply inline text formatting.
    fn render_text_format(&self, formats: &[TextFormat], content: Output) -> Output;

    /// Render a document heading.
    fn render_heading(&self, content: Output, style: &HeadingStyle<'_>) -> Output;

    /// Render a link. `role` describes the kind of link ("ref", "endnote",
    /// ...); `annotations` carry extra semantic class names.
    fn render_link(
        &self,
        role: &str,
        href: &str,
        display: Output,
        annotations: &[String],
    ) -> Output;

    /// Render an enumeration of `(tag, body)` items (e.g. an endnote list).
    fn render_enumeration(&self, items: Vec<(Output, Output)>, annotations: &[String]) -> Output;

    /// Enclose block content in a structure conveying semantic information
    /// (a section, an endnotes container, ...).
    fn render_semantic_block(
        &self,
        content: Output,
        role: &str,
        target_id: Option<&str>,
    ) -> Output;
}
