/*
 * node.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Finalized node model for galley documents.
 */

//! Finalized node model.
//!
//! Nodes arrive from an external parser as an already-validated tree. This
//! module defines the typed, finalized shape of that tree:
//!
//! - [`Node`] - a text run or an element, with a stable [`NodeId`] and a
//!   fixed set of structural tags ([`NodeTags`])
//! - [`NodeSpec`] - the polymorphic behavior attached to element nodes
//!   (rendering, optional delayed rendering)
//! - [`NodeList`] - a finalized sequence of nodes, either inline content or
//!   decomposed into [`Block`]s
//!
//! Structural tags are attached once, at construction; there is no post-hoc
//! attribute injection on nodes.

use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::output::Output;
use crate::render::RenderContext;

/// Stable identity of a node within one document.
///
/// Used to key delayed-render entries and to make feature registrations
/// idempotent across render passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Allocator for [`NodeId`]s, one per document tree under construction.
#[derive(Debug, Default)]
pub struct NodeIdGen {
    next: u64,
}

impl NodeIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }
}

/// Byte range in the original markup source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Structural tags attached to a node when the parser finalizes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeTags {
    /// `Some(true)` for block-level elements, `Some(false)` for inline ones,
    /// `None` when the block level must be inferred from context.
    pub is_block_level: Option<bool>,
    /// A block-level node that reads as the lead-in of the following
    /// paragraph (a "run-in heading") rather than as its own block.
    pub is_block_heading: bool,
    /// A pure paragraph-break marker (e.g. a blank line); it breaks
    /// paragraphs but emits nothing itself.
    pub is_paragraph_break: bool,
    /// Whitespace immediately following this node is an artifact and must be
    /// stripped during paragraph finalization.
    pub strip_following_whitespace: bool,
    /// Whitespace immediately preceding this node must be stripped.
    pub strip_preceding_whitespace: bool,
}

impl NodeTags {
    pub fn inline() -> Self {
        Self {
            is_block_level: Some(false),
            ..Self::default()
        }
    }

    pub fn block() -> Self {
        Self {
            is_block_level: Some(true),
            ..Self::default()
        }
    }

    pub fn paragraph_break() -> Self {
        Self {
            is_block_level: Some(true),
            is_paragraph_break: true,
            ..Self::default()
        }
    }
}

/// Behavior of an element node.
///
/// Non-delayed specs produce their output directly from `render`. A spec
/// that reports `is_delayed` participates in the two-phase protocol instead:
/// during the first pass only `prepare_delayed_render` runs (to register the
/// node with the relevant feature managers), and `render` runs once the
/// whole document has been traversed.
pub trait NodeSpec: fmt::Debug {
    fn render(&self, node: &Node, ctx: &mut RenderContext<'_>) -> Result<Output>;

    fn is_delayed(&self, _node: &Node) -> bool {
        false
    }

    fn prepare_delayed_render(&self, _node: &Node, _ctx: &mut RenderContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// A run of characters.
///
/// `simplified` is filled in during node-list finalization (whitespace
/// collapse and edge trimming); renderers use [`TextNode::value`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextNode {
    pub raw: String,
    pub simplified: Option<String>,
}

impl TextNode {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            simplified: None,
        }
    }

    /// The text to render: the simplified form when finalization produced
    /// one, the raw characters otherwise.
    pub fn value(&self) -> &str {
        self.simplified.as_deref().unwrap_or(&self.raw)
    }
}

/// An element node: a spec plus its (already finalized) content, if any.
#[derive(Debug, Clone)]
pub struct ElementNode {
    pub spec: Rc<dyn NodeSpec>,
    pub content: Option<NodeList>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Text(TextNode),
    Element(ElementNode),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub span: SourceSpan,
    pub tags: NodeTags,
    pub kind: NodeKind,
}

impl Node {
    /// An inline text node.
    pub fn text(id: NodeId, raw: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            id,
            span,
            tags: NodeTags::default(),
            kind: NodeKind::Text(TextNode::new(raw)),
        }
    }

    /// An element node with the given tags.
    pub fn element(
        id: NodeId,
        spec: Rc<dyn NodeSpec>,
        content: Option<NodeList>,
        tags: NodeTags,
        span: SourceSpan,
    ) -> Self {
        Self {
            id,
            span,
            tags,
            kind: NodeKind::Element(ElementNode { spec, content }),
        }
    }

    /// A pure paragraph-break marker (blank line).
    pub fn paragraph_break(id: NodeId, span: SourceSpan) -> Self {
        Self {
            id,
            span,
            tags: NodeTags::paragraph_break(),
            kind: NodeKind::Text(TextNode::new("\n\n")),
        }
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match &self.kind {
            NodeKind::Text(t) => Some(t),
            NodeKind::Element(_) => None,
        }
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match &self.kind {
            NodeKind::Element(e) => Some(e),
            NodeKind::Text(_) => None,
        }
    }

    /// True for a text node consisting entirely of whitespace characters.
    pub fn is_whitespace_text(&self) -> bool {
        match &self.kind {
            NodeKind::Text(t) => {
                !t.raw.is_empty() && t.raw.chars().all(|c| matches!(c, ' ' | '\t' | '\n' | '\r'))
            }
            NodeKind::Element(_) => false,
        }
    }

    /// Concatenated character content of this node and its descendants.
    pub fn text_content(&self) -> String {
        match &self.kind {
            NodeKind::Text(t) => t.value().to_owned(),
            NodeKind::Element(e) => e
                .content
                .as_ref()
                .map(NodeList::text_content)
                .unwrap_or_default(),
        }
    }
}

/// A finalized block: either a self-contained block-level node or a
/// paragraph grouping a run of inline nodes.
#[derive(Debug, Clone)]
pub enum Block {
    Node(Node),
    Paragraph(Vec<Node>),
}

/// How a finalized node list is laid out.
#[derive(Debug, Clone)]
pub enum Layout {
    /// Pure inline content, rendered in sequence.
    Inline(Vec<Node>),
    /// Block-level content, decomposed into paragraphs and standalone
    /// blocks.
    Blocks(Vec<Block>),
}

/// A finalized node list, produced by
/// [`finalize_node_list`](crate::blocks::finalize_node_list).
#[derive(Debug, Clone)]
pub struct NodeList {
    pub is_block_level: bool,
    pub layout: Layout,
}

impl NodeList {
    /// Concatenated character content of the whole list.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        match &self.layout {
            Layout::Inline(nodes) => {
                for n in nodes {
                    out.push_str(&n.text_content());
                }
            }
            Layout::Blocks(blocks) => {
                for b in blocks {
                    match b {
                        Block::Node(n) => out.push_str(&n.text_content()),
                        Block::Paragraph(nodes) => {
                            for n in nodes {
                                out.push_str(&n.text_content());
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// Number of blocks (1 for inline content).
    pub fn block_count(&self) -> usize {
        match &self.layout {
            Layout::Inline(_) => 1,
            Layout::Blocks(blocks) => blocks.len(),
        }
    }
}
