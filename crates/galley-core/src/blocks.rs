/*
 * blocks.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Decomposition of flat node sequences into paragraphs and blocks.
 */

//! Block structure builder.
//!
//! Turns a flat node sequence into an ordered sequence of [`Block`]s:
//! standalone block-level nodes, and paragraphs grouping runs of inline
//! nodes. Run-in headings (block-level nodes tagged `is_block_heading`) are
//! grouped as the lead-in of the paragraph that follows them rather than
//! becoming their own block.
//!
//! Paragraph finalization simplifies whitespace: runs of whitespace collapse
//! to a single space, and the paragraph's leading/trailing edges are
//! trimmed. A node tagged `strip_following_whitespace` forces the next text
//! node's leading edge to be treated as a paragraph boundary even
//! mid-paragraph; `strip_preceding_whitespace` does the same for the
//! preceding text node's trailing edge.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{GalleyError, Result};
use crate::node::{Block, Layout, Node, NodeKind, NodeList};

static RX_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\n\r]+").unwrap());

/// Collapse whitespace runs to single spaces; trim the leading edge when
/// `is_head` and the trailing edge when `is_tail`.
pub fn simplify_whitespace(chars: &str, is_head: bool, is_tail: bool) -> String {
    let mut out = RX_SPACE.replace_all(chars, " ").into_owned();
    if is_head {
        out = out.trim_start().to_owned();
    }
    if is_tail {
        out = out.trim_end().to_owned();
    }
    out
}

/// Builds the block decomposition of one node sequence.
pub struct BlocksBuilder {
    pending_paragraph_nodes: Vec<Node>,
    blocks: Vec<Block>,
}

impl BlocksBuilder {
    pub fn new() -> Self {
        Self {
            pending_paragraph_nodes: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Consume the node sequence and produce the ordered block list.
    pub fn build(mut self, nodes: Vec<Node>) -> Vec<Block> {
        for n in nodes {
            let is_block_level = n.tags.is_block_level.unwrap_or(false);
            if is_block_level {
                if n.tags.is_block_heading {
                    // Run-in heading: break the paragraph only if one has
                    // actually started (more than a single pending heading);
                    // the heading then leads the next paragraph.
                    if self.paragraph_started() {
                        self.flush_paragraph();
                    }
                    self.pending_paragraph_nodes.push(n);
                    continue;
                }

                // New block-level item, causes a paragraph break.
                self.flush_paragraph();

                if n.tags.is_paragraph_break {
                    // Only a paragraph break marker, don't include it as a
                    // block.
                    continue;
                }

                self.blocks.push(Block::Node(n));
                continue;
            }

            if !self.paragraph_started() && n.is_whitespace_text() {
                // Leading whitespace of a paragraph is insignificant.
                continue;
            }

            self.pending_paragraph_nodes.push(n);
        }

        self.flush_paragraph();
        self.blocks
    }

    /// Whether the pending buffer holds more than a single run-in heading.
    fn paragraph_started(&self) -> bool {
        match self.pending_paragraph_nodes.as_slice() {
            [] => false,
            [only] => !only.tags.is_block_heading,
            _ => true,
        }
    }

    fn flush_paragraph(&mut self) {
        if self.pending_paragraph_nodes.is_empty() {
            return;
        }
        let paragraph_nodes = std::mem::take(&mut self.pending_paragraph_nodes);
        self.blocks
            .push(Block::Paragraph(finalize_paragraph(paragraph_nodes)));
    }
}

impl Default for BlocksBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Simplify whitespace across the text nodes of one finished paragraph.
fn finalize_paragraph(mut nodes: Vec<Node>) -> Vec<Node> {
    // (node index, is_head, is_tail) per text node
    let mut text_infos: Vec<(usize, bool, bool)> = Vec::new();

    let mut is_head = true;
    let mut seen_text = false;
    let mut first_element: Option<usize> = None;
    // index into text_infos of the latest text node still eligible as tail
    let mut tail_candidate: Option<usize> = None;
    let mut next_strips_leading = false;

    for (j, node) in nodes.iter().enumerate() {
        if !seen_text
            && first_element.is_some_and(|i| nodes[i].tags.is_block_heading)
        {
            // No text yet and the first element was the paragraph's run-in
            // heading; the upcoming text still counts as the head.
            is_head = true;
        }

        if node.tags.strip_preceding_whitespace {
            if let Some(t) = tail_candidate {
                text_infos[t].2 = true;
            }
        }

        match &node.kind {
            NodeKind::Text(_) => {
                text_infos.push((j, is_head || next_strips_leading, false));
                is_head = false;
                seen_text = true;
                tail_candidate = Some(text_infos.len() - 1);
            }
            NodeKind::Element(_) => {
                if first_element.is_none() {
                    first_element = Some(j);
                }
                is_head = false;
                tail_candidate = None;
            }
        }

        next_strips_leading = node.tags.strip_following_whitespace;
    }

    // The last text run of the paragraph is its tail.
    if let Some(t) = tail_candidate {
        text_infos[t].2 = true;
    }

    for (j, head, tail) in text_infos {
        if let NodeKind::Text(t) = &mut nodes[j].kind {
            t.simplified = Some(simplify_whitespace(&t.raw, head, tail));
        }
    }

    nodes
}

/// Finalize a node sequence into a [`NodeList`].
///
/// `declared_block_level` comes from the surrounding context (`None` means
/// "infer from the nodes"). An inline-only context containing a block-level
/// node is a fatal structural error carrying the offending node's source
/// span; inline context never silently swallows block content.
pub fn finalize_node_list(
    mut nodes: Vec<Node>,
    declared_block_level: Option<bool>,
) -> Result<NodeList> {
    let is_block_level = declared_block_level.unwrap_or_else(|| {
        nodes
            .iter()
            .any(|n| n.tags.is_block_level == Some(true))
    });

    if !is_block_level {
        for n in &mut nodes {
            if n.tags.is_block_level == Some(true) {
                return Err(GalleyError::structural(
                    "block-level content is not allowed in inline text",
                    n.span,
                ));
            }
            if let NodeKind::Text(t) = &mut n.kind {
                t.simplified = Some(RX_SPACE.replace_all(&t.raw, " ").into_owned());
            }
        }
        return Ok(NodeList {
            is_block_level: false,
            layout: Layout::Inline(nodes),
        });
    }

    Ok(NodeList {
        is_block_level: true,
        layout: Layout::Blocks(BlocksBuilder::new().build(nodes)),
    })
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::error::Result;
    use crate::node::{NodeId, NodeIdGen, NodeSpec, NodeTags, SourceSpan};
    use crate::output::Output;
    use crate::render::RenderContext;

    #[derive(Debug)]
    struct Plain;

    impl NodeSpec for Plain {
        fn render(&self, _node: &Node, _ctx: &mut RenderContext<'_>) -> Result<Output> {
            Ok(Output::empty())
        }
    }

    fn text(idgen: &mut NodeIdGen, s: &str) -> Node {
        Node::text(idgen.next_id(), s, SourceSpan::default())
    }

    fn block_node(idgen: &mut NodeIdGen) -> Node {
        Node::element(
            idgen.next_id(),
            Rc::new(Plain),
            None,
            NodeTags::block(),
            SourceSpan::default(),
        )
    }

    fn heading_node(idgen: &mut NodeIdGen) -> Node {
        let mut tags = NodeTags::block();
        tags.is_block_heading = true;
        Node::element(
            idgen.next_id(),
            Rc::new(Plain),
            None,
            tags,
            SourceSpan::default(),
        )
    }

    fn para_texts(block: &Block) -> Vec<String> {
        match block {
            Block::Paragraph(nodes) => nodes
                .iter()
                .filter_map(|n| n.as_text().map(|t| t.value().to_owned()))
                .collect(),
            Block::Node(_) => panic!("expected a paragraph"),
        }
    }

    #[test]
    fn all_inline_nodes_form_one_paragraph() {
        let mut idgen = NodeIdGen::new();
        let nodes = vec![
            text(&mut idgen, "  hello "),
            text(&mut idgen, " world\n"),
        ];
        let blocks = BlocksBuilder::new().build(nodes);
        assert_eq!(blocks.len(), 1);
        assert_eq!(para_texts(&blocks[0]), vec!["hello ", "world"]);
    }

    #[test]
    fn paragraph_break_marker_emits_no_block() {
        let mut idgen = NodeIdGen::new();
        let a = text(&mut idgen, "one");
        let brk = Node::paragraph_break(idgen.next_id(), SourceSpan::default());
        let b = text(&mut idgen, "two");
        let blocks = BlocksBuilder::new().build(vec![a, brk, b]);
        assert_eq!(blocks.len(), 2);
        assert_eq!(para_texts(&blocks[0]), vec!["one"]);
        assert_eq!(para_texts(&blocks[1]), vec!["two"]);
    }

    #[test]
    fn block_level_node_stands_alone() {
        let mut idgen = NodeIdGen::new();
        let nodes = vec![
            text(&mut idgen, "before"),
            block_node(&mut idgen),
            text(&mut idgen, "after"),
        ];
        let blocks = BlocksBuilder::new().build(nodes);
        assert_eq!(blocks.len(), 3);
        assert!(matches!(blocks[1], Block::Node(_)));
    }

    #[test]
    fn run_in_heading_leads_following_paragraph() {
        let mut idgen = NodeIdGen::new();
        let h = heading_node(&mut idgen);
        let t = text(&mut idgen, " body text");
        let blocks = BlocksBuilder::new().build(vec![h, t]);
        assert_eq!(blocks.len(), 1);
        let Block::Paragraph(nodes) = &blocks[0] else {
            panic!("expected a paragraph");
        };
        assert_eq!(nodes.len(), 2);
        assert!(nodes[0].tags.is_block_heading);
        // leading whitespace of the text after the heading is the paragraph
        // head and gets trimmed
        assert_eq!(nodes[1].as_text().map(|t| t.value()), Some("body text"));
    }

    #[test]
    fn run_in_heading_breaks_a_started_paragraph() {
        let mut idgen = NodeIdGen::new();
        let t1 = text(&mut idgen, "first paragraph");
        let h = heading_node(&mut idgen);
        let t2 = text(&mut idgen, "second paragraph");
        let blocks = BlocksBuilder::new().build(vec![t1, h, t2]);
        assert_eq!(blocks.len(), 2);
        assert_eq!(para_texts(&blocks[0]), vec!["first paragraph"]);
        let Block::Paragraph(nodes) = &blocks[1] else {
            panic!("expected a paragraph");
        };
        assert!(nodes[0].tags.is_block_heading);
    }

    #[test]
    fn consecutive_run_in_headings_share_one_paragraph() {
        // A single pending heading does not count as a started paragraph, so
        // a second heading joins it instead of flushing it.
        let mut idgen = NodeIdGen::new();
        let h1 = heading_node(&mut idgen);
        let h2 = heading_node(&mut idgen);
        let t = text(&mut idgen, "text");
        let blocks = BlocksBuilder::new().build(vec![h1, h2, t]);
        assert_eq!(blocks.len(), 1);
        let Block::Paragraph(nodes) = &blocks[0] else {
            panic!("expected a paragraph");
        };
        assert_eq!(nodes.len(), 3);
        assert!(nodes[0].tags.is_block_heading);
        assert!(nodes[1].tags.is_block_heading);
    }

    #[test]
    fn whitespace_between_blocks_is_dropped() {
        let mut idgen = NodeIdGen::new();
        let nodes = vec![
            block_node(&mut idgen),
            text(&mut idgen, "  \n "),
            block_node(&mut idgen),
        ];
        let blocks = BlocksBuilder::new().build(nodes);
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn whitespace_after_pending_heading_is_dropped() {
        let mut idgen = NodeIdGen::new();
        let h = heading_node(&mut idgen);
        let ws = text(&mut idgen, "   ");
        let t = text(&mut idgen, "content");
        let blocks = BlocksBuilder::new().build(vec![h, ws, t]);
        let Block::Paragraph(nodes) = &blocks[0] else {
            panic!("expected a paragraph");
        };
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].as_text().map(|t| t.value()), Some("content"));
    }

    #[test]
    fn strip_following_whitespace_forces_mid_paragraph_head() {
        let mut idgen = NodeIdGen::new();
        let t1 = text(&mut idgen, "kept");
        let mut marker = Node::element(
            idgen.next_id(),
            Rc::new(Plain),
            None,
            NodeTags::inline(),
            SourceSpan::default(),
        );
        marker.tags.strip_following_whitespace = true;
        let t2 = text(&mut idgen, "   trimmed");
        let blocks = BlocksBuilder::new().build(vec![t1, marker, t2]);
        let Block::Paragraph(nodes) = &blocks[0] else {
            panic!("expected a paragraph");
        };
        assert_eq!(nodes[2].as_text().map(|t| t.value()), Some("trimmed"));
    }

    #[test]
    fn strip_preceding_whitespace_trims_previous_tail() {
        let mut idgen = NodeIdGen::new();
        let t1 = text(&mut idgen, "kept   ");
        let mut marker = Node::element(
            idgen.next_id(),
            Rc::new(Plain),
            None,
            NodeTags::inline(),
            SourceSpan::default(),
        );
        marker.tags.strip_preceding_whitespace = true;
        let t2 = text(&mut idgen, "rest");
        let blocks = BlocksBuilder::new().build(vec![t1, marker, t2]);
        let Block::Paragraph(nodes) = &blocks[0] else {
            panic!("expected a paragraph");
        };
        assert_eq!(nodes[0].as_text().map(|t| t.value()), Some("kept"));
    }

    #[test]
    fn inline_context_rejects_block_content() {
        let mut idgen = NodeIdGen::new();
        let nodes = vec![text(&mut idgen, "ok"), block_node(&mut idgen)];
        let err = finalize_node_list(nodes, Some(false)).unwrap_err();
        assert!(matches!(err, GalleyError::Structural { .. }));
    }

    #[test]
    fn inferred_block_level_from_content() {
        let mut idgen = NodeIdGen::new();
        let inline_only = finalize_node_list(vec![text(&mut idgen, "x")], None).unwrap();
        assert!(!inline_only.is_block_level);

        let with_block =
            finalize_node_list(vec![text(&mut idgen, "x"), block_node(&mut idgen)], None)
                .unwrap();
        assert!(with_block.is_block_level);
    }

    #[test]
    fn whitespace_simplification_is_idempotent() {
        let once = simplify_whitespace("  a \t\n b  c ", true, true);
        let twice = simplify_whitespace(&once, true, true);
        assert_eq!(once, "a b c");
        assert_eq!(once, twice);
    }

    proptest::proptest! {
        #[test]
        fn simplify_whitespace_idempotent_for_any_input(
            s in "[ a-z\t\n\r]{0,40}",
            head in proptest::bool::ANY,
            tail in proptest::bool::ANY,
        ) {
            let once = simplify_whitespace(&s, head, tail);
            let twice = simplify_whitespace(&once, head, tail);
            proptest::prop_assert_eq!(once, twice);
        }
    }

    #[test]
    fn node_list_ids_stable_through_finalization() {
        let mut idgen = NodeIdGen::new();
        let t = text(&mut idgen, "x");
        let id = t.id;
        let list = finalize_node_list(vec![t], Some(true)).unwrap();
        let Layout::Blocks(blocks) = &list.layout else {
            panic!("expected blocks");
        };
        let Block::Paragraph(nodes) = &blocks[0] else {
            panic!("expected a paragraph");
        };
        assert_eq!(nodes[0].id, id);
        assert_eq!(nodes[0].id, NodeId(0));
    }
}
