/*
 * feature/headings.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Section headings.
 */

//! Headings feature.
//!
//! Heading nodes are block-level; deeper levels (4-6) are run-in headings
//! that lead the following paragraph. The render manager assigns
//! document-unique target ids by slugifying the heading text; labeled
//! headings additionally register themselves as referenceables when the
//! `refs` feature is present.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{GalleyError, Result};
use crate::feature::refs::{RefInstance, safe_target_id, with_refs_manager_mut};
use crate::feature::{Feature, FeatureRenderManager};
use crate::node::{Node, NodeId, NodeIdGen, NodeList, NodeSpec, NodeTags, SourceSpan};
use crate::output::{HeadingStyle, Output};
use crate::render::RenderContext;

/// Headings: sections, subsections, paragraph lead-ins.
#[derive(Default)]
pub struct HeadingsFeature;

impl HeadingsFeature {
    pub fn new() -> Self {
        Self
    }

    /// Whether headings of this level are run-in by default.
    pub fn default_run_in(level: u8) -> bool {
        level >= 4
    }
}

impl Feature for HeadingsFeature {
    fn name(&self) -> &str {
        "headings"
    }

    fn optional_dependencies(&self) -> Vec<String> {
        vec!["refs".to_owned()]
    }

    fn make_render_manager(&self) -> Option<Rc<RefCell<dyn FeatureRenderManager>>> {
        Some(Rc::new(RefCell::new(HeadingsRenderManager {
            target_id_counters: HashMap::new(),
            target_ids: HashMap::new(),
        })))
    }
}

static RX_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]+").unwrap());

/// Generates render-unique target ids for headings without labels.
pub struct HeadingsRenderManager {
    target_id_counters: HashMap<String, u32>,
    // node id -> generated target id, so repeated render passes agree
    target_ids: HashMap<NodeId, String>,
}

impl FeatureRenderManager for HeadingsRenderManager {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl HeadingsRenderManager {
    /// The default target id for an unlabeled heading: the slugified
    /// heading text, deduplicated with a numeric suffix. Idempotent per
    /// node.
    pub fn default_target_id(&mut self, node_id: NodeId, heading_text: &str) -> String {
        if let Some(existing) = self.target_ids.get(&node_id) {
            return existing.clone();
        }
        let target_id = self.generate_default_target_id(heading_text);
        self.target_ids.insert(node_id, target_id.clone());
        target_id
    }

    fn generate_default_target_id(&mut self, heading_text: &str) -> String {
        let slug = RX_SLUG.replace_all(heading_text.trim(), "-");
        let mut target_id: String = format!("sec--{slug}").chars().take(32).collect();
        if let Some(count) = self.target_id_counters.get_mut(&target_id) {
            *count += 1;
            target_id = format!("{}-{}", target_id, count);
        } else {
            self.target_id_counters.insert(target_id.clone(), 1);
        }
        target_id
    }
}

/// Borrow the headings render manager for the duration of `f`.
pub fn with_headings_manager_mut<R>(
    ctx: &RenderContext<'_>,
    f: impl FnOnce(&mut HeadingsRenderManager) -> Result<R>,
) -> Result<R> {
    let manager = ctx.expect_feature_render_manager("headings")?;
    let mut manager = manager.borrow_mut();
    let headings = manager
        .as_any_mut()
        .downcast_mut::<HeadingsRenderManager>()
        .ok_or_else(|| {
            GalleyError::render("feature ‘headings’ has an unexpected manager type")
        })?;
    f(headings)
}

/// A sectioning heading at a given level, with the node content as the
/// heading text.
#[derive(Debug)]
pub struct HeadingSpec {
    pub level: u8,
    pub run_in: bool,
    /// `(ref_type, ref_label)` to register with the refs feature.
    pub label: Option<(String, String)>,
}

impl HeadingSpec {
    pub fn new(level: u8) -> Self {
        Self {
            level,
            run_in: HeadingsFeature::default_run_in(level),
            label: None,
        }
    }

    pub fn with_label(mut self, ref_type: impl Into<String>, ref_label: impl Into<String>) -> Self {
        self.label = Some((ref_type.into(), ref_label.into()));
        self
    }

    /// Build a heading node with the structural tags headings carry.
    pub fn node(self, idgen: &mut NodeIdGen, content: NodeList, span: SourceSpan) -> Node {
        let tags = NodeTags {
            is_block_level: Some(true),
            is_block_heading: self.run_in,
            ..NodeTags::default()
        };
        Node::element(idgen.next_id(), Rc::new(self), Some(content), tags, span)
    }
}

impl NodeSpec for HeadingSpec {
    fn render(&self, node: &Node, ctx: &mut RenderContext<'_>) -> Result<Output> {
        let Some(content) = node.as_element().and_then(|el| el.content.clone()) else {
            return Err(GalleyError::render("heading node has no content"));
        };
        let heading_text = content.text_content();

        let target_id = match &self.label {
            Some((ref_type, ref_label)) => safe_target_id(ref_type, ref_label),
            None => with_headings_manager_mut(ctx, |headings| {
                Ok(headings.default_target_id(node.id, &heading_text))
            })?,
        };

        if ctx.supports_feature("refs") && ctx.is_first_pass() {
            if let Some((ref_type, ref_label)) = &self.label {
                with_refs_manager_mut(ctx, |refs| {
                    refs.register_reference(
                        node.id,
                        RefInstance::new(
                            ref_type.clone(),
                            ref_label.clone(),
                            heading_text.trim().to_owned(),
                            Some(format!("#{target_id}")),
                        ),
                    )
                })?;
            }
        }

        let rendered = ctx.render_node_list(&content)?;
        Ok(ctx.backend().render_heading(
            rendered,
            &HeadingStyle {
                level: self.level,
                run_in: self.run_in,
                target_id: Some(&target_id),
            },
        ))
    }
}
