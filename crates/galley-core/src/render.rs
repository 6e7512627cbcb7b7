/*
 * render.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Render context and the two-phase delayed-render protocol.
 */

//! Render context and the two-phase delayed-render protocol.
//!
//! A [`Document`] owns the per-document feature managers and spawns a fresh
//! [`RenderContext`] for each render. One render is a single linear call
//! sequence through four phases:
//!
//! 1. **First pass** - the tree is traversed once. Delayed nodes run their
//!    `prepare_delayed_render` hook and leave a structural placeholder.
//! 2. **Finalizing** - every feature render manager's `process` hook runs,
//!    in registry order, to finalize state that needs full-document
//!    visibility.
//! 3. **Delayed resolution** - each registered delayed node renders, in
//!    registration order; the context is fully populated so reference and
//!    counter lookups succeed. Delayed resolution is flat: a delayed node
//!    must not register further delayed content.
//! 4. **Assembly** - placeholders are spliced structurally when the backend
//!    supports it, otherwise the whole traversal re-runs as a second pass
//!    in which delayed nodes return their stored resolved content.
//!
//! Any error aborts the entire render; there is no partial output.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{GalleyError, Result};
use crate::feature::{FeatureDocumentManager, FeatureRegistry, FeatureRenderManager};
use crate::node::{Block, Node, NodeId, NodeKind, NodeList};
use crate::node::Layout;
use crate::output::{Output, OutputBackend};

/// The render phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    FirstPass,
    Finalizing,
    DelayedResolution,
    /// Marker-less assembly strategy: the full traversal re-runs with every
    /// feature manager already populated.
    SecondPass,
    Assembled,
}

/// A value stored in the render context's logical state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

type ManagerSlot = (String, Option<Rc<RefCell<dyn FeatureRenderManager>>>);

/// Per-render state: feature render managers, the delayed-render registry,
/// and the logical state. Exclusively owned by one render; never reused.
pub struct RenderContext<'a> {
    doc: Option<&'a Document>,
    backend: &'a dyn OutputBackend,
    phase: RenderPhase,
    render_managers: Vec<ManagerSlot>,
    delayed_nodes: IndexMap<NodeId, Node>,
    delayed_content: IndexMap<NodeId, Output>,
    logical_state: HashMap<String, HashMap<String, LogicalValue>>,
}

impl<'a> RenderContext<'a> {
    fn for_document(doc: &'a Document, backend: &'a dyn OutputBackend) -> Result<Self> {
        let render_managers: Vec<ManagerSlot> = doc
            .registry
            .features()
            .iter()
            .map(|f| (f.name().to_owned(), f.make_render_manager()))
            .collect();
        let mut ctx = Self {
            doc: Some(doc),
            backend,
            phase: RenderPhase::FirstPass,
            render_managers,
            delayed_nodes: IndexMap::new(),
            delayed_content: IndexMap::new(),
            logical_state: HashMap::new(),
        };
        for (_, manager) in ctx.render_managers.clone() {
            if let Some(manager) = manager {
                manager.borrow_mut().initialize(&mut ctx)?;
            }
        }
        Ok(ctx)
    }

    /// A render context without a document: no features, and delayed
    /// rendering is an error. Used to render small isolated fragments.
    pub fn standalone(backend: &'a dyn OutputBackend) -> Self {
        Self {
            doc: None,
            backend,
            phase: RenderPhase::FirstPass,
            render_managers: Vec::new(),
            delayed_nodes: IndexMap::new(),
            delayed_content: IndexMap::new(),
            logical_state: HashMap::new(),
        }
    }

    pub fn is_standalone(&self) -> bool {
        self.doc.is_none()
    }

    pub fn document(&self) -> Option<&'a Document> {
        self.doc
    }

    pub fn backend(&self) -> &'a dyn OutputBackend {
        self.backend
    }

    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    pub fn is_first_pass(&self) -> bool {
        self.phase == RenderPhase::FirstPass
    }

    pub fn supports_feature(&self, name: &str) -> bool {
        self.render_managers.iter().any(|(n, _)| n == name)
    }

    /// The render manager of the named feature, if the feature is enabled
    /// and has one.
    pub fn feature_render_manager(
        &self,
        name: &str,
    ) -> Option<Rc<RefCell<dyn FeatureRenderManager>>> {
        self.render_managers
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, m)| m.clone())
    }

    /// Like [`Self::feature_render_manager`], but an error when missing.
    pub fn expect_feature_render_manager(
        &self,
        name: &str,
    ) -> Result<Rc<RefCell<dyn FeatureRenderManager>>> {
        if self.is_standalone() {
            return Err(GalleyError::render(format!(
                "there are no document features when rendering in standalone mode \
                 (requested ‘{name}’)"
            )));
        }
        self.feature_render_manager(name).ok_or_else(|| {
            GalleyError::render(format!("feature ‘{name}’ is not enabled for this render"))
        })
    }

    // --- node rendering -----------------------------------------------

    /// Render a finalized node list: block content renders as paragraphs
    /// and standalone blocks, inline content in sequence.
    pub fn render_node_list(&mut self, list: &NodeList) -> Result<Output> {
        match &list.layout {
            Layout::Inline(nodes) => self.render_nodes_inline(nodes),
            Layout::Blocks(blocks) => self.render_blocks(blocks),
        }
    }

    pub fn render_blocks(&mut self, blocks: &[Block]) -> Result<Output> {
        let backend = self.backend;
        let mut rendered = Vec::with_capacity(blocks.len());
        for block in blocks {
            match block {
                Block::Paragraph(nodes) => {
                    let content = self.render_nodes_inline(nodes)?;
                    rendered.push(backend.render_paragraph(content));
                }
                Block::Node(node) => rendered.push(self.render_node(node)?),
            }
        }
        Ok(backend.render_join_blocks(rendered))
    }

    pub fn render_nodes_inline(&mut self, nodes: &[Node]) -> Result<Output> {
        let backend = self.backend;
        let mut rendered = Vec::with_capacity(nodes.len());
        for node in nodes {
            rendered.push(self.render_node(node)?);
        }
        Ok(backend.render_join(rendered))
    }

    /// Render one node, honoring the delayed-render protocol.
    pub fn render_node(&mut self, node: &Node) -> Result<Output> {
        match &node.kind {
            NodeKind::Text(text) => Ok(self.backend.render_value(text.value())),
            NodeKind::Element(el) => {
                let spec = Rc::clone(&el.spec);
                if !spec.is_delayed(node) {
                    return spec.render(node, self);
                }
                match self.phase {
                    RenderPhase::FirstPass | RenderPhase::Finalizing => {
                        spec.prepare_delayed_render(node, self)?;
                        let key = self.register_delayed_render(node)?;
                        Ok(Output::placeholder(key))
                    }
                    RenderPhase::SecondPass => self.delayed_content(node.id).cloned(),
                    RenderPhase::DelayedResolution | RenderPhase::Assembled => {
                        // a delayed node reached through another delayed
                        // node's content; flat one-round resolution forbids
                        // this
                        Err(GalleyError::render(format!(
                            "delayed node {} encountered outside the render passes; \
                             nested delayed dependencies are not supported",
                            node.id
                        )))
                    }
                }
            }
        }
    }

    // --- delayed rendering --------------------------------------------

    fn register_delayed_render(&mut self, node: &Node) -> Result<NodeId> {
        if self.is_standalone() {
            return Err(GalleyError::render(
                "cannot render nodes with delayed content in standalone mode",
            ));
        }
        if self.delayed_nodes.contains_key(&node.id) {
            // at most one registration per node and render
            return Ok(node.id);
        }
        tracing::debug!(node = %node.id, "Registering delayed-render node");
        self.delayed_nodes.insert(node.id, node.clone());
        Ok(node.id)
    }

    /// The resolved content of a delayed node.
    pub fn delayed_content(&self, id: NodeId) -> Result<&Output> {
        self.delayed_content.get(&id).ok_or_else(|| {
            GalleyError::render(format!("no resolved delayed content for node {id}"))
        })
    }

    // --- logical state ------------------------------------------------

    /// Run `f` with `key` set to `value` in the given logical-state domain,
    /// restoring the previous value afterwards. Nodes use this to render
    /// differently by context (e.g. nested enumeration depth) without
    /// threading state manually.
    pub fn with_logical_state<R>(
        &mut self,
        domain: &str,
        key: &str,
        value: LogicalValue,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        let previous = self
            .logical_state
            .entry(domain.to_owned())
            .or_default()
            .insert(key.to_owned(), value);
        let result = f(self);
        let state = self.logical_state.entry(domain.to_owned()).or_default();
        match previous {
            Some(v) => {
                state.insert(key.to_owned(), v);
            }
            None => {
                state.remove(key);
            }
        }
        result
    }

    pub fn logical_state(&self, domain: &str, key: &str) -> Option<&LogicalValue> {
        self.logical_state.get(domain).and_then(|d| d.get(key))
    }
}

// --------------------------------------------------------------------------

type DocManagerSlot = (String, Option<Rc<RefCell<dyn FeatureDocumentManager>>>);

/// One renderable document: the shared feature registry plus the
/// per-document feature managers.
///
/// The registry is immutable and may be reused to spawn many independent,
/// sequential renders.
pub struct Document {
    registry: Rc<FeatureRegistry>,
    document_managers: Vec<DocManagerSlot>,
}

impl Document {
    pub fn new(registry: Rc<FeatureRegistry>) -> Result<Self> {
        let document_managers: Vec<DocManagerSlot> = registry
            .features()
            .iter()
            .map(|f| (f.name().to_owned(), f.make_document_manager()))
            .collect();
        for (_, manager) in &document_managers {
            if let Some(manager) = manager {
                manager.borrow_mut().initialize()?;
            }
        }
        Ok(Self {
            registry,
            document_managers,
        })
    }

    pub fn registry(&self) -> &Rc<FeatureRegistry> {
        &self.registry
    }

    pub fn supports_feature(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn feature_document_manager(
        &self,
        name: &str,
    ) -> Option<Rc<RefCell<dyn FeatureDocumentManager>>> {
        self.document_managers
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, m)| m.clone())
    }

    /// Render this document through `callback`, which traverses the node
    /// tree against the given render context (and is invoked a second time
    /// for backends without delayed-marker support).
    ///
    /// Returns the fully assembled output text.
    pub fn render<F>(&self, backend: &dyn OutputBackend, callback: F) -> Result<String>
    where
        F: Fn(&mut RenderContext<'_>) -> Result<Output>,
    {
        let mut ctx = RenderContext::for_document(self, backend)?;

        tracing::debug!(format = backend.format_name(), "Render first pass");
        let first_pass_value = callback(&mut ctx)?;

        // feature managers finalize full-document state, in registry order
        ctx.phase = RenderPhase::Finalizing;
        let managers = ctx.render_managers.clone();
        for (name, manager) in &managers {
            if let Some(manager) = manager {
                tracing::debug!(feature = name.as_str(), "Running process hook");
                manager.borrow_mut().process(&first_pass_value, &mut ctx)?;
            }
        }

        // resolve delayed nodes, in registration order
        ctx.phase = RenderPhase::DelayedResolution;
        let delayed: Vec<(NodeId, Node)> = ctx
            .delayed_nodes
            .iter()
            .map(|(id, node)| (*id, node.clone()))
            .collect();
        tracing::debug!(count = delayed.len(), "Resolving delayed nodes");
        for (id, node) in delayed {
            let Some(el) = node.as_element() else {
                return Err(GalleyError::render(format!(
                    "delayed node {id} is not an element node"
                )));
            };
            let spec = Rc::clone(&el.spec);
            let resolved = spec.render(&node, &mut ctx)?;
            if resolved.has_placeholders() {
                return Err(GalleyError::render(format!(
                    "delayed node {id} produced further delayed content; \
                     nested delayed dependencies are not supported"
                )));
            }
            ctx.delayed_content.insert(id, resolved);
        }

        // assemble
        let final_value = if backend.supports_delayed_markers() {
            first_pass_value.substitute(&ctx.delayed_content)?
        } else {
            tracing::debug!("Backend has no delayed markers, rendering second pass");
            ctx.phase = RenderPhase::SecondPass;
            callback(&mut ctx)?
        };

        ctx.phase = RenderPhase::Assembled;
        for (name, manager) in &managers {
            if let Some(manager) = manager {
                tracing::debug!(feature = name.as_str(), "Running postprocess hook");
                manager.borrow_mut().postprocess(&final_value, &mut ctx)?;
            }
        }

        final_value.into_text()
    }

    /// Convenience: render a finalized node list as the whole document.
    pub fn render_list(&self, backend: &dyn OutputBackend, list: &NodeList) -> Result<String> {
        self.render(backend, |ctx| ctx.render_node_list(list))
    }
}
