/*
 * feature/endnotes.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Endnotes: footnotes, citations and other numbered note lists.
 */

//! Endnotes feature.
//!
//! Endnotes are organized into categories (e.g. `footnote`, `citation`),
//! each with its own counter formatter and optional list heading. An
//! endnote mark renders as a link to the endnote's target anchor; the
//! collected endnotes of a category render as an enumeration, typically at
//! the end of the document. The feature's `process` hook marks the lists
//! final; adding an endnote afterwards is an error.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::counter::{Counter, CounterFormatter};
use crate::error::{GalleyError, Result};
use crate::feature::{Feature, FeatureDocumentManager, FeatureRenderManager};
use crate::node::{Node, NodeId, NodeIdGen, NodeList, NodeSpec, NodeTags, SourceSpan};
use crate::output::{HeadingStyle, Output};
use crate::render::RenderContext;

/// One endnote category: name, counter display, optional list heading.
#[derive(Debug, Clone)]
pub struct EndnoteCategory {
    pub name: String,
    pub formatter: Rc<CounterFormatter>,
    pub heading_title: Option<String>,
}

impl EndnoteCategory {
    pub fn new(name: impl Into<String>, formatter: Rc<CounterFormatter>) -> Self {
        Self {
            name: name.into(),
            formatter,
            heading_title: None,
        }
    }

    pub fn with_heading_title(mut self, title: impl Into<String>) -> Self {
        self.heading_title = Some(title.into());
        self
    }
}

/// Endnotes, grouped into categories.
#[derive(Default)]
pub struct EndnotesFeature {
    categories: Vec<EndnoteCategory>,
}

impl EndnotesFeature {
    pub fn new(categories: Vec<EndnoteCategory>) -> Self {
        Self { categories }
    }
}

impl Feature for EndnotesFeature {
    fn name(&self) -> &str {
        "endnotes"
    }

    fn make_document_manager(&self) -> Option<Rc<RefCell<dyn FeatureDocumentManager>>> {
        Some(Rc::new(RefCell::new(EndnotesDocumentManager {
            categories: self.categories.clone(),
        })))
    }

    fn make_render_manager(&self) -> Option<Rc<RefCell<dyn FeatureRenderManager>>> {
        Some(Rc::new(RefCell::new(EndnotesRenderManager {
            categories: Vec::new(),
            counters: HashMap::new(),
            endnotes: IndexMap::new(),
            by_node: HashMap::new(),
            finalized: false,
        })))
    }
}

/// Document-lifetime endnote state: the category set, which may still be
/// extended before rendering starts.
pub struct EndnotesDocumentManager {
    categories: Vec<EndnoteCategory>,
}

impl FeatureDocumentManager for EndnotesDocumentManager {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl EndnotesDocumentManager {
    pub fn categories(&self) -> &[EndnoteCategory] {
        &self.categories
    }

    pub fn add_endnote_category(&mut self, category: EndnoteCategory) -> Result<()> {
        if self.categories.iter().any(|c| c.name == category.name) {
            return Err(GalleyError::render(format!(
                "endnote category ‘{}’ is already defined",
                category.name
            )));
        }
        self.categories.push(category);
        Ok(())
    }
}

/// One collected endnote.
#[derive(Debug, Clone)]
pub struct EndnoteInstance {
    pub category: String,
    pub number: i32,
    /// The mark display text, e.g. `*` or `1`.
    pub formatted_counter_value: String,
    pub target_id: String,
    pub content: NodeList,
}

/// Render-lifetime endnote state: per-category counters and the collected
/// endnote lists.
pub struct EndnotesRenderManager {
    categories: Vec<EndnoteCategory>,
    counters: HashMap<String, Counter>,
    endnotes: IndexMap<String, Vec<EndnoteInstance>>,
    // node id -> (category, index); repeated render passes reuse the entry
    by_node: HashMap<NodeId, (String, usize)>,
    finalized: bool,
}

impl FeatureRenderManager for EndnotesRenderManager {
    fn initialize(&mut self, ctx: &mut RenderContext<'_>) -> Result<()> {
        let doc = ctx.document().ok_or_else(|| {
            GalleyError::render("the endnotes feature requires a document render")
        })?;
        let manager = doc
            .feature_document_manager("endnotes")
            .ok_or_else(|| GalleyError::render("endnotes document manager is missing"))?;
        let manager = manager.borrow();
        let doc_manager = manager
            .as_any()
            .downcast_ref::<EndnotesDocumentManager>()
            .ok_or_else(|| {
                GalleyError::render("feature ‘endnotes’ has an unexpected manager type")
            })?;
        self.categories = doc_manager.categories().to_vec();
        for category in &self.categories {
            self.counters
                .insert(category.name.clone(), Counter::new(Rc::clone(&category.formatter)));
            self.endnotes.insert(category.name.clone(), Vec::new());
        }
        Ok(())
    }

    fn process(&mut self, _first_pass_value: &Output, _ctx: &mut RenderContext<'_>) -> Result<()> {
        self.finalized = true;
        for (category, notes) in &self.endnotes {
            tracing::debug!(
                category = category.as_str(),
                count = notes.len(),
                "Endnote list finalized"
            );
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl EndnotesRenderManager {
    /// Collect an endnote and assign its number. Idempotent per node, so a
    /// second render pass reuses the assigned number instead of stepping
    /// the counter again.
    pub fn add_endnote(
        &mut self,
        node_id: NodeId,
        category: &str,
        content: NodeList,
    ) -> Result<EndnoteInstance> {
        if let Some((cat, index)) = self.by_node.get(&node_id) {
            return Ok(self.endnotes[cat][*index].clone());
        }
        if self.finalized {
            return Err(GalleyError::render(format!(
                "cannot add an endnote to ‘{category}’ after endnote lists were finalized"
            )));
        }
        let Some(counter) = self.counters.get_mut(category) else {
            return Err(GalleyError::render(format!(
                "unknown endnote category ‘{category}’"
            )));
        };
        let (number, formatted_counter_value) = counter.step_and_format();
        let instance = EndnoteInstance {
            category: category.to_owned(),
            number,
            formatted_counter_value,
            target_id: format!("endnote-{category}-{number}"),
            content,
        };
        let Some(notes) = self.endnotes.get_mut(category) else {
            return Err(GalleyError::render(format!(
                "unknown endnote category ‘{category}’"
            )));
        };
        notes.push(instance.clone());
        self.by_node
            .insert(node_id, (category.to_owned(), notes.len() - 1));
        tracing::debug!(category, number, "Collected endnote");
        Ok(instance)
    }

    pub fn category(&self, name: &str) -> Option<&EndnoteCategory> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn endnotes_in(&self, category: &str) -> &[EndnoteInstance] {
        self.endnotes
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Borrow the endnotes render manager for the duration of `f`.
pub fn with_endnotes_manager_mut<R>(
    ctx: &RenderContext<'_>,
    f: impl FnOnce(&mut EndnotesRenderManager) -> Result<R>,
) -> Result<R> {
    let manager = ctx.expect_feature_render_manager("endnotes")?;
    let mut manager = manager.borrow_mut();
    let endnotes = manager
        .as_any_mut()
        .downcast_mut::<EndnotesRenderManager>()
        .ok_or_else(|| {
            GalleyError::render("feature ‘endnotes’ has an unexpected manager type")
        })?;
    f(endnotes)
}

/// Render the collected endnotes of one category: its heading (if
/// configured) followed by the enumerated notes, in a semantic block.
pub fn render_endnotes(ctx: &mut RenderContext<'_>, category: &str) -> Result<Output> {
    let (instances, heading_title) = with_endnotes_manager_mut(ctx, |endnotes| {
        let title = endnotes
            .category(category)
            .and_then(|c| c.heading_title.clone());
        Ok((endnotes.endnotes_in(category).to_vec(), title))
    })?;

    let backend = ctx.backend();
    let mut items = Vec::with_capacity(instances.len());
    for instance in &instances {
        let body = ctx.render_node_list(&instance.content)?;
        items.push((
            ctx.backend().render_value(&instance.formatted_counter_value),
            body,
        ));
    }

    let list = backend.render_enumeration(items, &["endnotes".to_owned()]);
    let content = match heading_title {
        Some(title) => {
            let heading = backend.render_heading(
                backend.render_value(&title),
                &HeadingStyle {
                    level: 2,
                    run_in: false,
                    target_id: None,
                },
            );
            backend.render_join_blocks(vec![heading, list])
        }
        None => list,
    };
    Ok(backend.render_semantic_block(
        content,
        "endnotes",
        Some(&format!("endnotes-{category}")),
    ))
}

/// An endnote mark: collects the node content as the endnote text and
/// renders the mark as a link to the endnote's anchor.
#[derive(Debug)]
pub struct EndnoteMarkSpec {
    pub category: String,
}

impl EndnoteMarkSpec {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
        }
    }

    /// Build an endnote mark node with the given endnote content.
    pub fn node(self, idgen: &mut NodeIdGen, content: NodeList, span: SourceSpan) -> Node {
        Node::element(
            idgen.next_id(),
            Rc::new(self),
            Some(content),
            NodeTags::inline(),
            span,
        )
    }
}

impl NodeSpec for EndnoteMarkSpec {
    fn render(&self, node: &Node, ctx: &mut RenderContext<'_>) -> Result<Output> {
        let Some(content) = node.as_element().and_then(|el| el.content.clone()) else {
            return Err(GalleyError::render("endnote mark has no content"));
        };
        let instance = with_endnotes_manager_mut(ctx, |endnotes| {
            endnotes.add_endnote(node.id, &self.category, content)
        })?;
        let backend = ctx.backend();
        Ok(backend.render_link(
            "endnote",
            &format!("#{}", instance.target_id),
            backend.render_value(&instance.formatted_counter_value),
            &["endnote".to_owned(), self.category.clone()],
        ))
    }
}
