/*
 * feature/refs.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Labels and cross-references.
 */

//! Cross-reference feature.
//!
//! During the first pass, referenceable locations register themselves under
//! `(ref_type, ref_label)` pairs; reference nodes are delayed-rendered, so
//! resolution happens once the whole document has been traversed and every
//! label is known. Resolution consults the local registry first, then an
//! ordered chain of external resolvers; a miss everywhere is a fatal
//! [`RefError::Unresolved`]. Registering the same label twice with
//! different content fails fast at registration time.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::counter::{
    Counter, CounterFormatter, FormatOptions, NumberGroup, ValueWithSubNums,
};
use crate::error::{ConfigError, GalleyError, RefError, Result};
use crate::feature::{Feature, FeatureRenderManager};
use crate::node::{Node, NodeId, NodeSpec};
use crate::output::Output;
use crate::render::RenderContext;

/// One registered referenceable location.
///
/// Within one render there is at most one instance per
/// `(ref_type, ref_label)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct RefInstance {
    pub ref_type: String,
    pub ref_label: String,
    /// Text shown for references without a custom display text.
    pub display_text: String,
    pub target_anchor: Option<String>,
    pub counter_value: Option<ValueWithSubNums>,
    pub counter_formatter_id: Option<String>,
}

impl RefInstance {
    pub fn new(
        ref_type: impl Into<String>,
        ref_label: impl Into<String>,
        display_text: impl Into<String>,
        target_anchor: Option<String>,
    ) -> Self {
        Self {
            ref_type: ref_type.into(),
            ref_label: ref_label.into(),
            display_text: display_text.into(),
            target_anchor,
            counter_value: None,
            counter_formatter_id: None,
        }
    }
}

static RX_UNSAFE_CHAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9-]").unwrap());

fn encode_safe(part: &str) -> String {
    RX_UNSAFE_CHAR
        .replace_all(part, |caps: &regex::Captures<'_>| {
            let mut enc = String::new();
            for c in caps[0].chars() {
                let _ = write!(enc, "_{:x}X", c as u32);
            }
            enc
        })
        .into_owned()
}

/// Anchor-safe target identifier for a `(ref_type, ref_label)` pair: any
/// character outside `[a-zA-Z0-9-]` is encoded as `_<hex>X`.
pub fn safe_target_id(ref_type: &str, ref_label: &str) -> String {
    format!("{}-{}", encode_safe(ref_type), encode_safe(ref_label))
}

/// A fallback queried for labels the document itself does not define
/// (e.g. references into a different page of the same site).
pub trait ExternalRefResolver {
    /// Answer with an instance, or decline with `None`.
    fn resolve(
        &self,
        ref_type: &str,
        ref_label: &str,
        ctx: &RenderContext<'_>,
    ) -> Option<RefInstance>;
}

/// Labels and cross-references.
#[derive(Default)]
pub struct RefsFeature {
    external_resolvers: Vec<Rc<dyn ExternalRefResolver>>,
    counter_formatters: Vec<Rc<CounterFormatter>>,
}

impl RefsFeature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_external_resolver(mut self, resolver: Rc<dyn ExternalRefResolver>) -> Self {
        self.external_resolvers.push(resolver);
        self
    }

    /// Counter formatters registered with every render manager, so that
    /// multi-reference lists can format aggregated counter values.
    pub fn with_counter_formatter(mut self, formatter: Rc<CounterFormatter>) -> Self {
        self.counter_formatters.push(formatter);
        self
    }
}

impl Feature for RefsFeature {
    fn name(&self) -> &str {
        "refs"
    }

    fn make_render_manager(&self) -> Option<Rc<RefCell<dyn FeatureRenderManager>>> {
        Some(Rc::new(RefCell::new(RefsRenderManager {
            ref_labels: IndexMap::new(),
            registered_by_node: HashMap::new(),
            counter_formatters: HashMap::new(),
            pending_formatters: self.counter_formatters.clone(),
            external_resolvers: self.external_resolvers.clone(),
        })))
    }
}

pub struct RefsRenderManager {
    ref_labels: IndexMap<(String, String), RefInstance>,
    // (node id, ref type, ref label) -> already registered instance; makes
    // re-registration idempotent across render passes
    registered_by_node: HashMap<(NodeId, String, String), RefInstance>,
    counter_formatters: HashMap<String, Rc<CounterFormatter>>,
    pending_formatters: Vec<Rc<CounterFormatter>>,
    external_resolvers: Vec<Rc<dyn ExternalRefResolver>>,
}

impl FeatureRenderManager for RefsRenderManager {
    fn initialize(&mut self, _ctx: &mut RenderContext<'_>) -> Result<()> {
        for formatter in std::mem::take(&mut self.pending_formatters) {
            self.register_counter_formatter(formatter)?;
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

impl RefsRenderManager {
    /// Register a referenceable location.
    ///
    /// Registering the same `(ref_type, ref_label)` again from the same
    /// node (e.g. on a second render pass) returns the earlier instance;
    /// registering it from elsewhere with different content is a fatal
    /// duplicate-label error.
    pub fn register_reference(
        &mut self,
        node_id: NodeId,
        instance: RefInstance,
    ) -> Result<RefInstance> {
        let key = (
            node_id,
            instance.ref_type.clone(),
            instance.ref_label.clone(),
        );
        if let Some(existing) = self.registered_by_node.get(&key) {
            return Ok(existing.clone());
        }

        let label_key = (instance.ref_type.clone(), instance.ref_label.clone());
        if let Some(existing) = self.ref_labels.get(&label_key) {
            if *existing == instance {
                self.registered_by_node.insert(key, instance.clone());
                return Ok(instance);
            }
            return Err(RefError::DuplicateLabel {
                ref_type: instance.ref_type,
                ref_label: instance.ref_label,
            }
            .into());
        }

        tracing::debug!(
            ref_type = instance.ref_type.as_str(),
            ref_label = instance.ref_label.as_str(),
            "Registered reference"
        );
        self.ref_labels.insert(label_key, instance.clone());
        self.registered_by_node.insert(key, instance.clone());
        Ok(instance)
    }

    /// Step `counter`, format the new value, and register the result as a
    /// referenceable in one call. Idempotent per node: a repeated call from
    /// the same node returns the earlier registration without stepping
    /// again, so a second render pass cannot double-step counters.
    pub fn register_reference_step_counter(
        &mut self,
        node_id: NodeId,
        ref_type: &str,
        ref_label: &str,
        counter: &mut Counter,
        target_anchor: impl FnOnce(i32) -> Option<String>,
    ) -> Result<RefInstance> {
        let key = (node_id, ref_type.to_owned(), ref_label.to_owned());
        if let Some(existing) = self.registered_by_node.get(&key) {
            return Ok(existing.clone());
        }

        let value = counter.step();
        let display_text = counter.formatter().format_single(
            value,
            &[],
            None,
            &FormatOptions::default(),
        );
        let instance = RefInstance {
            ref_type: ref_type.to_owned(),
            ref_label: ref_label.to_owned(),
            display_text,
            target_anchor: target_anchor(value),
            counter_value: Some(ValueWithSubNums::new(value)),
            counter_formatter_id: counter.formatter().id().map(str::to_owned),
        };
        self.register_reference(node_id, instance)
    }

    /// Register a counter formatter for multi-reference formatting; the
    /// formatter must carry an id, and each id registers once.
    pub fn register_counter_formatter(&mut self, formatter: Rc<CounterFormatter>) -> Result<()> {
        let Some(id) = formatter.id() else {
            return Err(GalleyError::render(
                "cannot register a counter formatter without an id",
            ));
        };
        if self.counter_formatters.contains_key(id) {
            return Err(ConfigError::DuplicateCounterFormatter(id.to_owned()).into());
        }
        self.counter_formatters.insert(id.to_owned(), formatter);
        Ok(())
    }

    /// Resolve a reference: local registry first, then the external
    /// resolver chain in order.
    pub fn resolve(
        &self,
        ref_type: &str,
        ref_label: &str,
        ctx: &RenderContext<'_>,
    ) -> Result<RefInstance> {
        let label_key = (ref_type.to_owned(), ref_label.to_owned());
        if let Some(instance) = self.ref_labels.get(&label_key) {
            return Ok(instance.clone());
        }

        tracing::debug!(
            ref_type,
            ref_label,
            "Label not in document registry, querying external resolvers"
        );
        for resolver in &self.external_resolvers {
            if let Some(instance) = resolver.resolve(ref_type, ref_label, ctx) {
                return Ok(instance);
            }
        }

        Err(RefError::Unresolved {
            ref_type: ref_type.to_owned(),
            ref_label: ref_label.to_owned(),
        }
        .into())
    }

    /// Render one reference as a link (or as bare text when the target has
    /// no anchor). `display` overrides the registered display text.
    pub fn render_ref(
        &self,
        ref_type: &str,
        ref_label: &str,
        display: Option<Output>,
        ctx: &RenderContext<'_>,
    ) -> Result<Output> {
        let instance = self.resolve(ref_type, ref_label, ctx)?;
        self.render_ref_instance(&instance, display, ctx)
    }

    pub fn render_ref_instance(
        &self,
        instance: &RefInstance,
        display: Option<Output>,
        ctx: &RenderContext<'_>,
    ) -> Result<Output> {
        let backend = ctx.backend();
        let display =
            display.unwrap_or_else(|| backend.render_value(&instance.display_text));
        match &instance.target_anchor {
            Some(anchor) => Ok(backend.render_link(
                "ref",
                anchor,
                display,
                &[format!("ref-{}", instance.ref_type)],
            )),
            None => Ok(display),
        }
    }

    /// Render several references as a compressed aggregate: counted
    /// references group per counter formatter and format as ranges/lists
    /// with per-number links; uncounted references render individually.
    pub fn render_ref_many(
        &self,
        targets: &[(String, String)],
        ctx: &RenderContext<'_>,
    ) -> Result<Output> {
        let backend = ctx.backend();

        let mut by_formatter: IndexMap<String, HashMap<ValueWithSubNums, RefInstance>> =
            IndexMap::new();
        let mut uncounted: Vec<RefInstance> = Vec::new();
        for (ref_type, ref_label) in targets {
            let instance = self.resolve(ref_type, ref_label, ctx)?;
            match (&instance.counter_value, &instance.counter_formatter_id) {
                (Some(value), Some(formatter_id))
                    if self.counter_formatters.contains_key(formatter_id) =>
                {
                    by_formatter
                        .entry(formatter_id.clone())
                        .or_default()
                        .insert(value.clone(), instance);
                }
                _ => uncounted.push(instance),
            }
        }

        let mut pieces: Vec<Output> = Vec::new();

        for (formatter_id, instances) in &by_formatter {
            let formatter = &self.counter_formatters[formatter_id];
            let values: Vec<ValueWithSubNums> = instances.keys().cloned().collect();
            let items = formatter
                .format_many_items(&[NumberGroup::new(values)], &FormatOptions::default());

            let mut rendered = Vec::with_capacity(items.len());
            for item in items {
                let text = backend.render_value(&item.text);
                let linked = item
                    .target
                    .as_ref()
                    .and_then(|target| instances.get(&target.value));
                match linked.and_then(|inst| inst.target_anchor.as_deref()) {
                    Some(anchor) => rendered.push(backend.render_link(
                        "ref",
                        anchor,
                        text,
                        &[format!("refcnt-{formatter_id}")],
                    )),
                    None => rendered.push(text),
                }
            }
            pieces.push(backend.render_join(rendered));
        }

        for instance in &uncounted {
            pieces.push(self.render_ref_instance(instance, None, ctx)?);
        }

        let mut joined = Vec::new();
        for (i, piece) in pieces.into_iter().enumerate() {
            if i > 0 {
                joined.push(backend.render_value(", "));
            }
            joined.push(piece);
        }
        Ok(backend.render_join(joined))
    }
}

/// Borrow the refs render manager for the duration of `f`.
pub fn with_refs_manager<R>(
    ctx: &RenderContext<'_>,
    f: impl FnOnce(&RefsRenderManager) -> Result<R>,
) -> Result<R> {
    let manager = ctx.expect_feature_render_manager("refs")?;
    let manager = manager.borrow();
    let refs = manager
        .as_any()
        .downcast_ref::<RefsRenderManager>()
        .ok_or_else(|| GalleyError::render("feature ‘refs’ has an unexpected manager type"))?;
    f(refs)
}

/// Mutably borrow the refs render manager for the duration of `f`.
pub fn with_refs_manager_mut<R>(
    ctx: &RenderContext<'_>,
    f: impl FnOnce(&mut RefsRenderManager) -> Result<R>,
) -> Result<R> {
    let manager = ctx.expect_feature_render_manager("refs")?;
    let mut manager = manager.borrow_mut();
    let refs = manager
        .as_any_mut()
        .downcast_mut::<RefsRenderManager>()
        .ok_or_else(|| GalleyError::render("feature ‘refs’ has an unexpected manager type"))?;
    f(refs)
}

/// A `\ref`-like node: one or more `(ref_type, ref_label)` targets, with
/// the node's content (if any) as a custom display text.
///
/// Delayed-rendered, so references may point at labels defined later in the
/// document.
#[derive(Debug)]
pub struct RefNodeSpec {
    targets: Vec<(String, String)>,
}

impl RefNodeSpec {
    pub fn new(targets: Vec<(String, String)>) -> Self {
        Self { targets }
    }

    pub fn single(ref_type: impl Into<String>, ref_label: impl Into<String>) -> Self {
        Self {
            targets: vec![(ref_type.into(), ref_label.into())],
        }
    }
}

impl NodeSpec for RefNodeSpec {
    fn is_delayed(&self, _node: &Node) -> bool {
        true
    }

    fn render(&self, node: &Node, ctx: &mut RenderContext<'_>) -> Result<Output> {
        let display = match node.as_element().and_then(|el| el.content.as_ref()) {
            Some(content) => {
                let content = content.clone();
                Some(ctx.render_node_list(&content)?)
            }
            None => None,
        };

        if self.targets.len() == 1 {
            let (ref_type, ref_label) = &self.targets[0];
            return with_refs_manager(ctx, |refs| {
                refs.render_ref(ref_type, ref_label, display, ctx)
            });
        }

        // several ref targets cannot take a single custom display text
        if display.is_some() {
            return Err(GalleyError::render(
                "a reference with a custom display text cannot have multiple targets",
            ));
        }
        with_refs_manager(ctx, |refs| refs.render_ref_many(&self.targets, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::PrefixDisplay;
    use crate::testutil::PlainBackend;

    fn manager() -> RefsRenderManager {
        RefsRenderManager {
            ref_labels: IndexMap::new(),
            registered_by_node: HashMap::new(),
            counter_formatters: HashMap::new(),
            pending_formatters: Vec::new(),
            external_resolvers: Vec::new(),
        }
    }

    #[test]
    fn safe_target_id_encodes_unsafe_characters() {
        assert_eq!(safe_target_id("eq", "my-label"), "eq-my-label");
        assert_eq!(safe_target_id("eq", "a:b"), "eq-a_3aXb");
        assert_eq!(safe_target_id("sec", "x y"), "sec-x_20Xy");
    }

    #[test]
    fn duplicate_label_with_different_content_fails_at_registration() {
        let mut refs = manager();
        let mut idgen = crate::node::NodeIdGen::new();
        let a = idgen.next_id();
        let b = idgen.next_id();
        refs.register_reference(a, RefInstance::new("eq", "x", "(1)", None))
            .unwrap();
        let err = refs
            .register_reference(b, RefInstance::new("eq", "x", "(2)", None))
            .unwrap_err();
        assert!(matches!(
            err,
            GalleyError::Ref(RefError::DuplicateLabel { ref_type, ref_label })
                if ref_type == "eq" && ref_label == "x"
        ));
    }

    #[test]
    fn re_registration_from_same_node_is_idempotent() {
        let mut refs = manager();
        let mut idgen = crate::node::NodeIdGen::new();
        let node = idgen.next_id();
        let first = refs
            .register_reference(node, RefInstance::new("eq", "x", "(1)", None))
            .unwrap();
        let second = refs
            .register_reference(node, RefInstance::new("eq", "x", "(ignored)", None))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn step_counter_registration_does_not_double_step() {
        let mut refs = manager();
        let mut idgen = crate::node::NodeIdGen::new();
        let node = idgen.next_id();
        let formatter = Rc::new(
            CounterFormatter::arabic()
                .with_delimiters("(", ")")
                .with_id("eq"),
        );
        let mut counter = Counter::new(formatter);
        let first = refs
            .register_reference_step_counter(node, "eq", "x", &mut counter, |v| {
                Some(format!("#eq-{v}"))
            })
            .unwrap();
        let again = refs
            .register_reference_step_counter(node, "eq", "x", &mut counter, |v| {
                Some(format!("#eq-{v}"))
            })
            .unwrap();
        assert_eq!(counter.value(), 1);
        assert_eq!(first, again);
        assert_eq!(first.display_text, "(1)");
        assert_eq!(first.counter_value, Some(ValueWithSubNums::new(1)));
    }

    struct FixedResolver;

    impl ExternalRefResolver for FixedResolver {
        fn resolve(
            &self,
            ref_type: &str,
            ref_label: &str,
            _ctx: &RenderContext<'_>,
        ) -> Option<RefInstance> {
            (ref_type == "topic").then(|| {
                RefInstance::new(
                    ref_type,
                    ref_label,
                    format!("topic {ref_label}"),
                    Some(format!("/topics/{ref_label}")),
                )
            })
        }
    }

    #[test]
    fn resolution_falls_back_to_external_resolvers() {
        let mut refs = manager();
        refs.external_resolvers.push(Rc::new(FixedResolver));
        let backend = PlainBackend::default();
        let ctx = RenderContext::standalone(&backend);

        let hit = refs.resolve("topic", "colors", &ctx).unwrap();
        assert_eq!(hit.target_anchor.as_deref(), Some("/topics/colors"));

        let miss = refs.resolve("eq", "nope", &ctx).unwrap_err();
        assert!(matches!(
            miss,
            GalleyError::Ref(RefError::Unresolved { ref_label, .. }) if ref_label == "nope"
        ));
    }

    #[test]
    fn render_ref_many_compresses_counted_references() {
        let mut refs = manager();
        let mut idgen = crate::node::NodeIdGen::new();
        let formatter = Rc::new(
            CounterFormatter::arabic()
                .with_delimiters("(", ")")
                .with_prefix_display(PrefixDisplay::new("eq. ", "eqs. "))
                .with_id("eq"),
        );
        refs.register_counter_formatter(Rc::clone(&formatter)).unwrap();
        let mut counter = Counter::new(Rc::clone(&formatter));
        for label in ["a", "b", "c"] {
            let node = idgen.next_id();
            refs.register_reference_step_counter(node, "eq", label, &mut counter, |v| {
                Some(format!("#eq-{v}"))
            })
            .unwrap();
        }

        let backend = PlainBackend::default();
        let ctx = RenderContext::standalone(&backend);
        let targets: Vec<(String, String)> = ["a", "b", "c"]
            .iter()
            .map(|l| ("eq".to_owned(), (*l).to_owned()))
            .collect();
        let out = refs.render_ref_many(&targets, &ctx).unwrap();
        assert_eq!(
            out.into_text().unwrap(),
            "[eqs. (1)](#eq-1)–[(3)](#eq-3)"
        );
    }

    #[test]
    fn render_ref_many_mixes_counted_and_uncounted() {
        let mut refs = manager();
        let mut idgen = crate::node::NodeIdGen::new();
        let formatter = Rc::new(
            CounterFormatter::arabic()
                .with_delimiters("(", ")")
                .with_id("eq"),
        );
        refs.register_counter_formatter(Rc::clone(&formatter)).unwrap();
        let mut counter = Counter::new(Rc::clone(&formatter));
        refs.register_reference_step_counter(idgen.next_id(), "eq", "a", &mut counter, |v| {
            Some(format!("#eq-{v}"))
        })
        .unwrap();
        refs.register_reference(
            idgen.next_id(),
            RefInstance::new("sec", "intro", "Introduction", Some("#sec-intro".into())),
        )
        .unwrap();

        let backend = PlainBackend::default();
        let ctx = RenderContext::standalone(&backend);
        let out = refs
            .render_ref_many(
                &[
                    ("eq".to_owned(), "a".to_owned()),
                    ("sec".to_owned(), "intro".to_owned()),
                ],
                &ctx,
            )
            .unwrap();
        assert_eq!(
            out.into_text().unwrap(),
            "[(1)](#eq-1), [Introduction](#sec-intro)"
        );
    }

    #[test]
    fn duplicate_counter_formatter_id_is_rejected() {
        let mut refs = manager();
        let formatter = Rc::new(CounterFormatter::arabic().with_id("eq"));
        refs.register_counter_formatter(Rc::clone(&formatter)).unwrap();
        let err = refs.register_counter_formatter(formatter).unwrap_err();
        assert!(matches!(
            err,
            GalleyError::Config(ConfigError::DuplicateCounterFormatter(id)) if id == "eq"
        ));
    }
}
