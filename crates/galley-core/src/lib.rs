//! Core rendering infrastructure for galley
//!
//! This crate contains the document compilation and rendering pipeline that
//! turns an already-tokenized markup node tree into rendered output through
//! a plugin ("feature") architecture.
//!
//! # Architecture
//!
//! The pipeline is organized around these key types:
//!
//! - [`FeatureRegistry`] - validated, dependency-ordered set of features
//! - [`Document`] - per-document state, spawns render contexts
//! - [`RenderContext`] - per-render mutable state driving the two-phase
//!   delayed-render protocol
//! - [`CounterFormatter`] - formatting of single and aggregate counter
//!   values, used pervasively by cross-referencing
//! - [`OutputBackend`] - the contract concrete output formats implement
//!
//! # Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use galley_core::{Document, FeatureRegistry};
//! use galley_core::feature::refs::RefsFeature;
//!
//! let registry = Rc::new(FeatureRegistry::build(vec![
//!     Rc::new(RefsFeature::default()),
//! ])?);
//! let doc = Document::new(Rc::clone(&registry))?;
//! let html = doc.render(&backend, |ctx| ctx.render_node_list(&nodes))?;
//! ```

pub mod blocks;
pub mod counter;
pub mod error;
pub mod feature;
pub mod node;
pub mod output;
pub mod render;

#[cfg(test)]
mod testutil;

// Re-export commonly used types
pub use blocks::{BlocksBuilder, finalize_node_list, simplify_whitespace};
pub use counter::{
    Counter, CounterAlias, CounterFormatter, CounterFormatterConfig, FormatOptions, JoinSpec,
    NumberGroup, NumeralStyle, PrefixDisplay, ValueWithSubNums,
};
pub use error::{ConfigError, GalleyError, RefError, Result};
pub use feature::{Feature, FeatureDocumentManager, FeatureRegistry, FeatureRenderManager};
pub use node::{Block, Layout, Node, NodeId, NodeIdGen, NodeList, NodeSpec, NodeTags, SourceSpan};
pub use output::{HeadingStyle, Output, OutputBackend, Segment, TextFormat};
pub use render::{Document, LogicalValue, RenderContext, RenderPhase};
