//! Error types for galley-core

use std::fmt;

use thiserror::Error;

use crate::node::SourceSpan;

/// Configuration errors detected while building a [`crate::FeatureRegistry`].
///
/// These are all fatal: no partial registry is ever produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("duplicate feature name: ‘{0}’")]
    DuplicateFeature(String),

    #[error("feature ‘{feature}’ has unmet dependency ‘{dependency}’")]
    UnmetDependency { feature: String, dependency: String },

    #[error("the feature dependency graph has a cycle; problematic dependencies: {0}")]
    DependencyCycle(CycleReport),

    #[error("counter formatter with id ‘{0}’ is already registered")]
    DuplicateCounterFormatter(String),
}

/// The features left with unresolved dependency edges when a topological
/// sort stalls, reported one `‘feature’ → ‘dep’, ‘dep’` entry per feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub remaining: Vec<(String, Vec<String>)>,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (feature, deps) in &self.remaining {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            let deps = deps
                .iter()
                .map(|d| format!("‘{d}’"))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, "‘{feature}’ → {deps}")?;
        }
        Ok(())
    }
}

/// Cross-reference errors. Both are fatal for the enclosing render.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefError {
    #[error("duplicate reference label ‘{ref_type}:{ref_label}’ in the same document")]
    DuplicateLabel { ref_type: String, ref_label: String },

    #[error(
        "reference target ‘{ref_type}:{ref_label}’ found neither within the document \
         nor with any set external resolvers"
    )]
    Unresolved { ref_type: String, ref_label: String },
}

#[derive(Error, Debug)]
pub enum GalleyError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Block-level content in an inline-only context, and similar structural
    /// violations. Carries the offending node's source span.
    #[error("{message} (at {span})")]
    Structural { message: String, span: SourceSpan },

    #[error("{0}")]
    Ref(#[from] RefError),

    #[error("render error: {0}")]
    Render(String),
}

impl GalleyError {
    /// Create a render error from any message.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Create a structural error at the given source span.
    pub fn structural(msg: impl Into<String>, span: SourceSpan) -> Self {
        Self::Structural {
            message: msg.into(),
            span,
        }
    }
}

pub type Result<T> = std::result::Result<T, GalleyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_report_lists_every_stalled_feature() {
        let report = CycleReport {
            remaining: vec![
                ("a".into(), vec!["b".into()]),
                ("b".into(), vec!["a".into(), "c".into()]),
            ],
        };
        assert_eq!(report.to_string(), "‘a’ → ‘b’; ‘b’ → ‘a’, ‘c’");
    }

    #[test]
    fn structural_error_displays_span() {
        let err = GalleyError::structural("block content in inline text", SourceSpan::new(12, 30));
        assert_eq!(
            err.to_string(),
            "block content in inline text (at 12..30)"
        );
    }
}
