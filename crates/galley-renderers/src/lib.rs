/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Output backends for galley documents.
 */

//! Output backends for galley documents.
//!
//! Each backend implements galley-core's
//! [`OutputBackend`](galley_core::OutputBackend) contract for one concrete
//! output format:
//!
//! - [`HtmlBackend`] - HTML fragments; supports structural delayed-marker
//!   splicing
//! - [`TextBackend`] - plain text with underlined headings
//! - [`MarkdownBackend`] - Markdown with escaped metacharacters
//! - [`LatexBackend`] - LaTeX source with escaped specials
//!
//! The backends only assemble and escape text; all document semantics
//! (features, counters, references) live in galley-core.

pub mod html;
pub mod latex;
pub mod markdown;
pub mod text;

pub use html::HtmlBackend;
pub use latex::LatexBackend;
pub use markdown::MarkdownBackend;
pub use text::TextBackend;
