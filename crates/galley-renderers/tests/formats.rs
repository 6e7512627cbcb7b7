//! One document, rendered through every backend.
//!
//! The document exercises headings (top-level and run-in), paragraph
//! grouping, endnote marks and the collected endnote list.

use std::rc::Rc;

use galley_core::feature::endnotes::{
    EndnoteCategory, EndnoteMarkSpec, EndnotesFeature, render_endnotes,
};
use galley_core::feature::headings::{HeadingSpec, HeadingsFeature};
use galley_core::{
    CounterFormatter, Document, Feature, FeatureRegistry, Node, NodeIdGen, NodeList,
    NumeralStyle, OutputBackend, SourceSpan, finalize_node_list,
};
use galley_renderers::{HtmlBackend, LatexBackend, MarkdownBackend, TextBackend};

fn inline_text(idgen: &mut NodeIdGen, text: &str) -> NodeList {
    finalize_node_list(
        vec![Node::text(idgen.next_id(), text, SourceSpan::default())],
        Some(false),
    )
    .unwrap()
}

fn build_scene() -> (Document, NodeList) {
    let footnotes = EndnoteCategory::new(
        "footnote",
        Rc::new(CounterFormatter::new(NumeralStyle::FnSymbol)),
    )
    .with_heading_title("Footnotes");
    let registry = FeatureRegistry::build(vec![
        Rc::new(EndnotesFeature::new(vec![footnotes])) as Rc<dyn Feature>,
        Rc::new(HeadingsFeature::new()),
    ])
    .unwrap();
    let doc = Document::new(Rc::new(registry)).unwrap();

    let mut idgen = NodeIdGen::new();
    let span = SourceSpan::default();

    let heading_text = inline_text(&mut idgen, "Intro");
    let heading = HeadingSpec::new(1).node(&mut idgen, heading_text, span);

    let note_text = inline_text(&mut idgen, "the fine print");
    let mark = EndnoteMarkSpec::new("footnote").node(&mut idgen, note_text, span);

    let lead_in_text = inline_text(&mut idgen, "Note");
    let lead_in = HeadingSpec::new(4).node(&mut idgen, lead_in_text, span);

    let nodes = vec![
        heading,
        Node::text(idgen.next_id(), "A fact", span),
        mark,
        Node::text(idgen.next_id(), " stands.", span),
        lead_in,
        Node::text(idgen.next_id(), "inline lead-in.", span),
    ];
    let list = finalize_node_list(nodes, None).unwrap();
    (doc, list)
}

fn render_with(backend: &dyn OutputBackend) -> String {
    let (doc, list) = build_scene();
    doc.render(backend, |ctx| {
        let body = ctx.render_node_list(&list)?;
        let notes = render_endnotes(ctx, "footnote")?;
        Ok(ctx.backend().render_join_blocks(vec![body, notes]))
    })
    .unwrap()
}

#[test]
fn renders_html() {
    let out = render_with(&HtmlBackend::new());
    insta::assert_snapshot!(out, @r###"
<h1 id="sec--Intro" class="heading-level-1">Intro</h1>
<p>A fact<a href="#endnote-footnote-1" class="href-endnote endnote footnote">*</a> stands.</p>
<p><span id="sec--Note" class="heading-level-4 heading-inline">Note</span> inline lead-in.</p>
<div id="endnotes-footnote" class="endnotes"><h2 class="heading-level-2">Footnotes</h2>
<dl class="enumeration endnotes"><dt>*</dt><dd>the fine print</dd></dl></div>
"###);
}

#[test]
fn renders_text() {
    let out = render_with(&TextBackend::new());
    insta::assert_snapshot!(out, @r###"
Intro
=====

A fact* stands.

Note:  inline lead-in.

Footnotes
---------

  * the fine print
"###);
}

#[test]
fn renders_markdown() {
    let out = render_with(&MarkdownBackend::new());
    insta::assert_snapshot!(out, @r###"
<a name="sec--Intro"></a># Intro

A fact[\*](#endnote-footnote-1) stands\.

<a name="sec--Note"></a>**Note** inline lead\-in\.

<a name="endnotes-footnote"></a>## Footnotes

\*: the fine print
"###);
}

#[test]
fn renders_latex() {
    let out = render_with(&LatexBackend::new());
    insta::assert_snapshot!(out.trim_end_matches('\n'), @r###"
\section{Intro}%
\label{x:sec--Intro}%

A fact\hyperref[x:endnote-footnote-1]{*} stands.

\paragraph{Note}%
\label{x:sec--Note}%
inline lead-in.

\phantomsection\label{x:endnotes-footnote}%
\subsection{Footnotes}

\begin{itemize}
\item[{*}] the fine print
\end{itemize}
"###);
}

#[test]
fn html_and_text_agree_on_visible_words() {
    let html = render_with(&HtmlBackend::new());
    let text = render_with(&TextBackend::new());
    for word in ["Intro", "A fact", "stands.", "the fine print"] {
        assert!(html.contains(word), "html output lost ‘{word}’");
        assert!(text.contains(word), "text output lost ‘{word}’");
    }
}
