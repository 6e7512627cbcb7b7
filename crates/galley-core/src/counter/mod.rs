/*
 * counter/mod.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Counter engine: formatting of single and aggregate counter values.
 */

//! Counter engine.
//!
//! [`CounterFormatter`] turns counter values into display text: a single
//! value (optionally with hierarchical sub-numbers and a numeric prefix,
//! e.g. `3.2a`), or an aggregate of values compressed into ranges and lists
//! (`(1)–(3)`, `(1) and (3)`, `(1), (4) and (6)`). Aggregates keep values
//! from different numbering scopes (distinct numeric prefixes) in separate
//! ranges, and can tag each rendered number with its link target so that
//! adjacent segments resolving to the same target merge into a single
//! hyperlink span.
//!
//! [`Counter`] is the 1-based stepping counter used by numbered features;
//! [`CounterAlias`] mirrors another counter's sequence while formatting it
//! independently (e.g. theorem-like environments sharing one running
//! number).

pub mod numerals;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::{GalleyError, Result};

pub use numerals::{NumeralStyle, NumeralStyleConfig};

// --------------------------------------------------------------------------

/// A counter value with optional hierarchical sub-numbers.
///
/// Ordering is lexicographic on the `(main, sub1, sub2, …)` tuple. The
/// tuple length is fixed once created except through [`Self::extended`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueWithSubNums {
    num: i32,
    subnums: Vec<i32>,
}

impl ValueWithSubNums {
    pub fn new(num: i32) -> Self {
        Self {
            num,
            subnums: Vec::new(),
        }
    }

    pub fn with_subnums(num: i32, subnums: impl Into<Vec<i32>>) -> Self {
        Self {
            num,
            subnums: subnums.into(),
        }
    }

    pub fn num(&self) -> i32 {
        self.num
    }

    pub fn subnums(&self) -> &[i32] {
        &self.subnums
    }

    /// Tuple position count (1 for a plain value).
    pub fn depth(&self) -> usize {
        1 + self.subnums.len()
    }

    /// Increment the component at `level` (0 is the main number; default is
    /// the last component) and zero all later components.
    pub fn incremented(&self, level: Option<usize>) -> Self {
        let level = level.unwrap_or(self.subnums.len()).min(self.subnums.len());
        let mut out = self.clone();
        if level == 0 {
            out.num += 1;
            out.subnums.iter_mut().for_each(|s| *s = 0);
        } else {
            out.subnums[level - 1] += 1;
            out.subnums[level..].iter_mut().for_each(|s| *s = 0);
        }
        out
    }

    /// True iff `self` equals `other` with its last component incremented
    /// by one.
    pub fn immediately_follows(&self, other: &Self) -> bool {
        *self == other.incremented(None)
    }

    /// Append a new sub-level initialized to `sub`.
    pub fn extended(&self, sub: i32) -> Self {
        let mut out = self.clone();
        out.subnums.push(sub);
        out
    }
}

impl From<i32> for ValueWithSubNums {
    fn from(num: i32) -> Self {
        Self::new(num)
    }
}

impl fmt::Display for ValueWithSubNums {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.num)?;
        for sub in &self.subnums {
            write!(f, ".{sub}")?;
        }
        Ok(())
    }
}

// --------------------------------------------------------------------------

static RX_JOIN_TEMPLATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([a-zA-Z0-9_.]+)\}").unwrap());

/// Templates and separators used to join formatted counter values.
///
/// The `${and}`, `${sep}` and `${endash}` placeholders found in any field
/// are substituted once, when the owning [`CounterFormatter`] is built.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JoinSpec {
    pub one_pre: String,
    pub one_post: String,
    pub pair_pre: String,
    pub pair_mid: String,
    pub pair_post: String,
    pub range_pre: String,
    pub range_mid: String,
    pub range_pairmid: String,
    pub range_post: String,
    pub list_pre: String,
    pub list_mid: String,
    pub list_midlast: String,
    pub list_post: String,
    pub and: String,
    pub sep: String,
    pub endash: String,
    pub empty: String,
}

impl Default for JoinSpec {
    fn default() -> Self {
        Self {
            one_pre: String::new(),
            one_post: String::new(),
            pair_pre: String::new(),
            pair_mid: " ${and} ".into(),
            pair_post: String::new(),
            range_pre: String::new(),
            range_mid: "${endash}".into(),
            range_pairmid: "${sep}".into(),
            range_post: String::new(),
            list_pre: String::new(),
            list_mid: "${sep} ".into(),
            list_midlast: "${sep} ${and} ".into(),
            list_post: String::new(),
            and: "and".into(),
            sep: ",".into(),
            endash: "–".into(),
            empty: "(empty)".into(),
        }
    }
}

impl JoinSpec {
    /// The compact preset: comma-separated, no conjunction words.
    pub fn compact() -> Self {
        Self {
            pair_mid: ",".into(),
            range_mid: "–".into(),
            range_pairmid: ",".into(),
            list_mid: ",".into(),
            list_midlast: ",".into(),
            ..Self::default()
        }
    }

    /// Substitute `${name}` placeholders in every field, using the spec's
    /// own fields as the variable table.
    fn resolved(&self) -> Self {
        let vars: HashMap<&str, &str> = [
            ("and", self.and.as_str()),
            ("sep", self.sep.as_str()),
            ("endash", self.endash.as_str()),
            ("empty", self.empty.as_str()),
        ]
        .into_iter()
        .collect();
        let subst = |s: &str| -> String {
            RX_JOIN_TEMPLATE
                .replace_all(s, |caps: &regex::Captures<'_>| {
                    vars.get(&caps[1]).map_or_else(|| caps[0].to_owned(), |v| (*v).to_owned())
                })
                .into_owned()
        };
        Self {
            one_pre: subst(&self.one_pre),
            one_post: subst(&self.one_post),
            pair_pre: subst(&self.pair_pre),
            pair_mid: subst(&self.pair_mid),
            pair_post: subst(&self.pair_post),
            range_pre: subst(&self.range_pre),
            range_mid: subst(&self.range_mid),
            range_pairmid: subst(&self.range_pairmid),
            range_post: subst(&self.range_post),
            list_pre: subst(&self.list_pre),
            list_mid: subst(&self.list_mid),
            list_midlast: subst(&self.list_midlast),
            list_post: subst(&self.list_post),
            and: self.and.clone(),
            sep: self.sep.clone(),
            endash: self.endash.clone(),
            empty: subst(&self.empty),
        }
    }
}

/// Join-spec configuration: a preset name (`default`, `compact`) or a full
/// spec.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JoinSpecConfig {
    Preset(String),
    Spec(JoinSpec),
}

impl JoinSpecConfig {
    pub fn build(&self) -> Result<JoinSpec> {
        match self {
            Self::Preset(name) => match name.as_str() {
                "default" => Ok(JoinSpec::default()),
                "compact" => Ok(JoinSpec::compact()),
                other => Err(GalleyError::render(format!(
                    "unknown join spec preset ‘{other}’"
                ))),
            },
            Self::Spec(spec) => Ok(spec.clone()),
        }
    }
}

// --------------------------------------------------------------------------

/// Singular/plural display words for one prefix form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PrefixWords {
    #[serde(default)]
    pub singular: String,
    #[serde(default)]
    pub plural: String,
}

/// The prefix word table of a formatter: a base singular/plural pair plus
/// named variants (e.g. a `capital` variant).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixDisplay {
    pub base: PrefixWords,
    pub variants: HashMap<String, PrefixWords>,
}

impl PrefixDisplay {
    /// No prefix words at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// The same word for singular and plural.
    pub fn uniform(word: impl Into<String>) -> Self {
        let word = word.into();
        Self::new(word.clone(), word)
    }

    pub fn new(singular: impl Into<String>, plural: impl Into<String>) -> Self {
        Self {
            base: PrefixWords {
                singular: singular.into(),
                plural: plural.into(),
            },
            variants: HashMap::new(),
        }
    }

    pub fn with_variant(
        mut self,
        name: impl Into<String>,
        singular: impl Into<String>,
        plural: impl Into<String>,
    ) -> Self {
        self.variants.insert(
            name.into(),
            PrefixWords {
                singular: singular.into(),
                plural: plural.into(),
            },
        );
        self
    }

    fn prefix_for(&self, count: usize, variant: Option<&str>) -> &str {
        let words = variant
            .and_then(|v| self.variants.get(v))
            .unwrap_or(&self.base);
        if count == 1 {
            &words.singular
        } else {
            &words.plural
        }
    }
}

/// Prefix-display configuration: a single word, or a full table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PrefixDisplayConfig {
    Uniform(String),
    Table {
        #[serde(default)]
        singular: String,
        #[serde(default)]
        plural: String,
        #[serde(default)]
        variants: HashMap<String, PrefixWords>,
    },
}

impl PrefixDisplayConfig {
    pub fn build(&self) -> PrefixDisplay {
        match self {
            Self::Uniform(word) => PrefixDisplay::uniform(word.clone()),
            Self::Table {
                singular,
                plural,
                variants,
            } => PrefixDisplay {
                base: PrefixWords {
                    singular: singular.clone(),
                    plural: plural.clone(),
                },
                variants: variants.clone(),
            },
        }
    }
}

/// Numeral style and joining prefix for one sub-number level (e.g. style
/// `alph` with prefix `"."` renders sub-number 2 as `".b"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubNumStyle {
    pub style: NumeralStyle,
    pub prefix: String,
}

impl SubNumStyle {
    pub fn new(style: NumeralStyle, prefix: impl Into<String>) -> Self {
        Self {
            style,
            prefix: prefix.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubNumStyleConfig {
    pub format_num: NumeralStyleConfig,
    #[serde(default = "default_subnum_prefix")]
    pub prefix: String,
}

fn default_subnum_prefix() -> String {
    ".".into()
}

// --------------------------------------------------------------------------

/// Formatting options common to [`CounterFormatter::format_single`] and
/// [`CounterFormatter::format_many`].
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions<'a> {
    /// Apply the singular/plural prefix word.
    pub with_prefix: bool,
    /// Wrap each rendered number in the configured delimiters.
    pub with_delimiters: bool,
    /// Select a named prefix variant instead of the base words.
    pub prefix_variant: Option<&'a str>,
}

impl Default for FormatOptions<'_> {
    fn default() -> Self {
        Self {
            with_prefix: true,
            with_delimiters: true,
            prefix_variant: None,
        }
    }
}

impl FormatOptions<'_> {
    /// Delimiters but no prefix word (the form counters themselves use).
    pub fn no_prefix() -> Self {
        Self {
            with_prefix: false,
            ..Self::default()
        }
    }
}

/// Values to aggregate, belonging to one numbering scope.
///
/// Values from different scopes (different numeric prefixes, e.g. different
/// sections) must not be merged into the same range, so the caller groups
/// them.
#[derive(Debug, Clone)]
pub struct NumberGroup {
    pub numprefix: Option<String>,
    pub values: Vec<ValueWithSubNums>,
}

impl NumberGroup {
    pub fn new(values: Vec<ValueWithSubNums>) -> Self {
        Self {
            numprefix: None,
            values,
        }
    }

    pub fn prefixed(numprefix: impl Into<String>, values: Vec<ValueWithSubNums>) -> Self {
        Self {
            numprefix: Some(numprefix.into()),
            values,
        }
    }

    pub fn from_numbers(values: impl IntoIterator<Item = i32>) -> Self {
        Self::new(values.into_iter().map(ValueWithSubNums::new).collect())
    }
}

/// The link target of one rendered number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberRef {
    pub numprefix: Option<String>,
    pub value: ValueWithSubNums,
}

/// One piece of a formatted aggregate: display text plus the number it
/// links to, if any. Adjacent pieces with the same target have already been
/// merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedItem {
    pub text: String,
    pub target: Option<NumberRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ItemTag {
    /// Merges into whichever link span it sits next to.
    Neutral,
    /// Never part of a link (separators, template glue).
    NoLink,
    Link(NumberRef),
}

// --------------------------------------------------------------------------

/// Immutable counter-display configuration.
///
/// Built once (possibly from declarative configuration via
/// [`CounterFormatterConfig`]) and shared by every feature that displays
/// the counter.
#[derive(Debug, Clone)]
pub struct CounterFormatter {
    format_num: NumeralStyle,
    prefix_display: PrefixDisplay,
    delimiters: (String, String),
    join_spec: JoinSpec,
    name_in_link: bool,
    subnum_styles: Vec<SubNumStyle>,
    id: Option<String>,
}

impl CounterFormatter {
    pub fn new(format_num: NumeralStyle) -> Self {
        Self {
            format_num,
            prefix_display: PrefixDisplay::none(),
            delimiters: (String::new(), String::new()),
            join_spec: JoinSpec::default().resolved(),
            name_in_link: true,
            subnum_styles: Vec::new(),
            id: None,
        }
    }

    pub fn arabic() -> Self {
        Self::new(NumeralStyle::Arabic)
    }

    pub fn with_prefix_display(mut self, prefix_display: PrefixDisplay) -> Self {
        self.prefix_display = prefix_display;
        self
    }

    pub fn with_delimiters(mut self, open: impl Into<String>, close: impl Into<String>) -> Self {
        self.delimiters = (open.into(), close.into());
        self
    }

    pub fn with_join_spec(mut self, join_spec: JoinSpec) -> Self {
        self.join_spec = join_spec.resolved();
        self
    }

    pub fn with_name_in_link(mut self, name_in_link: bool) -> Self {
        self.name_in_link = name_in_link;
        self
    }

    pub fn with_subnum_styles(mut self, styles: Vec<SubNumStyle>) -> Self {
        self.subnum_styles = styles;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The formatter id used to key registered formatters (e.g. by the
    /// refs feature).
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name_in_link(&self) -> bool {
        self.name_in_link
    }

    /// Render the bare numeral for `n` (no prefix, delimiters or subnums).
    pub fn format_num(&self, n: i32) -> String {
        self.format_num.format(n)
    }

    /// `numprefix` + main numeral + sub-number suffixes, without
    /// delimiters.
    fn render_number(&self, value: &ValueWithSubNums, numprefix: Option<&str>) -> String {
        let mut s = String::new();
        if let Some(p) = numprefix {
            s.push_str(p);
        }
        s.push_str(&self.format_num.format(value.num()));
        for (level, sub) in value.subnums().iter().enumerate() {
            // missing levels reuse the last configured style
            let style = self
                .subnum_styles
                .get(level)
                .or_else(|| self.subnum_styles.last());
            match style {
                Some(style) => {
                    s.push_str(&style.prefix);
                    s.push_str(&style.style.format(*sub));
                }
                None => {
                    s.push('.');
                    s.push_str(&sub.to_string());
                }
            }
        }
        s
    }

    fn delimited(&self, value: &ValueWithSubNums, numprefix: Option<&str>, opts: &FormatOptions<'_>) -> String {
        let number = self.render_number(value, numprefix);
        if opts.with_delimiters {
            format!("{}{}{}", self.delimiters.0, number, self.delimiters.1)
        } else {
            number
        }
    }

    /// Format a single counter value, optionally with sub-numbers and a
    /// hierarchical numeric prefix.
    pub fn format_single(
        &self,
        value: i32,
        subnums: &[i32],
        numprefix: Option<&str>,
        opts: &FormatOptions<'_>,
    ) -> String {
        let value = ValueWithSubNums::with_subnums(value, subnums.to_vec());
        let delimited = self.delimited(&value, numprefix, opts);
        if opts.with_prefix {
            let prefix = self.prefix_display.prefix_for(1, opts.prefix_variant);
            format!("{prefix}{delimited}")
        } else {
            delimited
        }
    }

    /// Format an aggregate of values as merged, link-aware pieces.
    ///
    /// Values are sorted lexicographically within each group and compressed
    /// into ranges of immediately consecutive values. A lone range of
    /// exactly two consecutive values reads better as a pair and is split
    /// into two singletons. One entry uses the "one" templates, two the
    /// "pair" templates, three or more the "list" templates with the
    /// conjunction separator before the final entry.
    pub fn format_many_items(
        &self,
        groups: &[NumberGroup],
        opts: &FormatOptions<'_>,
    ) -> Vec<FormattedItem> {
        let js = &self.join_spec;

        let total: usize = groups.iter().map(|g| g.values.len()).sum();
        if total == 0 {
            return vec![FormattedItem {
                text: js.empty.clone(),
                target: None,
            }];
        }

        // (group index, range start, range end), in sorted order per group
        let mut ranges: Vec<(usize, ValueWithSubNums, ValueWithSubNums)> = Vec::new();
        for (gi, group) in groups.iter().enumerate() {
            let mut values = group.values.clone();
            values.sort();
            for v in values {
                match ranges.last_mut() {
                    Some((g, _, end)) if *g == gi && v.immediately_follows(end) => {
                        *end = v;
                    }
                    _ => ranges.push((gi, v.clone(), v)),
                }
            }
        }

        // A lone pair of consecutive values formats as two singletons.
        if ranges.len() == 1 && ranges[0].2.immediately_follows(&ranges[0].1) {
            let (gi, start, end) = ranges.remove(0);
            ranges.push((gi, start.clone(), start));
            ranges.push((gi, end.clone(), end));
        }

        let link_ref = |gi: usize, v: &ValueWithSubNums| NumberRef {
            numprefix: groups[gi].numprefix.clone(),
            value: v.clone(),
        };

        let render_range = |gi: usize,
                            start: &ValueWithSubNums,
                            end: &ValueWithSubNums|
         -> Vec<(String, ItemTag)> {
            let numprefix = groups[gi].numprefix.as_deref();
            if start == end {
                return vec![(
                    self.delimited(start, numprefix, opts),
                    ItemTag::Link(link_ref(gi, start)),
                )];
            }
            let mid = if end.immediately_follows(start) {
                &js.range_pairmid
            } else {
                &js.range_mid
            };
            vec![
                (js.range_pre.clone(), ItemTag::NoLink),
                (
                    self.delimited(start, numprefix, opts),
                    ItemTag::Link(link_ref(gi, start)),
                ),
                (mid.clone(), ItemTag::NoLink),
                (
                    self.delimited(end, numprefix, opts),
                    ItemTag::Link(link_ref(gi, end)),
                ),
                (js.range_post.clone(), ItemTag::NoLink),
            ]
        };

        let mut items: Vec<(String, ItemTag)> = Vec::new();

        if opts.with_prefix {
            let prefix = self.prefix_display.prefix_for(total, opts.prefix_variant);
            if !prefix.is_empty() {
                let tag = if self.name_in_link {
                    // the prefix word joins the link of the first number
                    ranges
                        .first()
                        .map(|(gi, start, _)| ItemTag::Link(link_ref(*gi, start)))
                        .unwrap_or(ItemTag::Neutral)
                } else {
                    ItemTag::NoLink
                };
                items.push((prefix.to_owned(), tag));
            }
        }

        match ranges.len() {
            1 => {
                items.push((js.one_pre.clone(), ItemTag::Neutral));
                items.extend(render_range(ranges[0].0, &ranges[0].1, &ranges[0].2));
                items.push((js.one_post.clone(), ItemTag::Neutral));
            }
            2 => {
                items.push((js.pair_pre.clone(), ItemTag::NoLink));
                items.extend(render_range(ranges[0].0, &ranges[0].1, &ranges[0].2));
                items.push((js.pair_mid.clone(), ItemTag::NoLink));
                items.extend(render_range(ranges[1].0, &ranges[1].1, &ranges[1].2));
                items.push((js.pair_post.clone(), ItemTag::NoLink));
            }
            _ => {
                items.push((js.list_pre.clone(), ItemTag::NoLink));
                let last = ranges.len() - 1;
                for (i, (gi, start, end)) in ranges.iter().enumerate() {
                    if i == last {
                        items.push((js.list_midlast.clone(), ItemTag::NoLink));
                    } else if i > 0 {
                        items.push((js.list_mid.clone(), ItemTag::NoLink));
                    }
                    items.extend(render_range(*gi, start, end));
                }
                items.push((js.list_post.clone(), ItemTag::NoLink));
            }
        }

        merge_items(items)
    }

    /// Format an aggregate of values as plain text.
    pub fn format_many(&self, groups: &[NumberGroup], opts: &FormatOptions<'_>) -> String {
        self.format_many_items(groups, opts)
            .into_iter()
            .map(|item| item.text)
            .collect()
    }

    /// Format an aggregate, wrapping each linked piece through `wrap`.
    pub fn format_many_with_links(
        &self,
        groups: &[NumberGroup],
        opts: &FormatOptions<'_>,
        wrap: impl Fn(&NumberRef, &str) -> String,
    ) -> String {
        self.format_many_items(groups, opts)
            .into_iter()
            .map(|item| match &item.target {
                Some(target) => wrap(target, &item.text),
                None => item.text,
            })
            .collect()
    }
}

/// Merge adjacent pieces belonging to the same link span. Empty template
/// glue is dropped first, so that pieces it separated (e.g. the prefix word
/// and the first number) can merge into a single span.
fn merge_items(items: Vec<(String, ItemTag)>) -> Vec<FormattedItem> {
    let mut merged: Vec<(String, ItemTag)> = Vec::new();
    for (s, tag) in items.into_iter().filter(|(s, _)| !s.is_empty()) {
        let Some((cur_s, cur_tag)) = merged.last_mut() else {
            merged.push((s, tag));
            continue;
        };
        let joinable = match (&*cur_tag, &tag) {
            (ItemTag::NoLink, ItemTag::NoLink) => true,
            (ItemTag::NoLink, _) => false,
            (ItemTag::Neutral, _) => true,
            (ItemTag::Link(_), ItemTag::Neutral) => true,
            (ItemTag::Link(a), ItemTag::Link(b)) => a == b,
            (ItemTag::Link(_), ItemTag::NoLink) => false,
        };
        if joinable {
            cur_s.push_str(&s);
            if matches!(cur_tag, ItemTag::Neutral) && !matches!(tag, ItemTag::Neutral) {
                *cur_tag = tag;
            }
        } else {
            merged.push((s, tag));
        }
    }
    merged
        .into_iter()
        .map(|(text, tag)| FormattedItem {
            text,
            target: match tag {
                ItemTag::Link(target) => Some(target),
                ItemTag::Neutral | ItemTag::NoLink => None,
            },
        })
        .collect()
}

// --------------------------------------------------------------------------

/// Declarative counter-formatter configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CounterFormatterConfig {
    pub format_num: NumeralStyleConfig,
    #[serde(default)]
    pub prefix_display: Option<PrefixDisplayConfig>,
    #[serde(default)]
    pub delimiters: Option<(String, String)>,
    #[serde(default)]
    pub join_spec: Option<JoinSpecConfig>,
    #[serde(default = "default_name_in_link")]
    pub name_in_link: bool,
    #[serde(default)]
    pub subnums: Vec<SubNumStyleConfig>,
    #[serde(default)]
    pub id: Option<String>,
}

fn default_name_in_link() -> bool {
    true
}

impl CounterFormatterConfig {
    pub fn build(&self) -> Result<CounterFormatter> {
        let mut formatter = CounterFormatter::new(self.format_num.build()?);
        if let Some(prefix) = &self.prefix_display {
            formatter = formatter.with_prefix_display(prefix.build());
        }
        if let Some((open, close)) = &self.delimiters {
            formatter = formatter.with_delimiters(open.clone(), close.clone());
        }
        if let Some(join) = &self.join_spec {
            formatter = formatter.with_join_spec(join.build()?);
        }
        formatter = formatter.with_name_in_link(self.name_in_link);
        let mut subnum_styles = Vec::new();
        for sub in &self.subnums {
            subnum_styles.push(SubNumStyle::new(sub.format_num.build()?, sub.prefix.clone()));
        }
        formatter = formatter.with_subnum_styles(subnum_styles);
        if let Some(id) = &self.id {
            formatter = formatter.with_id(id.clone());
        }
        Ok(formatter)
    }
}

// --------------------------------------------------------------------------

/// A 1-based stepping counter; `step()` increments before first use.
#[derive(Debug, Clone)]
pub struct Counter {
    formatter: Rc<CounterFormatter>,
    value: i32,
    initial_value: i32,
}

impl Counter {
    pub fn new(formatter: Rc<CounterFormatter>) -> Self {
        Self::with_initial_value(formatter, 0)
    }

    pub fn with_initial_value(formatter: Rc<CounterFormatter>, initial_value: i32) -> Self {
        Self {
            formatter,
            value: initial_value,
            initial_value,
        }
    }

    pub fn formatter(&self) -> &Rc<CounterFormatter> {
        &self.formatter
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn set_value(&mut self, value: i32) -> i32 {
        self.value = value;
        self.value
    }

    pub fn step(&mut self) -> i32 {
        self.value += 1;
        self.value
    }

    pub fn reset(&mut self) -> i32 {
        self.value = self.initial_value;
        self.value
    }

    /// Format an explicit value with this counter's formatter (delimiters,
    /// no prefix word).
    pub fn format_value(&self, value: i32) -> String {
        self.formatter
            .format_single(value, &[], None, &FormatOptions::no_prefix())
    }

    pub fn format_current(&self) -> String {
        self.format_value(self.value)
    }

    pub fn step_and_format(&mut self) -> (i32, String) {
        let value = self.step();
        (value, self.format_value(value))
    }
}

/// Mirrors another counter's running value while formatting it with an
/// independent formatter (several numbered kinds sharing one sequence).
#[derive(Debug, Clone)]
pub struct CounterAlias {
    formatter: Rc<CounterFormatter>,
    alias: Rc<RefCell<Counter>>,
}

impl CounterAlias {
    pub fn new(formatter: Rc<CounterFormatter>, alias: Rc<RefCell<Counter>>) -> Self {
        Self { formatter, alias }
    }

    pub fn formatter(&self) -> &Rc<CounterFormatter> {
        &self.formatter
    }

    pub fn value(&self) -> i32 {
        self.alias.borrow().value()
    }

    pub fn step(&self) -> i32 {
        self.alias.borrow_mut().step()
    }

    pub fn reset(&self) -> i32 {
        self.alias.borrow_mut().reset()
    }

    pub fn format_value(&self, value: i32) -> String {
        self.formatter
            .format_single(value, &[], None, &FormatOptions::no_prefix())
    }

    pub fn step_and_format(&self) -> (i32, String) {
        let value = self.step();
        (value, self.format_value(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(num: i32) -> ValueWithSubNums {
        ValueWithSubNums::new(num)
    }

    fn vs(num: i32, subs: &[i32]) -> ValueWithSubNums {
        ValueWithSubNums::with_subnums(num, subs.to_vec())
    }

    #[test]
    fn value_ordering_is_lexicographic() {
        assert!(v(1) < v(2));
        assert!(v(2) < vs(2, &[1]));
        assert!(vs(1, &[3, 1]) < vs(2, &[3]));
        assert!(vs(2, &[2]) < vs(2, &[3]));
    }

    #[test]
    fn incremented_zeroes_later_positions() {
        assert_eq!(vs(3, &[2, 5]).incremented(None), vs(3, &[2, 6]));
        assert_eq!(vs(3, &[2, 5]).incremented(Some(1)), vs(3, &[3, 0]));
        assert_eq!(vs(3, &[2, 5]).incremented(Some(0)), vs(4, &[0, 0]));
        assert_eq!(v(3).incremented(None), v(4));
    }

    #[test]
    fn immediately_follows_requires_same_shape() {
        assert!(v(2).immediately_follows(&v(1)));
        assert!(vs(2, &[3]).immediately_follows(&vs(2, &[2])));
        assert!(!vs(2, &[0]).immediately_follows(&v(2)));
        assert!(!vs(3, &[1]).immediately_follows(&vs(2, &[1])));
    }

    #[test]
    fn extended_appends_a_sub_level() {
        assert_eq!(v(3).extended(1), vs(3, &[1]));
        assert_eq!(vs(3, &[1]).extended(0), vs(3, &[1, 0]));
    }

    proptest::proptest! {
        #[test]
        fn incremented_last_is_immediate_successor(
            num in 0i32..100,
            subs in proptest::collection::vec(0i32..20, 0..3),
        ) {
            let value = ValueWithSubNums::with_subnums(num, subs);
            let next = value.incremented(None);
            proptest::prop_assert!(next.immediately_follows(&value));
            proptest::prop_assert!(value < next);
        }
    }

    fn arabic_parens() -> CounterFormatter {
        CounterFormatter::arabic().with_delimiters("(", ")")
    }

    #[test]
    fn format_many_compresses_a_range() {
        let f = arabic_parens();
        assert_eq!(
            f.format_many(&[NumberGroup::from_numbers([1, 2, 3])], &FormatOptions::default()),
            "(1)–(3)"
        );
    }

    #[test]
    fn format_many_two_values_read_as_a_pair() {
        let f = arabic_parens();
        assert_eq!(
            f.format_many(&[NumberGroup::from_numbers([1, 3])], &FormatOptions::default()),
            "(1) and (3)"
        );
        // two *consecutive* values also split into the pair form
        assert_eq!(
            f.format_many(&[NumberGroup::from_numbers([2, 1])], &FormatOptions::default()),
            "(1) and (2)"
        );
    }

    #[test]
    fn format_many_empty_uses_placeholder() {
        let f = arabic_parens();
        assert_eq!(
            f.format_many(&[], &FormatOptions::default()),
            "(empty)"
        );
    }

    #[test]
    fn format_many_list_uses_conjunction_before_last() {
        let f = arabic_parens();
        assert_eq!(
            f.format_many(
                &[NumberGroup::from_numbers([6, 1, 4])],
                &FormatOptions::default()
            ),
            "(1), (4), and (6)"
        );
        // a two-value range inside a larger list keeps the compact
        // pair-range separator
        assert_eq!(
            f.format_many(
                &[NumberGroup::from_numbers([1, 2, 5])],
                &FormatOptions::default()
            ),
            "(1),(2) and (5)"
        );
    }

    #[test]
    fn format_many_does_not_merge_across_numprefix_groups() {
        let f = CounterFormatter::new(NumeralStyle::RomanUpper)
            .with_delimiters("(", ")")
            .with_prefix_display(PrefixDisplay::new("eq. ", "eqs. "));
        assert_eq!(
            f.format_many(
                &[
                    NumberGroup::prefixed("A-", vec![v(2)]),
                    NumberGroup::prefixed("B-", vec![v(1)]),
                ],
                &FormatOptions::default()
            ),
            "eqs. (A-II) and (B-I)"
        );
    }

    #[test]
    fn format_many_with_subnum_ranges() {
        let f = CounterFormatter::new(NumeralStyle::RomanUpper)
            .with_delimiters("(", ")")
            .with_prefix_display(PrefixDisplay::new("eq. ", "eqs. "))
            .with_subnum_styles(vec![SubNumStyle::new(NumeralStyle::AlphLower, ".")]);
        assert_eq!(
            f.format_many(
                &[NumberGroup::prefixed(
                    "A.",
                    vec![vs(2, &[2]), vs(2, &[5]), vs(2, &[4]), vs(2, &[3]), v(1)],
                )],
                &FormatOptions::default()
            ),
            "eqs. (A.I) and (A.II.b)–(A.II.e)"
        );
    }

    #[test]
    fn format_single_with_subnums_and_numprefix() {
        let f = CounterFormatter::new(NumeralStyle::RomanUpper)
            .with_delimiters("(", ")")
            .with_prefix_display(PrefixDisplay::new("eq. ", "eqs. "))
            .with_subnum_styles(vec![
                SubNumStyle::new(NumeralStyle::AlphLower, "."),
                SubNumStyle::new(NumeralStyle::RomanLower, "."),
            ]);
        assert_eq!(
            f.format_single(1, &[2, 3], Some("A-"), &FormatOptions::default()),
            "eq. (A-I.b.iii)"
        );
        assert_eq!(
            f.format_single(1, &[3], None, &FormatOptions::no_prefix()),
            "(I.c)"
        );
    }

    #[test]
    fn prefix_variants_select_alternate_words() {
        let f = arabic_parens().with_prefix_display(
            PrefixDisplay::new("eq. ", "eqs. ").with_variant("capital", "Equation ", "Equations "),
        );
        let opts = FormatOptions {
            prefix_variant: Some("capital"),
            ..FormatOptions::default()
        };
        assert_eq!(
            f.format_many(&[NumberGroup::from_numbers([1])], &opts),
            "Equation (1)"
        );
        assert_eq!(
            f.format_many(&[NumberGroup::from_numbers([1, 5])], &opts),
            "Equations (1) and (5)"
        );
    }

    #[test]
    fn format_many_merges_link_spans() {
        let f = arabic_parens().with_prefix_display(PrefixDisplay::new("eq. ", "eqs. "));
        let wrap = |target: &NumberRef, text: &str| {
            format!(
                "<{}{}|{}>",
                target.numprefix.as_deref().unwrap_or(""),
                target.value,
                text
            )
        };

        // a single value keeps the prefix word inside the one link span
        assert_eq!(
            f.format_many_with_links(
                &[NumberGroup::from_numbers([4])],
                &FormatOptions::default(),
                wrap
            ),
            "<4|eq. (4)>"
        );

        // in a range, the prefix word merges into the first endpoint's link
        // span; the other endpoint is its own link
        assert_eq!(
            f.format_many_with_links(
                &[NumberGroup::from_numbers([1, 2, 3])],
                &FormatOptions::default(),
                wrap
            ),
            "<1|eqs. (1)>–<3|(3)>"
        );
    }

    #[test]
    fn name_in_link_false_keeps_prefix_out_of_links() {
        let f = arabic_parens()
            .with_prefix_display(PrefixDisplay::new("eq. ", "eqs. "))
            .with_name_in_link(false);
        let wrap = |_: &NumberRef, text: &str| format!("[{text}]");
        assert_eq!(
            f.format_many_with_links(
                &[NumberGroup::from_numbers([4])],
                &FormatOptions::default(),
                wrap
            ),
            "eq. [(4)]"
        );
    }

    #[test]
    fn compact_join_spec() {
        let f = arabic_parens().with_join_spec(JoinSpec::compact());
        assert_eq!(
            f.format_many(&[NumberGroup::from_numbers([1, 3])], &FormatOptions::default()),
            "(1),(3)"
        );
    }

    #[test]
    fn counter_steps_before_first_use() {
        let f = Rc::new(arabic_parens());
        let mut c = Counter::new(f);
        assert_eq!(c.value(), 0);
        assert_eq!(c.step_and_format(), (1, "(1)".into()));
        assert_eq!(c.step(), 2);
        c.reset();
        assert_eq!(c.value(), 0);
    }

    #[test]
    fn counter_alias_mirrors_the_sequence() {
        let shared = Rc::new(RefCell::new(Counter::new(Rc::new(arabic_parens()))));
        let alias = CounterAlias::new(
            Rc::new(CounterFormatter::new(NumeralStyle::RomanUpper)),
            Rc::clone(&shared),
        );
        shared.borrow_mut().step();
        assert_eq!(alias.step_and_format(), (2, "II".into()));
        assert_eq!(shared.borrow().value(), 2);
    }

    #[test]
    fn formatter_builds_from_declarative_config() {
        let cfg: CounterFormatterConfig = serde_json::from_str(
            r#"{
                "format_num": "arabic",
                "prefix_display": {"singular": "Eq. ", "plural": "Eqs. "},
                "delimiters": ["(", ")"],
                "join_spec": "compact",
                "subnums": [{"format_num": "alph"}],
                "id": "equation"
            }"#,
        )
        .unwrap();
        let f = cfg.build().unwrap();
        assert_eq!(f.id(), Some("equation"));
        assert_eq!(
            f.format_single(3, &[2], None, &FormatOptions::default()),
            "Eq. (3.b)"
        );
        assert_eq!(
            f.format_many(&[NumberGroup::from_numbers([1, 3])], &FormatOptions::default()),
            "Eqs. (1),(3)"
        );
    }
}
