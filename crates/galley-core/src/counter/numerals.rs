/*
 * counter/numerals.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Numeral styles for counter formatting.
 */

//! Numeral styles.
//!
//! A [`NumeralStyle`] turns a counter value into display text: arabic
//! digits, alphabetic and roman numerals, footnote symbols, unicode
//! super/subscript digits, custom digit alphabets, and two template forms
//! (`${roman}` dollar templates and tag templates such as `(a)` where the
//! first of `a A i I 1` selects the style and surrounding characters are
//! literal).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::{GalleyError, Result};

/// a, b, ..., z, aa, bb, ..., zz, aaa, ...
pub fn alpha_counter(n: i32, upper: bool) -> String {
    if n < 1 {
        return String::new();
    }
    let n = n - 1;
    let width = 1 + (n / 26) as usize;
    let letter = (if upper { b'A' } else { b'a' } + (n % 26) as u8) as char;
    letter.to_string().repeat(width)
}

const ROMAN_CHARS: &[(i32, &str)] = &[
    (1000, "M"),
    (900, "CM"),
    (500, "D"),
    (400, "CD"),
    (100, "C"),
    (90, "XC"),
    (50, "L"),
    (40, "XL"),
    (10, "X"),
    (9, "IX"),
    (5, "V"),
    (4, "IV"),
    (1, "I"),
];

pub fn roman_counter(n: i32, upper: bool) -> String {
    if n <= 0 {
        return String::new();
    }
    let mut n = n;
    let mut s = String::new();
    for &(value, sym) in ROMAN_CHARS {
        while n >= value {
            s.push_str(sym);
            n -= value;
        }
    }
    if upper { s } else { s.to_lowercase() }
}

const FN_SYMBOLS: &[&str] = &["*", "†", "‡", "§", "¶", "‖"];

/// *, †, ..., ‖, **, ††, ... ..., with the symbol doubling each cycle.
pub fn fnsymbol_counter(n: i32) -> String {
    if n < 1 {
        return String::new();
    }
    let n = n - 1;
    let count = FN_SYMBOLS.len() as i32;
    let width = 1 + (n / count) as usize;
    FN_SYMBOLS[(n % count) as usize].repeat(width)
}

/// Positional representation of `n` in the given digit alphabet.
pub fn custom_digits_counter(n: i32, digits: &[char]) -> String {
    if n <= 0 || digits.is_empty() {
        return String::new();
    }
    let base = digits.len() as i32;
    let mut n = n;
    let mut s = Vec::new();
    while n > 0 {
        s.push(digits[(n % base) as usize]);
        n /= base;
    }
    s.into_iter().rev().collect()
}

const SUPERSCRIPT_DIGITS: [char; 10] =
    ['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];
const SUBSCRIPT_DIGITS: [char; 10] =
    ['₀', '₁', '₂', '₃', '₄', '₅', '₆', '₇', '₈', '₉'];

pub fn unicode_superscript_counter(n: i32) -> String {
    custom_digits_counter(n, &SUPERSCRIPT_DIGITS)
}

pub fn unicode_subscript_counter(n: i32) -> String {
    custom_digits_counter(n, &SUBSCRIPT_DIGITS)
}

static RX_DOLLAR_TEMPLATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([a-zA-Z0-9_.]+)\}").unwrap());

/// How a numeric counter value is turned into display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumeralStyle {
    Arabic,
    AlphLower,
    AlphUpper,
    RomanLower,
    RomanUpper,
    FnSymbol,
    UnicodeSuperscript,
    UnicodeSubscript,
    /// A template where each `${style}` is substituted with the named
    /// style's rendering of the value, e.g. `"${Roman}"` or `"no. ${arabic}"`.
    Template(String),
    /// A tag template: the first occurrence of one of `a A i I 1` selects
    /// the numeral style, surrounding characters are literal (e.g. `"(a)"`).
    /// A template with no such initial is a constant tag (e.g. a bullet).
    Tag(String),
}

impl NumeralStyle {
    /// Look up one of the standard style names (`arabic`, `alph`, `Alph`,
    /// `roman`, `Roman`, `fnsymbol`, `unicodesuperscript`,
    /// `unicodesubscript`).
    pub fn named(name: &str) -> Option<Self> {
        match name {
            "arabic" => Some(Self::Arabic),
            "alph" => Some(Self::AlphLower),
            "Alph" => Some(Self::AlphUpper),
            "roman" => Some(Self::RomanLower),
            "Roman" => Some(Self::RomanUpper),
            "fnsymbol" => Some(Self::FnSymbol),
            "unicodesuperscript" => Some(Self::UnicodeSuperscript),
            "unicodesubscript" => Some(Self::UnicodeSubscript),
            _ => None,
        }
    }

    /// Parse a configuration string: a standard style name, else a tag
    /// template.
    pub fn parse(spec: &str) -> Self {
        Self::named(spec).unwrap_or_else(|| Self::Tag(spec.to_owned()))
    }

    pub fn format(&self, n: i32) -> String {
        match self {
            Self::Arabic => n.to_string(),
            Self::AlphLower => alpha_counter(n, false),
            Self::AlphUpper => alpha_counter(n, true),
            Self::RomanLower => roman_counter(n, false),
            Self::RomanUpper => roman_counter(n, true),
            Self::FnSymbol => fnsymbol_counter(n),
            Self::UnicodeSuperscript => unicode_superscript_counter(n),
            Self::UnicodeSubscript => unicode_subscript_counter(n),
            Self::Template(template) => RX_DOLLAR_TEMPLATE
                .replace_all(template, |caps: &regex::Captures<'_>| {
                    match Self::named(&caps[1]) {
                        Some(style) => style.format(n),
                        None => caps[0].to_owned(),
                    }
                })
                .into_owned(),
            Self::Tag(template) => format_tag_template(template, n),
        }
    }
}

/// The initials recognized in tag templates, with the style each selects.
fn tag_initial_style(c: char) -> Option<NumeralStyle> {
    match c {
        'a' => Some(NumeralStyle::AlphLower),
        'A' => Some(NumeralStyle::AlphUpper),
        'i' => Some(NumeralStyle::RomanLower),
        'I' => Some(NumeralStyle::RomanUpper),
        '1' => Some(NumeralStyle::Arabic),
        _ => None,
    }
}

fn format_tag_template(template: &str, n: i32) -> String {
    for (pos, c) in template.char_indices() {
        if let Some(style) = tag_initial_style(c) {
            let mut s = String::new();
            s.push_str(&template[..pos]);
            s.push_str(&style.format(n));
            s.push_str(&template[pos + c.len_utf8()..]);
            return s;
        }
    }
    // no counter initial, e.g. a bullet symbol
    template.to_owned()
}

/// Declarative numeral-style configuration: either a style name / tag
/// template string, or `{ "template": "${...}" }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumeralStyleConfig {
    Named(String),
    Template { template: String },
}

impl NumeralStyleConfig {
    pub fn build(&self) -> Result<NumeralStyle> {
        match self {
            Self::Named(name) => Ok(NumeralStyle::parse(name)),
            Self::Template { template } => {
                if !RX_DOLLAR_TEMPLATE.is_match(template) {
                    return Err(GalleyError::render(format!(
                        "invalid counter template ‘{template}’: no ${{style}} substitution"
                    )));
                }
                Ok(NumeralStyle::Template(template.clone()))
            }
        }
    }
}
