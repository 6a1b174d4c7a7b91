//! Channel-name identity normalization
//!
//! Collapses the many spellings of the same channel ("RTL Kettő", "RTL II",
//! "RTL 2") into one matching key. The fold is implemented as an ordered list
//! of pure transformation steps so each rule is independently unit-testable;
//! the order is load-bearing (later rules assume earlier ones already ran).
//!
//! Two entry points matter to callers:
//! - [`normalize_key`] runs the full aggressive fold and is the grouping key
//!   used by the aggregator, whitelist and the tier-1 EPG tables.
//! - [`canonical_key`] consults the alias table first and, on a hit, folds
//!   the canonical spelling instead of the raw input, so every listed surface
//!   form lands on the same key.

pub mod alias;

use std::sync::LazyLock;

use deunicode::deunicode;
use regex::Regex;

pub use alias::AliasTable;

static COLOR_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[/?COLOR[^\]]*\]").expect("static regex"));
static NUMERAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(III|II|IV|VII|EGY|KETTO|HAROM|NEGY|OT|HAT|HET)\b").expect("static regex")
});
static DOMAIN_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\.PORT\.HU|\.HU)\s*$").expect("static regex"));
static TRAILING_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+(TV|CSATORNA)$").expect("static regex"));
static LETTER_DIGIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\D)\s+(\d)").expect("static regex"));
static QUALITY_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(FHD|UHD|HD|SD|4K|8K)$").expect("static regex"));

/// One named, pure normalization rule.
pub struct NormStep {
    pub name: &'static str,
    apply: fn(&str) -> String,
}

impl NormStep {
    pub fn run(&self, input: &str) -> String {
        (self.apply)(input)
    }
}

/// The fold pipeline, in the order it must run.
pub const KEY_STEPS: &[NormStep] = &[
    NormStep {
        name: "strip-markup",
        apply: strip_markup,
    },
    NormStep {
        name: "fold-accents",
        apply: fold_accents,
    },
    NormStep {
        name: "uppercase",
        apply: |s| s.to_uppercase(),
    },
    NormStep {
        name: "drop-bracket-spans",
        apply: drop_bracket_spans,
    },
    NormStep {
        name: "numerals-to-digits",
        apply: numerals_to_digits,
    },
    NormStep {
        name: "plus-to-word",
        apply: |s| s.replace('+', "PLUS"),
    },
    NormStep {
        name: "drop-suffixes",
        apply: drop_suffixes,
    },
    NormStep {
        name: "join-letter-digit",
        apply: |s| LETTER_DIGIT_RE.replace_all(s, "${1}${2}").into_owned(),
    },
    NormStep {
        name: "alphanumeric-only",
        apply: |s| s.chars().filter(|c| c.is_ascii_alphanumeric()).collect(),
    },
    NormStep {
        name: "drop-quality-suffix",
        apply: |s| QUALITY_SUFFIX_RE.replace(s, "").into_owned(),
    },
];

/// Full aggressive fold: display name -> matching key.
///
/// Pure and total; never fails, at worst returns an empty string.
pub fn normalize_key(raw: &str) -> String {
    KEY_STEPS
        .iter()
        .fold(raw.trim().to_string(), |acc, step| step.run(&acc))
}

/// Alias-aware fold: resolve through the alias table first, then normalize.
///
/// On an alias hit the canonical surface form is normalized instead of the
/// raw input, guaranteeing a single key regardless of which table entry
/// fired. A miss falls through to [`normalize_key`] on the raw name, which
/// still catches many unlisted variants.
pub fn canonical_key(raw: &str, aliases: &AliasTable) -> String {
    match aliases.resolve(raw) {
        Some(canonical) => normalize_key(canonical),
        None => normalize_key(raw),
    }
}

/// Milder fold used when matching against EPG display-names: accent fold,
/// upper-case, domain/trailing-TV strip, alphanumeric-only. No numeral or
/// bracket handling, to stay compatible with how guide providers spell names.
pub fn epg_match_key(raw: &str) -> String {
    let s = fold_accents(raw).to_uppercase();
    let s = DOMAIN_SUFFIX_RE.replace(&s, "").into_owned();
    let s = TRAILING_WORD_RE.replace(&s, "").into_owned();
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Pre-clean used by the alias resolver: markup strip, accent fold,
/// upper-case, every non-alphanumeric run replaced by one space.
pub fn clean_for_alias(raw: &str) -> String {
    let s = strip_markup(raw);
    let s = fold_accents(&s).to_uppercase();
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        } else {
            pending_space = true;
        }
    }
    out
}

fn strip_markup(s: &str) -> String {
    COLOR_TAG_RE.replace_all(s, "").into_owned()
}

fn fold_accents(s: &str) -> String {
    deunicode(s)
}

/// Remove balanced `(...)` / `[...]` spans entirely, depth-tracked so nested
/// brackets don't leak content. Unbalanced closers are dropped.
fn drop_bracket_spans(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    for ch in s.chars() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out
}

fn numerals_to_digits(s: &str) -> String {
    NUMERAL_RE
        .replace_all(s, |caps: &regex::Captures| {
            match caps.get(1).map(|m| m.as_str()).unwrap_or("") {
                "EGY" => "1",
                "II" | "KETTO" => "2",
                "III" | "HAROM" => "3",
                "IV" | "NEGY" => "4",
                "OT" => "5",
                "HAT" => "6",
                "VII" | "HET" => "7",
                other => other,
            }
            .to_string()
        })
        .into_owned()
}

fn drop_suffixes(s: &str) -> String {
    let s = DOMAIN_SUFFIX_RE.replace(s, "").into_owned();
    TRAILING_WORD_RE.replace(&s, "").into_owned()
}
