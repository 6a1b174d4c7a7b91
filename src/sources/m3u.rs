//! M3U playlist parsing
//!
//! Tolerant line-oriented parser for the M3U dialect IPTV lists actually
//! use: `#EXTINF` info lines with `key="value"` attributes, player property
//! lines (`#EXTVLCOPT:` / `#KODIPROP:`) between the info line and its URL,
//! and bare URL lines with no metadata at all. Parsing is best effort; a
//! malformed line is logged and skipped, never fatal for the document.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::models::RawEntry;

const PROPERTY_PREFIXES: &[&str] = &["#EXTVLCOPT:", "#KODIPROP:"];

/// Parse a playlist document into raw entries, in document order.
///
/// Duplicate entries (same URL and name) are dropped, keeping the first.
pub fn parse_playlist(content: &str, source_name: &str) -> Vec<RawEntry> {
    let mut entries = Vec::new();
    let mut pending: Option<PendingEntry> = None;
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut duplicates = 0usize;

    for (line_num, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXTINF:") {
            match parse_extinf(rest) {
                Some(entry) => pending = Some(entry),
                None => {
                    warn!(
                        "malformed EXTINF at line {} in '{source_name}', skipping",
                        line_num + 1
                    );
                    pending = None;
                }
            }
        } else if PROPERTY_PREFIXES.iter().any(|p| line.starts_with(p)) {
            if let Some(entry) = pending.as_mut() {
                entry.properties.push(line.to_string());
            }
        } else if line.starts_with('#') {
            // Header or unknown directive
            continue;
        } else {
            let entry = match pending.take() {
                Some(p) => p.into_entry(line),
                None => {
                    debug!(
                        "bare URL at line {} in '{source_name}', deriving name",
                        line_num + 1
                    );
                    RawEntry::bare(line)
                }
            };
            let key = (entry.url.clone(), entry.name.clone());
            if seen.insert(key) {
                entries.push(entry);
            } else {
                duplicates += 1;
            }
        }
    }

    if duplicates > 0 {
        info!("dropped {duplicates} duplicate entries from '{source_name}'");
    }
    info!("parsed {} entries from '{source_name}'", entries.len());
    entries
}

struct PendingEntry {
    name: String,
    tvg_id: Option<String>,
    tvg_name: Option<String>,
    tvg_logo: Option<String>,
    group_title: Option<String>,
    extra: HashMap<String, String>,
    properties: Vec<String>,
}

impl PendingEntry {
    fn into_entry(self, url: &str) -> RawEntry {
        RawEntry {
            name: self.name,
            url: url.to_string(),
            tvg_id: self.tvg_id,
            tvg_name: self.tvg_name,
            tvg_logo: self.tvg_logo,
            group_title: self.group_title,
            extra: self.extra,
            properties: self.properties,
        }
    }
}

/// Parse the body of an `#EXTINF:` line (duration and attributes, then a
/// comma, then the display title).
fn parse_extinf(rest: &str) -> Option<PendingEntry> {
    // The title follows the last comma; attribute values may contain commas
    // inside quotes, so scan outside quotes only.
    let comma = find_title_comma(rest)?;
    let (head, title) = rest.split_at(comma);
    let title = title.trim_start_matches(',').trim();

    let mut attributes = parse_attributes(head);
    let name = if title.is_empty() {
        attributes.get("tvg-name").cloned().unwrap_or_default()
    } else {
        title.to_string()
    };
    if name.is_empty() {
        return None;
    }

    Some(PendingEntry {
        name,
        tvg_id: attributes.remove("tvg-id").filter(|v| !v.is_empty()),
        tvg_name: attributes.remove("tvg-name").filter(|v| !v.is_empty()),
        tvg_logo: attributes.remove("tvg-logo").filter(|v| !v.is_empty()),
        group_title: attributes.remove("group-title").filter(|v| !v.is_empty()),
        extra: attributes,
        properties: Vec::new(),
    })
}

fn find_title_comma(s: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut last = None;
    for (i, ch) in s.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => last = Some(i),
            _ => {}
        }
    }
    last
}

/// Parse `key="value"` (and unquoted `key=value`) pairs from the attribute
/// section of an info line. Regex-free state machine.
fn parse_attributes(attrs_part: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    let mut chars = attrs_part.chars().peekable();
    let mut current_key = String::new();
    let mut current_value = String::new();
    let mut in_quotes = false;
    let mut in_key = false;
    let mut in_value = false;

    while let Some(ch) = chars.next() {
        match ch {
            ' ' | '\t' if !in_quotes => {
                if in_value {
                    if !current_key.is_empty() && !current_value.is_empty() {
                        attributes.insert(current_key.clone(), current_value.clone());
                    }
                    current_key.clear();
                    current_value.clear();
                    in_value = false;
                }
                in_key = true;
            }
            '=' if !in_quotes && in_key => {
                in_key = false;
                in_value = true;
                if chars.peek() == Some(&'"') {
                    chars.next();
                    in_quotes = true;
                }
            }
            '"' if in_value => {
                in_quotes = false;
                if !current_key.is_empty() {
                    attributes.insert(current_key.clone(), current_value.clone());
                }
                current_key.clear();
                current_value.clear();
                in_value = false;
            }
            _ => {
                if in_key {
                    current_key.push(ch);
                } else if in_value {
                    current_value.push(ch);
                }
            }
        }
    }

    if in_value && !current_key.is_empty() && !current_value.is_empty() {
        attributes.insert(current_key, current_value);
    }

    attributes
}
