//! Data models for the catalog pipeline
//!
//! Records flow one way: raw playlist text becomes [`RawEntry`] values, the
//! aggregator folds those into [`CanonicalChannel`] groups, and the selection
//! engine consumes the finished catalog together with [`SelectionState`].
//! All known metadata fields are typed; only genuinely unknown playlist
//! attributes are kept in an open map.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One parsed playlist entry, before identity resolution.
///
/// Ephemeral: produced per URL line by the parser and consumed immediately
/// by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Display name from the info line (or derived from the URL)
    pub name: String,
    /// Stream URL that closed the entry
    pub url: String,
    pub tvg_id: Option<String>,
    pub tvg_name: Option<String>,
    pub tvg_logo: Option<String>,
    pub group_title: Option<String>,
    /// Unknown info-line attributes, preserved verbatim
    pub extra: HashMap<String, String>,
    /// Property lines attached to the entry (player hints etc.), verbatim
    pub properties: Vec<String>,
}

impl RawEntry {
    /// Minimal entry for a bare URL line with no preceding info line.
    pub fn bare(url: &str) -> Self {
        let name = url
            .split('/')
            .next_back()
            .unwrap_or(url)
            .split('?')
            .next()
            .unwrap_or(url)
            .to_string();
        RawEntry {
            name,
            url: url.to_string(),
            tvg_id: None,
            tvg_name: None,
            tvg_logo: None,
            group_title: None,
            extra: HashMap::new(),
            properties: Vec::new(),
        }
    }
}

/// One playable stream for a channel.
///
/// Owned exclusively by its parent [`CanonicalChannel`]; variants keep the
/// metadata of the source entry they came from so per-variant player hints
/// survive aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvg_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvg_logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<String>,
}

impl Variant {
    pub fn from_entry(entry: &RawEntry) -> Self {
        Variant {
            url: entry.url.clone(),
            tvg_id: entry.tvg_id.clone(),
            tvg_logo: entry.tvg_logo.clone(),
            group_title: entry.group_title.clone(),
            properties: entry.properties.clone(),
        }
    }
}

/// One logical TV channel after identity resolution.
///
/// Invariants:
/// - `variants` is never empty (zero-variant groups are dropped upstream)
/// - `channel_id` is a pure function of `display_name` (trimmed, lower-cased)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalChannel {
    pub channel_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    /// EPG identifier (tvg-id); fill-if-missing, never overwritten
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epg_id: Option<String>,
    pub variants: Vec<Variant>,
    /// Stable display position assigned by the whitelist orderer
    #[serde(default)]
    pub sort_order: u32,
}

impl CanonicalChannel {
    /// Derive the stable channel id from a display name.
    pub fn make_id(display_name: &str) -> String {
        display_name.trim().to_lowercase()
    }
}

/// The finished catalog: ordered canonical channels plus rebuild bookkeeping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub channels: Vec<CanonicalChannel>,
    /// Epoch seconds of the last successful rebuild, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success: Option<f64>,
}

impl Catalog {
    pub fn find(&self, channel_id: &str) -> Option<&CanonicalChannel> {
        self.channels.iter().find(|c| c.channel_id == channel_id)
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Persisted per-channel variant selection, shared by automatic and manual
/// playback modes.
///
/// The on-disk document is `{ "indices": {...}, "meta": {...} }`; an older
/// flat `{channel_id: index}` layout is still accepted on read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionState {
    #[serde(default)]
    pub indices: HashMap<String, usize>,
    #[serde(default)]
    pub meta: SelectionMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionMeta {
    #[serde(default)]
    pub last_channel: Option<String>,
    /// Epoch seconds of the last choose-URL call
    #[serde(default)]
    pub last_time: f64,
}
