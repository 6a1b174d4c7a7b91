//! Whitelist filtering and ordering
//!
//! The whitelist is the lineup: it decides which canonical channels survive
//! and in which order they are emitted. Lookup is by folded name, so any
//! spelling that converges on a listed channel passes; names the fold alone
//! cannot place are retried through their curated pretty name, and only
//! those fallback hits get re-spelled to the lineup's canonical form.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::epg::IdTable;
use crate::models::CanonicalChannel;
use crate::normalize::{AliasTable, normalize_key};

const BUILTIN_WHITELIST: &str = include_str!("../../assets/whitelist.toml");

/// Rank given to channels kept without a whitelist position.
const UNRANKED: u32 = 10_000;

#[derive(Debug, Deserialize)]
struct WhitelistFile {
    #[serde(default)]
    channels: Vec<String>,
    #[serde(default)]
    packages: HashMap<String, PackageEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct PackageEntry {
    #[serde(default)]
    #[allow(dead_code)]
    label: String,
    #[serde(default)]
    channels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Whitelist {
    /// folded name -> display position
    index: HashMap<String, u32>,
    /// folded name -> preferred on-screen spelling
    display_by_key: HashMap<String, String>,
    packages: HashMap<String, PackageEntry>,
}

impl Whitelist {
    pub fn builtin() -> Self {
        Self::from_toml(BUILTIN_WHITELIST).unwrap_or_else(|e| {
            warn!("builtin whitelist failed to parse: {e}");
            Self {
                index: HashMap::new(),
                display_by_key: HashMap::new(),
                packages: HashMap::new(),
            }
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        let file: WhitelistFile = toml::from_str(text)?;
        let mut index = HashMap::new();
        let mut display_by_key = HashMap::new();
        let mut position = 0u32;
        for name in &file.channels {
            let key = normalize_key(name);
            if key.is_empty() || index.contains_key(&key) {
                continue;
            }
            index.insert(key.clone(), position);
            display_by_key.insert(key, name.clone());
            position += 1;
        }
        Ok(Self {
            index,
            display_by_key,
            packages: file.packages,
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Display position for a folded name, if listed.
    pub fn position(&self, key: &str) -> Option<u32> {
        self.index.get(key).copied()
    }

    /// Preferred spelling for a folded name, if listed.
    pub fn display_for(&self, key: &str) -> Option<&str> {
        self.display_by_key.get(key).map(String::as_str)
    }

    /// Folded member keys of a named package, if it exists.
    pub fn package_keys(&self, package: &str) -> Option<HashSet<String>> {
        let pkg = self.packages.get(package.trim())?;
        Some(
            pkg.channels
                .iter()
                .map(|n| normalize_key(n))
                .filter(|k| !k.is_empty())
                .collect(),
        )
    }

    /// Filter and order a channel list.
    ///
    /// - `whitelist_only`: drop channels whose folded name is not listed.
    /// - `package`: additionally restrict to a named bundle; an unknown
    ///   package name disables the restriction rather than emptying the
    ///   output.
    ///
    /// Lookup is two-step: the folded display name first, then the folded
    /// curated pretty name (alias canonical or guide-table spelling).
    /// Channels matched through the fallback are re-keyed to the lineup's
    /// spelling so downstream EPG lookup sees the curated name; channels
    /// matched directly keep their first-seen name.
    ///
    /// Surviving channels are sorted by (position, display name) and get
    /// their `sort_order` rewritten to match.
    pub fn apply(
        &self,
        channels: Vec<CanonicalChannel>,
        whitelist_only: bool,
        package: Option<&str>,
        aliases: &AliasTable,
        ids: &IdTable,
    ) -> Vec<CanonicalChannel> {
        let package_keys = package.and_then(|p| {
            let keys = self.package_keys(p);
            if keys.is_none() {
                warn!("unknown channel package '{p}', ignoring package filter");
            }
            keys
        });

        let mut kept: Vec<(u32, CanonicalChannel)> = Vec::new();
        let mut dropped = 0usize;
        for mut channel in channels {
            let mut key = normalize_key(&channel.display_name);
            let mut position = self.position(&key);

            if position.is_none() {
                if let Some(fallback) = self.curated_key(&channel.display_name, &key, aliases, ids)
                {
                    if let Some(pos) = self.position(&fallback) {
                        if let Some(curated) = self.display_for(&fallback) {
                            debug!(
                                "re-keying '{}' to lineup spelling '{curated}'",
                                channel.display_name
                            );
                            channel.display_name = curated.to_string();
                            channel.channel_id = CanonicalChannel::make_id(curated);
                        }
                        position = Some(pos);
                        key = fallback;
                    }
                }
            }

            if let Some(pkg) = &package_keys {
                if !pkg.contains(&key) {
                    dropped += 1;
                    continue;
                }
            }
            match position {
                Some(pos) => kept.push((pos, channel)),
                None if whitelist_only => {
                    debug!("dropping unlisted channel '{}'", channel.display_name);
                    dropped += 1;
                }
                None => kept.push((UNRANKED, channel)),
            }
        }
        if dropped > 0 {
            debug!("whitelist dropped {dropped} channels");
        }

        kept.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.display_name.cmp(&b.1.display_name))
        });
        kept.into_iter()
            .enumerate()
            .map(|(i, (_, mut ch))| {
                ch.sort_order = i as u32;
                ch
            })
            .collect()
    }

    /// Folded curated pretty name for a channel the direct fold missed:
    /// the alias table's canonical spelling, or the guide table's display.
    fn curated_key(
        &self,
        display_name: &str,
        key: &str,
        aliases: &AliasTable,
        ids: &IdTable,
    ) -> Option<String> {
        let pretty = aliases
            .resolve(display_name)
            .or_else(|| ids.display_for(key))?;
        let folded = normalize_key(pretty);
        (!folded.is_empty()).then_some(folded)
    }
}
