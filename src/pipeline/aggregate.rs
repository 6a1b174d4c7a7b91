//! Entry aggregation
//!
//! Folds raw playlist entries into canonical channels. Entries whose names
//! converge on the same folded key become one channel with several variants;
//! channel-level metadata is first-wins, variant order is encounter order
//! across all sources. The first encountered name of a group stays its
//! display name; curated re-spelling is the whitelist stage's job, and only
//! for channels it matches through the fallback path.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::models::{CanonicalChannel, RawEntry, Variant};
use crate::normalize::{AliasTable, canonical_key};

pub struct Aggregator<'a> {
    aliases: &'a AliasTable,
}

impl<'a> Aggregator<'a> {
    pub fn new(aliases: &'a AliasTable) -> Self {
        Self { aliases }
    }

    /// Group entries into canonical channels, preserving first-seen order.
    pub fn aggregate(&self, entries: &[RawEntry]) -> Vec<CanonicalChannel> {
        let mut by_key: HashMap<String, usize> = HashMap::new();
        let mut channels: Vec<CanonicalChannel> = Vec::new();

        for entry in entries {
            let raw_name = if entry.name.trim().is_empty() {
                entry.tvg_name.as_deref().unwrap_or("")
            } else {
                entry.name.as_str()
            };
            let key = canonical_key(raw_name, self.aliases);
            if key.is_empty() {
                debug!("skipping unnameable entry for url {}", entry.url);
                continue;
            }

            match by_key.get(&key) {
                Some(&idx) => self.merge_into(&mut channels[idx], entry),
                None => {
                    // first-seen name wins for the whole group
                    let display = raw_name.trim().to_string();
                    let channel = CanonicalChannel {
                        channel_id: CanonicalChannel::make_id(&display),
                        display_name: display,
                        group_title: entry.group_title.clone(),
                        logo: entry.tvg_logo.clone(),
                        epg_id: entry.tvg_id.clone(),
                        variants: vec![Variant::from_entry(entry)],
                        sort_order: 0,
                    };
                    by_key.insert(key, channels.len());
                    channels.push(channel);
                }
            }
        }

        info!(
            "aggregated {} entries into {} channels",
            entries.len(),
            channels.len()
        );
        channels
    }

    fn merge_into(&self, channel: &mut CanonicalChannel, entry: &RawEntry) {
        // Same URL from two lists adds nothing.
        if channel.variants.iter().any(|v| v.url == entry.url) {
            debug!(
                "duplicate variant url for '{}': {}",
                channel.display_name, entry.url
            );
            return;
        }
        channel.variants.push(Variant::from_entry(entry));

        // first-wins metadata, fill only what is still missing
        if channel.group_title.is_none() {
            channel.group_title = entry.group_title.clone();
        }
        if channel.logo.is_none() {
            channel.logo = entry.tvg_logo.clone();
        }
        if channel.epg_id.is_none() {
            channel.epg_id = entry.tvg_id.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, url: &str) -> RawEntry {
        RawEntry {
            name: name.to_string(),
            url: url.to_string(),
            tvg_id: None,
            tvg_name: None,
            tvg_logo: None,
            group_title: None,
            extra: HashMap::new(),
            properties: Vec::new(),
        }
    }

    #[test]
    fn spelling_variants_become_one_channel_under_the_first_name() {
        let aliases = AliasTable::builtin();
        let agg = Aggregator::new(&aliases);
        let entries = vec![
            entry("RTL Kettő", "http://a/rtl2.m3u8"),
            entry("RTL II HD", "http://b/rtl2.m3u8"),
            entry("RTL 2", "http://c/rtl2.m3u8"),
        ];
        let channels = agg.aggregate(&entries);
        assert_eq!(channels.len(), 1);
        // the first encountered spelling names the group
        assert_eq!(channels[0].display_name, "RTL Kettő");
        assert_eq!(channels[0].channel_id, "rtl kettő");
        assert_eq!(channels[0].variants.len(), 3);
        // encounter order preserved
        assert_eq!(channels[0].variants[0].url, "http://a/rtl2.m3u8");
        assert_eq!(channels[0].variants[2].url, "http://c/rtl2.m3u8");
    }

    #[test]
    fn metadata_is_first_wins() {
        let aliases = AliasTable::builtin();
        let agg = Aggregator::new(&aliases);
        let mut first = entry("Duna", "http://a/duna.m3u8");
        first.tvg_id = Some("DUNA.hu".into());
        let mut second = entry("Duna TV", "http://b/duna.m3u8");
        second.tvg_id = Some("OTHER.hu".into());
        second.tvg_logo = Some("http://logos/duna.png".into());

        let channels = agg.aggregate(&[first, second]);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].epg_id.as_deref(), Some("DUNA.hu"));
        // missing field filled from the later entry
        assert_eq!(channels[0].logo.as_deref(), Some("http://logos/duna.png"));
    }

    #[test]
    fn duplicate_urls_collapse() {
        let aliases = AliasTable::builtin();
        let agg = Aggregator::new(&aliases);
        let entries = vec![
            entry("RTL", "http://a/rtl.m3u8"),
            entry("RTL Klub", "http://a/rtl.m3u8"),
        ];
        let channels = agg.aggregate(&entries);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].variants.len(), 1);
    }

    #[test]
    fn unknown_channel_keeps_raw_name() {
        let aliases = AliasTable::builtin();
        let agg = Aggregator::new(&aliases);
        let channels = agg.aggregate(&[entry("Obscure Local TV", "http://x/o.m3u8")]);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].display_name, "Obscure Local TV");
    }

    #[test]
    fn first_seen_order_is_channel_order() {
        let aliases = AliasTable::builtin();
        let agg = Aggregator::new(&aliases);
        let channels = agg.aggregate(&[
            entry("HBO", "http://x/hbo.m3u8"),
            entry("RTL", "http://x/rtl.m3u8"),
            entry("HBO HD", "http://y/hbo.m3u8"),
        ]);
        let names: Vec<_> = channels.iter().map(|c| c.display_name.as_str()).collect();
        assert_eq!(names, vec!["HBO", "RTL"]);
    }
}
