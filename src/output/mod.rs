//! M3U output
//!
//! Renders a finished catalog back into playlist text that the parser in
//! [`crate::sources`] round-trips. Two shapes are produced: one line per
//! channel using its selected variant, and a flat debug list carrying every
//! variant as its own entry.

use std::path::Path;

use tracing::{debug, info};

use crate::errors::{AppResult, StateError};
use crate::models::{CanonicalChannel, SelectionState};
use crate::selection::{FavouriteSet, rank_variants};

const HEADER: &str = "#EXTM3U";

/// One entry per channel, resolving the stream through the persisted
/// selection state the same way playback does: the remembered rank when one
/// is stored and still valid, the best-ranked variant otherwise.
pub fn direct_m3u(
    channels: &[CanonicalChannel],
    state: &SelectionState,
    prefer_quality: bool,
) -> String {
    let mut out = vec![HEADER.to_string()];
    for channel in channels {
        let ranked = rank_variants(&channel.variants, prefer_quality);
        if ranked.is_empty() {
            debug!("channel '{}' has no variants, skipping", channel.display_name);
            continue;
        }
        let index = state
            .indices
            .get(&channel.channel_id)
            .copied()
            .filter(|&i| i < ranked.len())
            .unwrap_or(0);
        let variant = ranked[index];
        push_entry(
            &mut out,
            &channel.display_name,
            channel.epg_id.as_deref(),
            variant.group_title.as_deref().or(channel.group_title.as_deref()),
            variant.tvg_logo.as_deref().or(channel.logo.as_deref()),
            &variant.properties,
            &variant.url,
        );
    }
    info!("rendered {} playlist lines", out.len());
    join_lines(out)
}

/// Every variant as its own entry, named `"Channel (1)"`, `"Channel (2)"`
/// and so on in variant order. Meant for external players and debugging.
pub fn all_variants_m3u(channels: &[CanonicalChannel]) -> String {
    let mut out = vec![HEADER.to_string()];
    for channel in channels {
        for (idx, variant) in channel.variants.iter().enumerate() {
            let name = format!("{} ({})", channel.display_name, idx + 1);
            push_entry(
                &mut out,
                &name,
                variant.tvg_id.as_deref().or(channel.epg_id.as_deref()),
                variant.group_title.as_deref().or(channel.group_title.as_deref()),
                variant.tvg_logo.as_deref().or(channel.logo.as_deref()),
                &variant.properties,
                &variant.url,
            );
        }
    }
    join_lines(out)
}

/// Keep only starred channels, preserving catalog order.
pub fn filter_favourites(
    channels: Vec<CanonicalChannel>,
    favourites: &FavouriteSet,
) -> Vec<CanonicalChannel> {
    channels
        .into_iter()
        .filter(|c| favourites.contains(&c.channel_id))
        .collect()
}

/// Write playlist text, creating parent directories as needed. The write is
/// atomic so a consumer never sees a half-written playlist.
pub fn write_m3u_file(path: &Path, content: &str) -> AppResult<()> {
    use std::io::Write;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| StateError::WriteFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StateError::WriteFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| StateError::WriteFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    tmp.persist(path).map_err(|e| StateError::WriteFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    info!("wrote playlist to {}", path.display());
    Ok(())
}

fn push_entry(
    out: &mut Vec<String>,
    name: &str,
    tvg_id: Option<&str>,
    group_title: Option<&str>,
    logo: Option<&str>,
    properties: &[String],
    url: &str,
) {
    out.push(extinf_line(name, tvg_id, group_title, logo));
    for prop in properties {
        out.push(prop.clone());
    }
    out.push(url.to_string());
}

fn extinf_line(
    name: &str,
    tvg_id: Option<&str>,
    group_title: Option<&str>,
    logo: Option<&str>,
) -> String {
    let mut line = String::from("#EXTINF:-1");
    push_attr(&mut line, "tvg-id", tvg_id);
    push_attr(&mut line, "tvg-name", Some(name));
    push_attr(&mut line, "group-title", group_title);
    push_attr(&mut line, "tvg-logo", logo);
    line.push(',');
    line.push_str(name);
    line
}

fn push_attr(line: &mut String, key: &str, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
        // A literal quote would break the quoting on re-read.
        let value = value.replace('"', "");
        line.push(' ');
        line.push_str(key);
        line.push_str("=\"");
        line.push_str(&value);
        line.push('"');
    }
}

fn join_lines(lines: Vec<String>) -> String {
    let mut body = lines.join("\n");
    body.push('\n');
    body
}
