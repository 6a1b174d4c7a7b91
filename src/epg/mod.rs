//! EPG id resolution
//!
//! Channels get their guide id (tvg-id) in two tiers:
//!
//! 1. the static per-provider table bundled with the crate, keyed by the
//!    folded channel name, plus a couple of substring heuristics;
//! 2. a name map built from the local XMLTV guide file, for channels the
//!    table does not know.
//!
//! Resolution is fill-if-missing: a tvg-id already present on a channel is
//! never overwritten.

pub mod xmltv;

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{SourceResult, StateError};
use crate::models::CanonicalChannel;
use crate::normalize::{epg_match_key, normalize_key};
use crate::sources::{SourceFetcher, decompress_to_string};

pub use xmltv::{NameMapCache, build_name_map};

const BUILTIN_IDS: &str = include_str!("../../assets/epg_ids.toml");

/// Which guide dialect a tvg-id belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EpgProvider {
    #[default]
    None,
    IptvOrg,
    Konyak,
}

impl EpgProvider {
    /// Lenient parse accepting the spellings found in old configs:
    /// "iptv-org", "IPTVORG", "konyakmeggy", and the numeric modes "0".."2".
    pub fn from_setting(value: &str) -> Self {
        let v = value.trim().to_lowercase().replace('-', "");
        match v.as_str() {
            "1" | "iptvorg" => EpgProvider::IptvOrg,
            "2" | "konyak" | "konyakmeggy" => EpgProvider::Konyak,
            _ => EpgProvider::None,
        }
    }

    /// Default guide feed for this provider.
    pub fn default_guide_url(&self) -> Option<&'static str> {
        match self {
            EpgProvider::IptvOrg => Some("https://iptv-epg.org/files/epg-hu.xml"),
            EpgProvider::Konyak => Some("http://konyakmeggy.nhely.hu/epg/konyakmeggy.xml.xz"),
            EpgProvider::None => None,
        }
    }
}

impl<'de> Deserialize<'de> for EpgProvider {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(EpgProvider::from_setting(&raw))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct IdEntry {
    display: String,
    #[serde(default)]
    iptvorg: Option<String>,
    #[serde(default)]
    konyak: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdFile {
    #[serde(default)]
    channels: HashMap<String, IdEntry>,
}

/// Static tier-1 id table: folded name -> per-provider guide ids.
#[derive(Debug, Clone)]
pub struct IdTable {
    entries: HashMap<String, IdEntry>,
}

impl IdTable {
    pub fn builtin() -> Self {
        Self::from_toml(BUILTIN_IDS).unwrap_or_else(|e| {
            warn!("builtin guide id table failed to parse: {e}");
            Self {
                entries: HashMap::new(),
            }
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        let file: IdFile = toml::from_str(text)?;
        Ok(Self {
            entries: file.channels,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Preferred on-screen spelling for a folded name, if listed.
    pub fn display_for(&self, norm_key: &str) -> Option<&str> {
        self.entries.get(norm_key).map(|e| e.display.as_str())
    }

    /// Table lookup plus fallback heuristics for common mangled spellings.
    pub fn lookup(&self, norm_key: &str, provider: EpgProvider) -> Option<&str> {
        if norm_key.is_empty() || provider == EpgProvider::None {
            return None;
        }
        if let Some(id) = self.entry_id(norm_key, provider) {
            return Some(id);
        }

        // Feed names glue extra junk onto some channels often enough that a
        // substring check pays for itself.
        if norm_key.contains("ARENA4") && !norm_key.contains("PLUS") {
            return self.entry_id("ARENA4", provider);
        }
        if matches!(norm_key, "RTLKLB" | "RTLK" | "RTLKLUB") {
            return self.entry_id("RTL", provider);
        }
        None
    }

    fn entry_id(&self, key: &str, provider: EpgProvider) -> Option<&str> {
        let entry = self.entries.get(key)?;
        let id = match provider {
            EpgProvider::IptvOrg => entry.iptvorg.as_deref(),
            EpgProvider::Konyak => entry.konyak.as_deref(),
            EpgProvider::None => None,
        };
        id.filter(|v| !v.is_empty())
    }
}

/// Two-tier resolver: static table first, local guide name map second.
pub struct EpgResolver {
    provider: EpgProvider,
    table: IdTable,
    name_map: NameMapCache,
}

impl EpgResolver {
    pub fn new(provider: EpgProvider, table: IdTable, guide_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            provider,
            table,
            name_map: NameMapCache::new(guide_path),
        }
    }

    pub fn provider(&self) -> EpgProvider {
        self.provider
    }

    pub fn table(&self) -> &IdTable {
        &self.table
    }

    /// Resolve a guide id for a channel, trying the internal id first and
    /// the display name second.
    pub fn resolve(&mut self, channel_id: &str, display_name: &str) -> Option<String> {
        if self.provider == EpgProvider::None {
            return None;
        }

        for candidate in [channel_id, display_name] {
            let norm = normalize_key(candidate);
            if let Some(id) = self.table.lookup(&norm, self.provider) {
                return Some(id.to_string());
            }
        }

        // Tier 2: the guide's own display-names.
        if display_name.is_empty() {
            return None;
        }
        let map = self.name_map.get();
        if map.is_empty() {
            return None;
        }
        let aggressive = normalize_key(display_name);
        if let Some(id) = map.get(&aggressive) {
            return Some(id.clone());
        }
        map.get(&epg_match_key(display_name)).cloned()
    }

    /// Fill missing `epg_id`s across a channel list. Existing ids stay.
    pub fn apply(&mut self, channels: &mut [CanonicalChannel]) {
        if self.provider == EpgProvider::None {
            return;
        }
        let mut filled = 0usize;
        for channel in channels.iter_mut() {
            if channel.epg_id.is_some() {
                continue;
            }
            let id = self.resolve(&channel.channel_id, &channel.display_name);
            if let Some(id) = id {
                channel.epg_id = Some(id);
                filled += 1;
            }
        }
        if filled > 0 {
            info!("filled {filled} guide ids from {:?} tables", self.provider);
        }
    }

    /// Invalidate the cached name map, e.g. after a guide refresh.
    pub fn invalidate_name_map(&mut self) {
        self.name_map.invalidate();
    }
}

/// Make sure a local guide file exists and is reasonably fresh.
///
/// Does nothing when the file on disk is younger than `max_age`. A fetch or
/// parse failure leaves any existing file in place; stale data beats no
/// data.
pub async fn refresh_guide(
    fetcher: &dyn SourceFetcher,
    provider: EpgProvider,
    guide_path: &Path,
    max_age: Duration,
) -> SourceResult<bool> {
    let Some(url) = provider.default_guide_url() else {
        return Ok(false);
    };

    if let Ok(meta) = std::fs::metadata(guide_path) {
        let fresh = meta.len() > 0
            && meta
                .modified()
                .ok()
                .and_then(|m| SystemTime::now().duration_since(m).ok())
                .is_some_and(|age| age < max_age);
        if fresh {
            debug!("guide file {} is fresh, skipping fetch", guide_path.display());
            return Ok(false);
        }
    }

    info!("refreshing guide from {url}");
    let payload = fetcher.fetch_bytes(url).await?;
    let xml = decompress_to_string(&payload)?;

    if !xmltv::looks_like_xmltv(&xml) {
        warn!("guide payload from {url} is not usable XMLTV, keeping old file");
        return Ok(false);
    }

    write_atomically(guide_path, xml.as_bytes()).map_err(|e| {
        crate::errors::SourceError::parse("guide-write", e.to_string())
    })?;
    info!("guide saved to {}", guide_path.display());
    Ok(true)
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StateError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| StateError::WriteFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StateError::WriteFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    use std::io::Write;
    tmp.write_all(bytes).map_err(|e| StateError::WriteFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    tmp.persist(path).map_err(|e| StateError::WriteFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(())
}
