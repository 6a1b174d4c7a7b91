//! XMLTV channel-name extraction
//!
//! Only the `<channel>` elements matter here: each carries an id and one or
//! more `<display-name>` children. Programme data is passed through to the
//! player untouched, so it is never parsed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, warn};

use crate::errors::{SourceError, SourceResult};
use crate::normalize::{epg_match_key, normalize_key};

/// Build a `folded display-name -> guide channel id` map from an XMLTV
/// document.
///
/// Every display-name is indexed under two keys: the mild fold (the form
/// guide providers actually use) and the aggressive fold (so a playlist-side
/// key can hit directly). First id wins on key collision.
pub fn build_name_map(xml: &str) -> SourceResult<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut map = HashMap::new();
    let mut current_id: Option<String> = None;
    let mut in_display_name = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"channel" => {
                    current_id = e
                        .try_get_attribute("id")
                        .map_err(|err| SourceError::parse("xmltv", err.to_string()))?
                        .and_then(|a| a.unescape_value().ok())
                        .map(|v| v.into_owned())
                        .filter(|v| !v.is_empty());
                }
                b"display-name" if current_id.is_some() => in_display_name = true,
                _ => {}
            },
            Ok(Event::Text(t)) if in_display_name => {
                if let (Some(id), Ok(text)) = (current_id.as_ref(), t.unescape()) {
                    insert_keys(&mut map, text.trim(), id);
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"display-name" => in_display_name = false,
                b"channel" => current_id = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(SourceError::parse("xmltv", e.to_string())),
            _ => {}
        }
    }

    Ok(map)
}

fn insert_keys(map: &mut HashMap<String, String>, display_name: &str, id: &str) {
    if display_name.is_empty() {
        return;
    }
    let mild = epg_match_key(display_name);
    if !mild.is_empty() {
        map.entry(mild).or_insert_with(|| id.to_string());
    }
    let aggressive = normalize_key(display_name);
    if !aggressive.is_empty() {
        map.entry(aggressive).or_insert_with(|| id.to_string());
    }
}

/// Quick sanity check that a payload is an XMLTV document worth keeping.
pub fn looks_like_xmltv(xml: &str) -> bool {
    build_name_map(xml).map(|m| !m.is_empty()).unwrap_or(false)
}

/// How the cache learns the guide file's mtime. Injectable so staleness
/// behavior is testable without racing the filesystem clock.
pub type StatFn = Box<dyn Fn(&Path) -> Option<SystemTime> + Send + Sync>;

/// Name map keyed on the guide file's mtime.
///
/// Parsing a multi-megabyte guide per channel lookup would dominate a
/// rebuild, so the map is built once and reused until the file on disk
/// changes. A missing or unreadable file yields an empty map, never an
/// error.
pub struct NameMapCache {
    path: PathBuf,
    map: HashMap<String, String>,
    mtime: Option<SystemTime>,
    stat: StatFn,
}

impl NameMapCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_stat(
            path,
            Box::new(|p| std::fs::metadata(p).and_then(|m| m.modified()).ok()),
        )
    }

    pub fn with_stat(path: impl Into<PathBuf>, stat: StatFn) -> Self {
        Self {
            path: path.into(),
            map: HashMap::new(),
            mtime: None,
            stat,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop the cached map; the next lookup re-reads the file.
    pub fn invalidate(&mut self) {
        self.map.clear();
        self.mtime = None;
    }

    /// Current name map, reloading from disk only when the file changed.
    pub fn get(&mut self) -> &HashMap<String, String> {
        let mtime = (self.stat)(&self.path);
        let Some(mtime) = mtime else {
            self.map.clear();
            self.mtime = None;
            return &self.map;
        };

        if self.mtime == Some(mtime) {
            return &self.map;
        }

        debug!("reloading guide name map from {}", self.path.display());
        self.map = match std::fs::read_to_string(&self.path) {
            Ok(xml) => build_name_map(&xml).unwrap_or_else(|e| {
                warn!("guide file {} is not valid XMLTV: {e}", self.path.display());
                HashMap::new()
            }),
            Err(e) => {
                warn!("cannot read guide file {}: {e}", self.path.display());
                HashMap::new()
            }
        };
        self.mtime = Some(mtime);
        &self.map
    }
}
