//! Configuration loading
//!
//! A single TOML document describes the upstream sources and every tunable
//! the pipeline has. All keys are optional; an empty file yields a working
//! (if sourceless) configuration. Relative paths are resolved against
//! `profile_dir` so one setting moves the whole state directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::epg::EpgProvider;
use crate::errors::{AppError, AppResult};
use crate::sources::SourceSpec;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding the guide, playlists and persisted state
    #[serde(default = "default_profile_dir")]
    pub profile_dir: PathBuf,

    #[serde(default)]
    pub sources: Vec<SourceSpec>,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub epg: EpgConfig,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EpgConfig {
    /// Guide dialect used for id resolution
    #[serde(default)]
    pub provider: EpgProvider,
    /// Local XMLTV file, relative to the profile directory
    #[serde(default = "default_guide_file")]
    pub guide_file: PathBuf,
    /// Guide files younger than this are not re-fetched
    #[serde(default = "default_guide_max_age_hours")]
    pub max_age_hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionConfig {
    #[serde(default = "default_true")]
    pub prefer_quality: bool,
    /// Re-requests within this window advance to the next variant
    #[serde(default = "default_quick_retry_secs")]
    pub quick_retry_secs: u64,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_favourites_file")]
    pub favourites_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Drop channels outside the lineup
    #[serde(default = "default_true")]
    pub whitelist_only: bool,
    /// Restrict the catalog to a named channel package
    #[serde(default)]
    pub package: Option<String>,
    /// Emit only starred channels
    #[serde(default)]
    pub favourites_only: bool,
    #[serde(default = "default_playlist_file")]
    pub playlist_file: PathBuf,
    /// Serialized catalog, reused by the play commands between rebuilds
    #[serde(default = "default_catalog_file")]
    pub catalog_file: PathBuf,
    /// Flat every-variant playlist for external players; unset disables it
    #[serde(default)]
    pub all_variants_file: Option<PathBuf>,
}

fn default_profile_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_guide_file() -> PathBuf {
    PathBuf::from("guide.xml")
}

fn default_guide_max_age_hours() -> u64 {
    24
}

fn default_true() -> bool {
    true
}

fn default_quick_retry_secs() -> u64 {
    20
}

fn default_state_file() -> PathBuf {
    PathBuf::from("play_state.json")
}

fn default_favourites_file() -> PathBuf {
    PathBuf::from("favourites.json")
}

fn default_playlist_file() -> PathBuf {
    PathBuf::from("catalog.m3u")
}

fn default_catalog_file() -> PathBuf {
    PathBuf::from("catalog.json")
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for EpgConfig {
    fn default() -> Self {
        Self {
            provider: EpgProvider::default(),
            guide_file: default_guide_file(),
            max_age_hours: default_guide_max_age_hours(),
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            prefer_quality: true,
            quick_retry_secs: default_quick_retry_secs(),
            state_file: default_state_file(),
            favourites_file: default_favourites_file(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            whitelist_only: true,
            package: None,
            favourites_only: false,
            playlist_file: default_playlist_file(),
            catalog_file: default_catalog_file(),
            all_variants_file: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile_dir: default_profile_dir(),
            sources: Vec::new(),
            http: HttpConfig::default(),
            epg: EpgConfig::default(),
            selection: SelectionConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> AppResult<Self> {
        let config: Config = toml::from_str(text)
            .map_err(|e| AppError::configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> AppResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                debug!("loading config from {}", path.display());
                Self::from_toml(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn validate(&self) -> AppResult<()> {
        for spec in &self.sources {
            if spec.name.trim().is_empty() {
                return Err(AppError::configuration("source with an empty name"));
            }
            if spec.url.trim().is_empty() {
                return Err(AppError::configuration(format!(
                    "source '{}' has an empty url",
                    spec.name
                )));
            }
            url::Url::parse(&spec.url).map_err(|e| {
                AppError::configuration(format!("source '{}' url is invalid: {e}", spec.name))
            })?;
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    pub fn guide_max_age(&self) -> Duration {
        Duration::from_secs(self.epg.max_age_hours * 3600)
    }

    pub fn quick_retry(&self) -> Duration {
        Duration::from_secs(self.selection.quick_retry_secs)
    }

    /// Resolve a config-supplied path against the profile directory.
    pub fn in_profile(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.profile_dir.join(path)
        }
    }

    pub fn guide_path(&self) -> PathBuf {
        self.in_profile(&self.epg.guide_file)
    }

    pub fn state_path(&self) -> PathBuf {
        self.in_profile(&self.selection.state_file)
    }

    pub fn favourites_path(&self) -> PathBuf {
        self.in_profile(&self.selection.favourites_file)
    }

    pub fn playlist_path(&self) -> PathBuf {
        self.in_profile(&self.output.playlist_file)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.in_profile(&self.output.catalog_file)
    }

    pub fn all_variants_path(&self) -> Option<PathBuf> {
        self.output
            .all_variants_file
            .as_deref()
            .map(|p| self.in_profile(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert!(config.sources.is_empty());
        assert!(config.output.whitelist_only);
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.epg.max_age_hours, 24);
        assert_eq!(config.selection.quick_retry_secs, 20);
        assert_eq!(config.epg.provider, EpgProvider::None);
    }

    #[test]
    fn full_document_parses() {
        let config = Config::from_toml(
            r#"
            profile_dir = "/var/lib/catalog"

            [[sources]]
            name = "primary"
            url = "https://example.invalid/list.m3u"
            epg_provider = "konyak"

            [[sources]]
            name = "backup"
            url = "https://example.invalid/backup.m3u"
            enabled = false

            [epg]
            provider = "iptvorg"
            max_age_hours = 12

            [selection]
            prefer_quality = false
            quick_retry_secs = 15

            [output]
            package = "core_hu"
            favourites_only = true
            all_variants_file = "debug.m3u"
            "#,
        )
        .unwrap();

        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].epg_provider, EpgProvider::Konyak);
        assert!(!config.sources[1].enabled);
        assert_eq!(config.epg.provider, EpgProvider::IptvOrg);
        assert_eq!(config.guide_max_age(), Duration::from_secs(12 * 3600));
        assert!(!config.selection.prefer_quality);
        assert_eq!(config.output.package.as_deref(), Some("core_hu"));
        assert!(config.output.favourites_only);
    }

    #[test]
    fn paths_resolve_against_profile_dir() {
        let config = Config::from_toml("profile_dir = \"/data/iptv\"").unwrap();
        assert_eq!(config.guide_path(), PathBuf::from("/data/iptv/guide.xml"));
        assert_eq!(
            config.state_path(),
            PathBuf::from("/data/iptv/play_state.json")
        );
        assert_eq!(config.all_variants_path(), None);
    }

    #[test]
    fn absolute_paths_are_kept() {
        let config = Config::from_toml(
            "profile_dir = \"/data/iptv\"\n[epg]\nguide_file = \"/tmp/guide.xml\"\n",
        )
        .unwrap();
        assert_eq!(config.guide_path(), PathBuf::from("/tmp/guide.xml"));
    }

    #[test]
    fn bad_source_url_is_rejected() {
        let err = Config::from_toml(
            "[[sources]]\nname = \"x\"\nurl = \"not a url\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("url is invalid"));
    }

    #[test]
    fn empty_source_name_is_rejected() {
        let err = Config::from_toml(
            "[[sources]]\nname = \" \"\nurl = \"http://example.invalid/x\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty name"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("no_such_key = 1").is_err());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert!(config.sources.is_empty());
    }
}
