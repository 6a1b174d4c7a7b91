//! Playlist source handling
//!
//! A source is one upstream playlist: where to get it, which EPG provider
//! labels its tvg-ids, and how to parse the body. Fetching is abstracted
//! behind [`SourceFetcher`] so the pipeline can be driven by canned bytes in
//! tests.

pub mod decompress;
pub mod fetcher;
pub mod m3u;

use serde::{Deserialize, Serialize};

pub use decompress::decompress_to_string;
pub use fetcher::{HttpFetcher, SourceFetcher};
pub use m3u::parse_playlist;

use crate::epg::EpgProvider;

/// One configured upstream playlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Short label used in logs and error messages
    pub name: String,
    /// HTTP(S) URL of the playlist document
    pub url: String,
    /// Which EPG id dialect this source's tvg-ids belong to
    #[serde(default)]
    pub epg_provider: EpgProvider,
    /// Sources are tried in config order; disabled ones are skipped
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_spec_defaults_from_toml() {
        let spec: SourceSpec = toml::from_str(
            r#"
            name = "primary"
            url = "https://example.invalid/list.m3u"
            "#,
        )
        .unwrap();
        assert!(spec.enabled);
        assert_eq!(spec.epg_provider, EpgProvider::None);
    }

    #[test]
    fn provider_parses_leniently() {
        let spec: SourceSpec = toml::from_str(
            r#"
            name = "alt"
            url = "https://example.invalid/alt.m3u8"
            epg_provider = "IPTV-ORG"
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(spec.epg_provider, EpgProvider::IptvOrg);
        assert!(!spec.enabled);
    }
}
