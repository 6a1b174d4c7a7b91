//! Catalog build pipeline
//!
//! One rebuild is: fetch each enabled source, parse, aggregate by channel
//! identity, fill guide ids, then filter and order through the whitelist.
//! Sources are strictly best-effort; one dead upstream never takes down the
//! rebuild, it just contributes nothing this round.

pub mod aggregate;
pub mod whitelist;

use std::path::PathBuf;

use chrono::Utc;
use tracing::{info, warn};

use crate::epg::{EpgProvider, EpgResolver, IdTable};
use crate::errors::AppResult;
use crate::models::{Catalog, RawEntry};
use crate::normalize::AliasTable;
use crate::sources::{SourceFetcher, SourceSpec, decompress_to_string, parse_playlist};

pub use aggregate::Aggregator;
pub use whitelist::Whitelist;

/// Knobs for one catalog rebuild.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Drop channels outside the lineup
    pub whitelist_only: bool,
    /// Restrict to a named channel package
    pub package: Option<String>,
    /// Guide dialect used for id resolution
    pub provider: EpgProvider,
    /// Local XMLTV file backing tier-2 resolution
    pub guide_path: PathBuf,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            whitelist_only: true,
            package: None,
            provider: EpgProvider::IptvOrg,
            guide_path: PathBuf::from("guide.xml"),
        }
    }
}

pub struct Pipeline {
    aliases: AliasTable,
    ids: IdTable,
    whitelist: Whitelist,
    options: BuildOptions,
}

impl Pipeline {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            aliases: AliasTable::builtin(),
            ids: IdTable::builtin(),
            whitelist: Whitelist::builtin(),
            options,
        }
    }

    pub fn with_tables(
        aliases: AliasTable,
        ids: IdTable,
        whitelist: Whitelist,
        options: BuildOptions,
    ) -> Self {
        Self {
            aliases,
            ids,
            whitelist,
            options,
        }
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    /// Run a full rebuild over the given sources.
    ///
    /// Returns an empty catalog (with `last_success` unset) when every
    /// source fails; the caller decides whether to keep serving an older
    /// catalog.
    pub async fn build_catalog(
        &self,
        fetcher: &dyn SourceFetcher,
        sources: &[SourceSpec],
    ) -> AppResult<Catalog> {
        let mut entries: Vec<RawEntry> = Vec::new();
        let mut succeeded = 0usize;

        for spec in sources {
            if !spec.enabled {
                info!("source '{}' disabled, skipping", spec.name);
                continue;
            }
            match self.fetch_source(fetcher, spec).await {
                Ok(mut batch) => {
                    // tvg-ids in a foreign guide dialect would block
                    // fill-if-missing with ids the player cannot use
                    if spec.epg_provider != EpgProvider::None
                        && spec.epg_provider != self.options.provider
                    {
                        for entry in &mut batch {
                            entry.tvg_id = None;
                        }
                    }
                    succeeded += 1;
                    entries.append(&mut batch);
                }
                Err(e) => {
                    warn!("source '{}' failed: {e}", spec.name);
                }
            }
        }

        if succeeded == 0 {
            warn!("all {} sources failed this rebuild", sources.len());
        }

        let channels = Aggregator::new(&self.aliases).aggregate(&entries);

        // Filter and re-key before id resolution so fallback-matched
        // channels are looked up under their curated spelling.
        let mut channels = self.whitelist.apply(
            channels,
            self.options.whitelist_only,
            self.options.package.as_deref(),
            &self.aliases,
            &self.ids,
        );

        let mut resolver = EpgResolver::new(
            self.options.provider,
            self.ids.clone(),
            self.options.guide_path.clone(),
        );
        resolver.apply(&mut channels);

        info!("catalog rebuilt with {} channels", channels.len());
        Ok(Catalog {
            channels,
            last_success: (succeeded > 0).then(|| Utc::now().timestamp() as f64),
        })
    }

    async fn fetch_source(
        &self,
        fetcher: &dyn SourceFetcher,
        spec: &SourceSpec,
    ) -> AppResult<Vec<RawEntry>> {
        let payload = fetcher.fetch_bytes(&spec.url).await?;
        let text = decompress_to_string(&payload)?;
        Ok(parse_playlist(&text, &spec.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{SourceError, SourceResult};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct MapFetcher {
        bodies: HashMap<String, String>,
    }

    #[async_trait]
    impl SourceFetcher for MapFetcher {
        async fn fetch_bytes(&self, url: &str) -> SourceResult<Vec<u8>> {
            self.bodies
                .get(url)
                .map(|b| b.as_bytes().to_vec())
                .ok_or_else(|| SourceError::Http {
                    status: 404,
                    url: url.to_string(),
                })
        }
    }

    fn source(name: &str, url: &str) -> SourceSpec {
        SourceSpec {
            name: name.to_string(),
            url: url.to_string(),
            epg_provider: EpgProvider::None,
            enabled: true,
        }
    }

    fn options(dir: &tempfile::TempDir) -> BuildOptions {
        BuildOptions {
            whitelist_only: true,
            package: None,
            provider: EpgProvider::Konyak,
            guide_path: dir.path().join("guide.xml"),
        }
    }

    const LIST_A: &str = "#EXTM3U\n#EXTINF:-1,RTL Kettő\nhttp://a/rtl2.m3u8\n#EXTINF:-1,Unknown Foreign\nhttp://a/x.m3u8\n";
    const LIST_B: &str = "#EXTM3U\n#EXTINF:-1,RTL II\nhttp://b/rtl2.m3u8\n#EXTINF:-1,TV2\nhttp://b/tv2.m3u8\n";

    #[tokio::test]
    async fn merges_sources_and_orders_by_lineup() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MapFetcher {
            bodies: HashMap::from([
                ("http://a/list.m3u".to_string(), LIST_A.to_string()),
                ("http://b/list.m3u".to_string(), LIST_B.to_string()),
            ]),
        };
        let pipeline = Pipeline::new(options(&dir));
        let catalog = pipeline
            .build_catalog(
                &fetcher,
                &[
                    source("a", "http://a/list.m3u"),
                    source("b", "http://b/list.m3u"),
                ],
            )
            .await
            .unwrap();

        let names: Vec<_> = catalog
            .channels
            .iter()
            .map(|c| c.display_name.as_str())
            .collect();
        // lineup order (TV2 before RTL 2), first-seen spellings, and the
        // foreign channel is gone
        assert_eq!(names, vec!["TV2", "RTL Kettő"]);
        let rtl2 = catalog.find("rtl kettő").unwrap();
        assert_eq!(rtl2.variants.len(), 2);
        assert_eq!(rtl2.epg_id.as_deref(), Some("RTL2.hu"));
        assert!(catalog.last_success.is_some());
    }

    #[tokio::test]
    async fn failed_source_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MapFetcher {
            bodies: HashMap::from([("http://b/list.m3u".to_string(), LIST_B.to_string())]),
        };
        let pipeline = Pipeline::new(options(&dir));
        let catalog = pipeline
            .build_catalog(
                &fetcher,
                &[
                    source("dead", "http://dead/list.m3u"),
                    source("b", "http://b/list.m3u"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(catalog.channels.len(), 2);
        assert!(catalog.last_success.is_some());
    }

    #[tokio::test]
    async fn all_sources_failing_yields_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MapFetcher {
            bodies: HashMap::new(),
        };
        let pipeline = Pipeline::new(options(&dir));
        let catalog = pipeline
            .build_catalog(&fetcher, &[source("dead", "http://dead/list.m3u")])
            .await
            .unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.last_success.is_none());
    }

    #[tokio::test]
    async fn disabled_sources_are_not_fetched() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MapFetcher {
            bodies: HashMap::new(),
        };
        let pipeline = Pipeline::new(options(&dir));
        let mut spec = source("off", "http://off/list.m3u");
        spec.enabled = false;
        let catalog = pipeline.build_catalog(&fetcher, &[spec]).await.unwrap();
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn foreign_dialect_ids_are_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let list = "#EXTINF:-1 tvg-id=\"tv2.wrongdialect\",TV2\nhttp://c/tv2.m3u8\n";
        let fetcher = MapFetcher {
            bodies: HashMap::from([("http://c/list.m3u".to_string(), list.to_string())]),
        };
        let pipeline = Pipeline::new(options(&dir));
        let mut spec = source("c", "http://c/list.m3u");
        spec.epg_provider = EpgProvider::IptvOrg; // build runs with Konyak
        let catalog = pipeline.build_catalog(&fetcher, &[spec]).await.unwrap();
        let tv2 = catalog.find("tv2").unwrap();
        // the mismatched id was dropped and tier-1 filled the right one
        assert_eq!(tv2.epg_id.as_deref(), Some("TV2.hu"));
    }

    #[test]
    fn channel_packages_narrow_the_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(&dir);
        opts.package = Some("core_hu".to_string());
        let pipeline = Pipeline::new(opts);
        let fetcher = MapFetcher {
            bodies: HashMap::from([(
                "http://a/list.m3u".to_string(),
                "#EXTINF:-1,HBO\nhttp://a/hbo.m3u8\n#EXTINF:-1,M1\nhttp://a/m1.m3u8\n".to_string(),
            )]),
        };
        let catalog = tokio_test::block_on(
            pipeline.build_catalog(&fetcher, &[source("a", "http://a/list.m3u")]),
        )
        .unwrap();
        let names: Vec<_> = catalog
            .channels
            .iter()
            .map(|c| c.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["M1"]);
    }
}
