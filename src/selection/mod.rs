//! Variant selection and failover
//!
//! Decides which of a channel's stream variants to hand to the player.
//! Variants are ranked by a URL quality heuristic, the last working rank is
//! remembered per channel, and a quick re-request of the same channel is
//! read as "that one was dead, try the next". Manual picks feed the same
//! persisted state so automatic mode keeps honoring them.

pub mod state;

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::models::{CanonicalChannel, SelectionState, Variant};

pub use state::{FavouriteSet, load_selection_state, save_selection_state};

/// Re-requesting the same channel within this window advances the variant.
pub const DEFAULT_QUICK_RETRY: Duration = Duration::from_secs(20);

/// URL quality heuristic; higher is better. Resolution keywords dominate,
/// HLS gets a small bonus, audio-only and mobile feeds a malus.
pub fn quality_score(url: &str) -> i32 {
    let url = url.to_lowercase();
    let mut score = 0;

    if ["mobile", "low", "lowres", "/sd/", "_sd", "-sd"]
        .iter()
        .any(|t| url.contains(t))
    {
        score -= 15;
    }

    if ["2160", "4k", "uhd"].iter().any(|t| url.contains(t)) {
        score += 40;
    }
    if ["1080", "fhd"].iter().any(|t| url.contains(t)) {
        score += 30;
    }
    if ["720", "hd"].iter().any(|t| url.contains(t)) {
        score += 20;
    }
    if url.contains("480") {
        score += 5;
    }

    if url.ends_with(".m3u8") || url.contains("/hls") || url.contains("playlist.m3u8") {
        score += 10;
    }

    if url.contains(".mp3") || url.contains("radio=") {
        score -= 5;
    }

    score
}

/// Rank variants best-first. The sort is stable, so equally scored variants
/// keep their encounter order.
pub fn rank_variants(variants: &[Variant], prefer_quality: bool) -> Vec<&Variant> {
    let mut ranked: Vec<&Variant> = variants.iter().collect();
    if prefer_quality {
        ranked.sort_by_key(|v| -quality_score(&v.url));
    }
    ranked
}

/// Per-channel variant chooser backed by the persisted selection state.
pub struct SelectionEngine {
    state: SelectionState,
    state_path: PathBuf,
    prefer_quality: bool,
    quick_retry: Duration,
}

impl SelectionEngine {
    pub fn load(state_path: impl Into<PathBuf>, prefer_quality: bool, quick_retry: Duration) -> Self {
        let state_path = state_path.into();
        let state = load_selection_state(&state_path);
        Self {
            state,
            state_path,
            prefer_quality,
            quick_retry,
        }
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    /// Automatic mode: pick the remembered variant, or the next one when
    /// the same channel was re-requested within the quick-retry window.
    ///
    /// `now` is epoch seconds; injected so the failover window is testable.
    pub fn choose_url(&mut self, channel: &CanonicalChannel, now: f64) -> Option<String> {
        let ranked = rank_variants(&channel.variants, self.prefer_quality);
        if ranked.is_empty() {
            return None;
        }

        let cid = channel.channel_id.as_str();
        let mut index = self
            .state
            .indices
            .get(cid)
            .copied()
            .filter(|&i| i < ranked.len())
            .unwrap_or(0);

        let quick_retry = self.state.meta.last_channel.as_deref() == Some(cid)
            && (now - self.state.meta.last_time) < self.quick_retry.as_secs_f64();
        if quick_retry {
            index = (index + 1) % ranked.len();
            info!("quick retry on '{cid}', advancing to variant {index}");
        }

        self.remember(cid, index, now);
        Some(ranked[index].url.clone())
    }

    /// Manual mode: the user picked a variant by its raw list position.
    /// The pick is stored as its rank position so automatic mode starts
    /// from the same stream. The quick-retry streak is deliberately not
    /// armed: an automatic call right after a manual pick must replay the
    /// pick, not advance past it.
    pub fn choose_url_manual(
        &mut self,
        channel: &CanonicalChannel,
        variant_index: usize,
    ) -> Option<String> {
        if channel.variants.is_empty() {
            return None;
        }
        let raw_index = variant_index.min(channel.variants.len() - 1);
        let chosen_url = channel.variants[raw_index].url.clone();

        let ranked = rank_variants(&channel.variants, self.prefer_quality);
        let rank_index = ranked
            .iter()
            .position(|v| v.url == chosen_url)
            .unwrap_or(0);

        debug!(
            "manual pick on '{}': raw {raw_index} stored as rank {rank_index}",
            channel.channel_id
        );
        self.remember_manual(&channel.channel_id, rank_index);
        Some(chosen_url)
    }

    /// Record a known-good variant without returning a URL. Like a manual
    /// pick, this never arms the quick-retry streak.
    pub fn set_preferred(&mut self, channel: &CanonicalChannel, variant_index: usize) {
        if channel.variants.is_empty() {
            return;
        }
        let raw_index = variant_index.min(channel.variants.len() - 1);
        let chosen_url = &channel.variants[raw_index].url;
        let ranked = rank_variants(&channel.variants, self.prefer_quality);
        let rank_index = ranked.iter().position(|v| &v.url == chosen_url).unwrap_or(0);
        self.remember_manual(&channel.channel_id, rank_index);
    }

    fn remember(&mut self, channel_id: &str, index: usize, now: f64) {
        self.state.indices.insert(channel_id.to_string(), index);
        self.state.meta.last_channel = Some(channel_id.to_string());
        self.state.meta.last_time = now;
        self.persist();
    }

    fn remember_manual(&mut self, channel_id: &str, index: usize) {
        self.state.indices.insert(channel_id.to_string(), index);
        self.state.meta.last_channel = None;
        self.persist();
    }

    fn persist(&self) {
        if let Err(e) = save_selection_state(&self.state_path, &self.state) {
            warn!("could not persist selection state: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(url: &str) -> Variant {
        Variant {
            url: url.to_string(),
            tvg_id: None,
            tvg_logo: None,
            group_title: None,
            properties: Vec::new(),
        }
    }

    fn channel(id: &str, urls: &[&str]) -> CanonicalChannel {
        CanonicalChannel {
            channel_id: id.to_string(),
            display_name: id.to_string(),
            group_title: None,
            logo: None,
            epg_id: None,
            variants: urls.iter().map(|u| variant(u)).collect(),
            sort_order: 0,
        }
    }

    fn engine(dir: &tempfile::TempDir) -> SelectionEngine {
        SelectionEngine::load(
            dir.path().join("play_state.json"),
            true,
            DEFAULT_QUICK_RETRY,
        )
    }

    #[test]
    fn quality_scores_follow_resolution() {
        assert!(quality_score("http://h/stream_1080.m3u8") > quality_score("http://h/stream_720.m3u8"));
        assert!(quality_score("http://h/4k/index.m3u8") > quality_score("http://h/stream_1080.m3u8"));
        assert!(quality_score("http://h/mobile/x.ts") < quality_score("http://h/x.ts"));
        assert!(quality_score("http://h/x.mp3") < 0);
        // hls bonus
        assert_eq!(
            quality_score("http://h/plain.m3u8") - quality_score("http://h/plain.ts"),
            10
        );
    }

    #[test]
    fn ranking_is_stable_for_ties() {
        let variants = vec![variant("http://a/x.ts"), variant("http://b/x.ts")];
        let ranked = rank_variants(&variants, true);
        assert_eq!(ranked[0].url, "http://a/x.ts");
    }

    #[test]
    fn prefer_quality_off_keeps_encounter_order() {
        let variants = vec![variant("http://a/sd.ts"), variant("http://b/1080.m3u8")];
        let ranked = rank_variants(&variants, false);
        assert_eq!(ranked[0].url, "http://a/sd.ts");
    }

    #[test]
    fn first_play_picks_best_variant() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir);
        let ch = channel("rtl 2", &["http://a/720.m3u8", "http://b/1080.m3u8"]);
        assert_eq!(
            engine.choose_url(&ch, 1000.0),
            Some("http://b/1080.m3u8".to_string())
        );
    }

    #[test]
    fn quick_retry_advances_slow_retry_stays() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir);
        let ch = channel("tv2", &["http://a/1080.m3u8", "http://b/720.m3u8"]);

        let first = engine.choose_url(&ch, 1000.0).unwrap();
        assert_eq!(first, "http://a/1080.m3u8");

        // 5 seconds later: assume failure, advance
        let second = engine.choose_url(&ch, 1005.0).unwrap();
        assert_eq!(second, "http://b/720.m3u8");

        // 25 seconds after that: the last variant counts as working
        let third = engine.choose_url(&ch, 1030.0).unwrap();
        assert_eq!(third, "http://b/720.m3u8");
    }

    #[test]
    fn quick_retry_wraps_around() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir);
        let ch = channel("duna", &["http://a/1080.m3u8", "http://b/720.m3u8"]);

        engine.choose_url(&ch, 1000.0);
        engine.choose_url(&ch, 1005.0);
        // third quick retry wraps back to the best variant
        assert_eq!(
            engine.choose_url(&ch, 1010.0),
            Some("http://a/1080.m3u8".to_string())
        );
    }

    #[test]
    fn switching_channels_is_not_a_retry() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir);
        let a = channel("a", &["http://a/1.m3u8", "http://a/2.m3u8"]);
        let b = channel("b", &["http://b/1.m3u8"]);

        let first = engine.choose_url(&a, 1000.0).unwrap();
        engine.choose_url(&b, 1002.0);
        // back to a within the window, but b broke the streak
        assert_eq!(engine.choose_url(&a, 1004.0), Some(first));
    }

    #[test]
    fn manual_pick_sticks_for_auto_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir);
        let ch = channel("hbo", &["http://a/1080.m3u8", "http://b/720.m3u8"]);

        let manual = engine.choose_url_manual(&ch, 1).unwrap();
        assert_eq!(manual, "http://b/720.m3u8");

        // later auto play (outside the window) starts from the manual pick
        assert_eq!(engine.choose_url(&ch, 2000.0), Some(manual));
    }

    #[test]
    fn manual_pick_survives_an_immediate_auto_replay() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir);
        let ch = channel("hbo", &["http://a/1080.m3u8", "http://b/720.m3u8"]);

        // arm the streak with an automatic play first
        engine.choose_url(&ch, 1000.0);
        let manual = engine.choose_url_manual(&ch, 1).unwrap();
        assert_eq!(manual, "http://b/720.m3u8");

        // one second later, automatic mode must replay the pick, not
        // treat the re-request as a failed stream
        assert_eq!(engine.choose_url(&ch, 1001.0), Some(manual));
    }

    #[test]
    fn set_preferred_does_not_arm_the_retry_streak() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir);
        let ch = channel("duna", &["http://a/1080.m3u8", "http://b/720.m3u8"]);

        engine.set_preferred(&ch, 1);
        assert_eq!(
            engine.choose_url(&ch, 1000.0),
            Some("http://b/720.m3u8".to_string())
        );
    }

    #[test]
    fn manual_index_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir);
        let ch = channel("m1", &["http://a/1.m3u8"]);
        assert_eq!(
            engine.choose_url_manual(&ch, 99),
            Some("http://a/1.m3u8".to_string())
        );
    }

    #[test]
    fn state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let ch = channel("tv2", &["http://a/1080.m3u8", "http://b/720.m3u8"]);
        {
            let mut engine = engine(&dir);
            engine.choose_url(&ch, 1000.0);
            engine.choose_url(&ch, 1005.0); // advance to rank 1
        }
        let mut engine = engine(&dir);
        // outside the retry window after reload, the stored rank holds
        assert_eq!(
            engine.choose_url(&ch, 2000.0),
            Some("http://b/720.m3u8".to_string())
        );
    }

    #[test]
    fn stale_index_falls_back_to_best() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("play_state.json");
        std::fs::write(&path, r#"{"indices": {"tv2": 7}, "meta": {}}"#).unwrap();
        let mut engine = SelectionEngine::load(&path, true, DEFAULT_QUICK_RETRY);
        let ch = channel("tv2", &["http://a/1080.m3u8", "http://b/720.m3u8"]);
        assert_eq!(
            engine.choose_url(&ch, 1000.0),
            Some("http://a/1080.m3u8".to_string())
        );
    }

    #[test]
    fn empty_variants_yield_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir);
        let ch = channel("ghost", &[]);
        assert_eq!(engine.choose_url(&ch, 1000.0), None);
        assert_eq!(engine.choose_url_manual(&ch, 0), None);
    }
}
