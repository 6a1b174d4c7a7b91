use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iptv_catalog::{
    config::Config,
    epg::refresh_guide,
    models::Catalog,
    output,
    pipeline::{BuildOptions, Pipeline},
    selection::{FavouriteSet, SelectionEngine},
    sources::HttpFetcher,
};

#[derive(Parser)]
#[command(name = "iptv-catalog")]
#[command(about = "IPTV playlist aggregator with channel identity resolution")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch all sources and rebuild the catalog and playlists
    Build,
    /// Fetch the XMLTV guide if the local copy is stale
    RefreshGuide,
    /// List the channels of the last built catalog
    Channels,
    /// Print the stream URL a player should use for a channel
    Play {
        /// Channel id (lower-cased display name)
        channel: String,
        /// Pick this variant by its list position instead of automatic mode
        #[arg(long)]
        variant: Option<usize>,
    },
    /// Remember a variant as the working one without printing a URL
    Prefer {
        channel: String,
        variant: usize,
    },
    /// Manage starred channels
    #[command(subcommand)]
    Favourites(FavouritesCommand),
}

#[derive(Subcommand)]
enum FavouritesCommand {
    Add { channel: String },
    Remove { channel: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("iptv_catalog={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load(&cli.config)?;

    match cli.command {
        Command::Build => build(&config).await,
        Command::RefreshGuide => refresh(&config).await,
        Command::Channels => channels(&config),
        Command::Play { channel, variant } => play(&config, &channel, variant),
        Command::Prefer { channel, variant } => prefer(&config, &channel, variant),
        Command::Favourites(cmd) => favourites(&config, cmd),
    }
}

async fn build(config: &Config) -> Result<()> {
    if config.sources.is_empty() {
        bail!("no sources configured in {}", config.profile_dir.display());
    }
    let fetcher = HttpFetcher::new(config.http_timeout());

    // A fresh guide makes tier-2 id resolution useful on the first build.
    refresh_guide(
        &fetcher,
        config.epg.provider,
        &config.guide_path(),
        config.guide_max_age(),
    )
    .await
    .unwrap_or_else(|e| {
        tracing::warn!("guide refresh failed, continuing with the old file: {e}");
        false
    });

    let pipeline = Pipeline::new(BuildOptions {
        whitelist_only: config.output.whitelist_only,
        package: config.output.package.clone(),
        provider: config.epg.provider,
        guide_path: config.guide_path(),
    });
    let catalog = pipeline.build_catalog(&fetcher, &config.sources).await?;
    if catalog.is_empty() {
        tracing::warn!("catalog came back empty, keeping previously written files");
        return Ok(());
    }

    save_catalog(config, &catalog)?;

    let mut channels = catalog.channels.clone();
    if config.output.favourites_only {
        let favs = FavouriteSet::load(&config.favourites_path());
        channels = output::filter_favourites(channels, &favs);
    }

    let state = iptv_catalog::selection::load_selection_state(&config.state_path());
    let playlist = output::direct_m3u(&channels, &state, config.selection.prefer_quality);
    output::write_m3u_file(&config.playlist_path(), &playlist)?;

    if let Some(path) = config.all_variants_path() {
        output::write_m3u_file(&path, &output::all_variants_m3u(&channels))?;
    }

    info!(
        "built {} channels into {}",
        channels.len(),
        config.playlist_path().display()
    );
    Ok(())
}

async fn refresh(config: &Config) -> Result<()> {
    let fetcher = HttpFetcher::new(config.http_timeout());
    let refreshed = refresh_guide(
        &fetcher,
        config.epg.provider,
        &config.guide_path(),
        config.guide_max_age(),
    )
    .await?;
    if refreshed {
        println!("guide updated: {}", config.guide_path().display());
    } else {
        println!("guide already fresh (or no provider configured)");
    }
    Ok(())
}

fn channels(config: &Config) -> Result<()> {
    let catalog = load_catalog(config)?;
    for channel in &catalog.channels {
        let id = channel.epg_id.as_deref().unwrap_or("-");
        println!(
            "{:3}  {:<28} {:<20} {} variants",
            channel.sort_order,
            channel.display_name,
            id,
            channel.variants.len()
        );
    }
    Ok(())
}

/// An unknown channel or a channel without playable variants is an empty
/// result, not an error: the player gets nothing to try and moves on.
fn play(config: &Config, channel: &str, variant: Option<usize>) -> Result<()> {
    match resolve_play_url(config, channel, variant)? {
        Some(url) => println!("{url}"),
        None => tracing::warn!("nothing playable for '{}'", channel.trim().to_lowercase()),
    }
    Ok(())
}

fn resolve_play_url(
    config: &Config,
    channel: &str,
    variant: Option<usize>,
) -> Result<Option<String>> {
    let catalog = load_catalog(config)?;
    let channel_id = channel.trim().to_lowercase();
    let Some(found) = catalog.find(&channel_id) else {
        return Ok(None);
    };

    let mut engine = SelectionEngine::load(
        config.state_path(),
        config.selection.prefer_quality,
        config.quick_retry(),
    );
    Ok(match variant {
        Some(index) => engine.choose_url_manual(found, index),
        None => engine.choose_url(found, epoch_now()),
    })
}

fn prefer(config: &Config, channel: &str, variant: usize) -> Result<()> {
    let catalog = load_catalog(config)?;
    let channel_id = channel.trim().to_lowercase();
    let Some(found) = catalog.find(&channel_id) else {
        bail!("channel '{channel_id}' is not in the catalog");
    };
    let mut engine = SelectionEngine::load(
        config.state_path(),
        config.selection.prefer_quality,
        config.quick_retry(),
    );
    engine.set_preferred(found, variant);
    println!("remembered variant {variant} for '{channel_id}'");
    Ok(())
}

fn favourites(config: &Config, cmd: FavouritesCommand) -> Result<()> {
    let path = config.favourites_path();
    let mut favs = FavouriteSet::load(&path);
    match cmd {
        FavouritesCommand::Add { channel } => {
            let id = channel.trim().to_lowercase();
            if favs.add(&id) {
                favs.save(&path)?;
                println!("added '{id}'");
            } else {
                println!("'{id}' was already starred");
            }
        }
        FavouritesCommand::Remove { channel } => {
            let id = channel.trim().to_lowercase();
            if favs.remove(&id) {
                favs.save(&path)?;
                println!("removed '{id}'");
            } else {
                println!("'{id}' was not starred");
            }
        }
        FavouritesCommand::List => {
            for id in favs.iter() {
                println!("{id}");
            }
        }
    }
    Ok(())
}

fn save_catalog(config: &Config, catalog: &Catalog) -> Result<()> {
    let path = config.catalog_path();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let body = serde_json::to_string(catalog)?;
    std::fs::write(&path, body)
        .with_context(|| format!("writing catalog to {}", path.display()))?;
    Ok(())
}

fn load_catalog(config: &Config) -> Result<Catalog> {
    let path = config.catalog_path();
    let body = std::fs::read_to_string(&path)
        .with_context(|| format!("no catalog at {}; run `build` first", path.display()))?;
    serde_json::from_str(&body).with_context(|| format!("catalog {} is corrupt", path.display()))
}

fn epoch_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use iptv_catalog::models::{CanonicalChannel, Variant};

    fn config_in(dir: &tempfile::TempDir) -> Config {
        Config::from_toml(&format!("profile_dir = \"{}\"", dir.path().display())).unwrap()
    }

    fn write_catalog(config: &Config, catalog: &Catalog) {
        save_catalog(config, catalog).unwrap();
    }

    #[test]
    fn unknown_channel_is_an_empty_result_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        write_catalog(&config, &Catalog::default());

        assert_eq!(resolve_play_url(&config, "no such channel", None).unwrap(), None);
    }

    #[test]
    fn known_channel_yields_its_best_url() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let catalog = Catalog {
            channels: vec![CanonicalChannel {
                channel_id: "tv2".to_string(),
                display_name: "TV2".to_string(),
                group_title: None,
                logo: None,
                epg_id: None,
                variants: vec![Variant {
                    url: "http://a/tv2_1080.m3u8".to_string(),
                    tvg_id: None,
                    tvg_logo: None,
                    group_title: None,
                    properties: Vec::new(),
                }],
                sort_order: 0,
            }],
            last_success: None,
        };
        write_catalog(&config, &catalog);

        assert_eq!(
            resolve_play_url(&config, " TV2 ", None).unwrap().as_deref(),
            Some("http://a/tv2_1080.m3u8")
        );
    }
}
