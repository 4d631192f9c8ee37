use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use lyricsync::{config, lyrics, player, storage, ytm};

use lyrics::parser::format_timestamp;
use lyrics::{
    GoogleTranslator, LrclibClient, LyricsField, LyricsMode, LyricsResolver, LyricsView,
    ProviderGateway, SyncedLyrics, TranslatedLyrics, TranslationRelay,
};
use player::clock::KnownDuration;
use player::mpv::MpvHandle;
use player::PlayerClock;
use storage::LyricsStore;
use ytm::api::YtmClient;
use ytm::models::Track;

#[derive(Debug, Parser)]
#[command(name = "lyricsync", version, about = "Cached, synchronized lyrics for YouTube Music tracks")]
struct Cli {
    /// Override config file path.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a song's lyrics, fetching them on first use.
    Show {
        song_id: String,
        #[command(flatten)]
        mode: ModeArgs,
        #[command(flatten)]
        track: TrackArgs,
    },
    /// Store your own lyrics for a song.
    Edit {
        song_id: String,
        #[command(flatten)]
        mode: ModeArgs,
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,
        /// Read the lyrics from a file.
        #[arg(long)]
        file: Option<PathBuf>,
        #[command(flatten)]
        track: TrackArgs,
    },
    /// Drop the cached lyrics and fetch them again.
    Refetch {
        song_id: String,
        #[command(flatten)]
        mode: ModeArgs,
        #[command(flatten)]
        track: TrackArgs,
    },
    /// Translate a piece of text.
    Translate {
        text: String,
        /// Target language code; defaults to the configured one.
        #[arg(long)]
        to: Option<String>,
    },
    /// Play a song through mpv and print each lyric line as it is sung.
    Follow {
        song_id: String,
        /// Print a translation under every line.
        #[arg(long)]
        translate: bool,
        /// Start playback at this lyric line (0-based).
        #[arg(long)]
        start_line: Option<usize>,
    },
    /// Print the "search lyrics online" query and URL.
    SearchQuery {
        song_id: String,
        #[command(flatten)]
        track: TrackArgs,
    },
    /// Print the config file path.
    ConfigPath,
}

/// Lyrics variant; the configured default when neither flag is given.
#[derive(Debug, Default, Args)]
struct ModeArgs {
    /// Synchronized (LRC) lyrics.
    #[arg(long, conflicts_with = "plain")]
    synced: bool,
    /// Plain lyrics.
    #[arg(long)]
    plain: bool,
}

impl ModeArgs {
    fn pick(&self, cfg: &config::Config) -> LyricsMode {
        if self.synced {
            LyricsMode::Synchronized
        } else if self.plain {
            LyricsMode::Plain
        } else {
            cfg.lyrics.default_mode()
        }
    }
}

/// Metadata overrides for songs the cache has not seen.
#[derive(Debug, Default, Args)]
struct TrackArgs {
    #[arg(long)]
    title: Option<String>,
    /// May be repeated.
    #[arg(long = "artist")]
    artists: Vec<String>,
    #[arg(long)]
    album: Option<String>,
    /// Track length in seconds.
    #[arg(long)]
    duration: Option<u32>,
}

impl TrackArgs {
    fn is_complete(&self) -> bool {
        self.title.is_some() && !self.artists.is_empty()
    }

    fn apply(&self, mut track: Track) -> Track {
        if let Some(title) = &self.title {
            track.title = title.clone();
        }
        if !self.artists.is_empty() {
            track.artists = self.artists.clone();
        }
        if self.album.is_some() {
            track.album = self.album.clone();
        }
        if self.duration.is_some() {
            track.duration_seconds = self.duration;
        }
        track
    }
}

/// Long-lived clients shared by the subcommands.
struct Services {
    store: Arc<LyricsStore>,
    ytm: YtmClient,
    gateway: ProviderGateway,
}

impl Services {
    fn new(cfg: &config::Config) -> anyhow::Result<Self> {
        let timeout = cfg.providers.request_timeout();
        let store = LyricsStore::open(&cfg.database_path()).context("open lyrics store")?;
        let ytm = YtmClient::new(timeout)?;
        let lrclib = LrclibClient::new(&cfg.providers.lrclib_base_url, timeout)?;
        Ok(Self {
            store: Arc::new(store),
            gateway: ProviderGateway::new(ytm.clone(), lrclib),
            ytm,
        })
    }

    /// Stored metadata first, then the command line, then YouTube Music.
    async fn track(&self, song_id: &str, args: &TrackArgs) -> anyhow::Result<Track> {
        let stored = self.store.get_song(song_id).context("read song metadata")?;
        let base = match stored {
            Some(track) => track,
            None if args.is_complete() => Track {
                video_id: song_id.to_string(),
                title: String::new(),
                artists: Vec::new(),
                album: None,
                duration_seconds: None,
            },
            None => self
                .ytm
                .track(song_id)
                .await
                .with_context(|| format!("look up metadata for {song_id}"))?,
        };
        Ok(args.apply(base))
    }

    fn catalogue_resolver(
        &self,
        cfg: &config::Config,
        track: &Track,
    ) -> LyricsResolver<ProviderGateway, KnownDuration> {
        let duration_ms = track.duration_seconds.map(|s| u64::from(s) * 1000);
        LyricsResolver::new(
            self.store.clone(),
            self.gateway.clone(),
            KnownDuration(duration_ms),
            cfg.lyrics.resolver_options(),
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg_path = match cli.config.clone() {
        Some(p) => p,
        None => config::default_config_path().context("default config path")?,
    };
    if let Command::ConfigPath = cli.command {
        println!("{}", cfg_path.display());
        return Ok(());
    }
    let cfg = config::load(Some(&cfg_path)).context("load config")?;

    match cli.command {
        Command::ConfigPath => {}
        Command::Show {
            song_id,
            mode,
            track,
        } => {
            let services = Services::new(&cfg)?;
            let track = services.track(&song_id, &track).await?;
            let mode = mode.pick(&cfg);
            let view = resolve_once(&services, &cfg, &track, mode).await?;
            print_view(&track, &view, &cfg)?;
        }
        Command::Edit {
            song_id,
            mode,
            text,
            file,
            track,
        } => {
            let text = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("read {}", path.display()))?,
                (None, None) => anyhow::bail!("pass --text or --file"),
            };
            let services = Services::new(&cfg)?;
            let track = services.track(&song_id, &track).await?;
            let mode = mode.pick(&cfg);
            services
                .catalogue_resolver(&cfg, &track)
                .edit(&track, mode, &text)
                .await?;
            println!("Saved {} lyrics for {}.", mode.label(), track.video_id);
        }
        Command::Refetch {
            song_id,
            mode,
            track,
        } => {
            let services = Services::new(&cfg)?;
            let track = services.track(&song_id, &track).await?;
            let mode = mode.pick(&cfg);
            services
                .catalogue_resolver(&cfg, &track)
                .clear_and_refetch(&track.video_id, mode)
                .await?;
            let view = resolve_once(&services, &cfg, &track, mode).await?;
            print_view(&track, &view, &cfg)?;
        }
        Command::Translate { text, to } => {
            let relay = translation_relay(&cfg)?;
            let target = to.unwrap_or_else(|| cfg.lyrics.target_language.clone());
            println!("{}", relay.translate(&text, &target).await);
        }
        Command::Follow {
            song_id,
            translate,
            start_line,
        } => {
            let services = Services::new(&cfg)?;
            let track = services.track(&song_id, &TrackArgs::default()).await?;
            follow(&services, &cfg, track, translate, start_line).await?;
        }
        Command::SearchQuery { song_id, track } => {
            let services = Services::new(&cfg)?;
            let track = services.track(&song_id, &track).await?;
            println!("{}", track.lyrics_search_query());
            println!("{}", track.lyrics_search_url());
        }
    }

    Ok(())
}

fn translation_relay(cfg: &config::Config) -> anyhow::Result<TranslationRelay<GoogleTranslator>> {
    let translator = GoogleTranslator::new(
        &cfg.providers.translate_base_url,
        cfg.providers.request_timeout(),
    )?;
    Ok(TranslationRelay::new(
        translator,
        cfg.lyrics.translation_cache_size,
    ))
}

async fn resolve_once(
    services: &Services,
    cfg: &config::Config,
    track: &Track,
    mode: LyricsMode,
) -> anyhow::Result<LyricsView> {
    let resolver = services.catalogue_resolver(cfg, track);
    let mut subscription = resolver.resolve(track.clone(), mode).await?;
    if subscription
        .changed()
        .await
        .is_some_and(|view| view.is_loading())
    {
        eprintln!("Loading {} lyrics...", mode.label());
    }
    Ok(subscription.settled().await)
}

fn print_view(track: &Track, view: &LyricsView, cfg: &config::Config) -> anyhow::Result<()> {
    if let Some(err) = &view.store_error {
        anyhow::bail!("lyrics store failed: {err}");
    }

    eprintln!(
        "{} - {} ({} lyrics, {:?})",
        track.title,
        track.artist_line(),
        view.mode.label(),
        cfg.lyrics.font_size
    );

    match view.field() {
        LyricsField::Value(text) if view.mode == LyricsMode::Synchronized => {
            // Normalized LRC; text without any timestamp is printed as stored
            if SyncedLyrics::is_timed(text) {
                println!("{}", SyncedLyrics::parse(text).to_lrc());
            } else {
                println!("{text}");
            }
        }
        LyricsField::Value(text) => println!("{text}"),
        LyricsField::Empty => println!("No lyrics found."),
        LyricsField::Unset if view.failed => {
            anyhow::bail!("could not fetch {} lyrics for {}", view.mode.label(), track.video_id)
        }
        LyricsField::Unset => println!("Lyrics unavailable."),
    }
    Ok(())
}

async fn follow(
    services: &Services,
    cfg: &config::Config,
    track: Track,
    translate: bool,
    start_line: Option<usize>,
) -> anyhow::Result<()> {
    services
        .store
        .ensure_song(&track)
        .context("save song metadata")?;

    let (event_tx, event_rx) = mpsc::channel(256);
    let mpv = MpvHandle::spawn(event_tx, cfg.player.audio_device.as_deref(), None).await?;
    let clock = PlayerClock::spawn(event_rx);

    let url = ytm::resolve::resolve_audio_url(
        &track.video_id,
        cfg.providers.cookies_from_browser.as_deref(),
    )
    .await?;
    mpv.set_volume(cfg.player.volume).await?;
    mpv.load_url(&url).await?;
    eprintln!("Playing {} - {}", track.title, track.artist_line());

    let resolver = LyricsResolver::new(
        services.store.clone(),
        services.gateway.clone(),
        clock.clone(),
        cfg.lyrics.resolver_options(),
    );

    let mut synced = resolver
        .resolve(track.clone(), LyricsMode::Synchronized)
        .await?;
    let view = synced.settled().await;
    let parsed = view
        .text()
        .filter(|text| SyncedLyrics::is_timed(text))
        .map(SyncedLyrics::parse);

    let Some(parsed) = parsed else {
        tracing::info!("no synchronized lyrics for {}, showing plain", track.video_id);
        let mut plain = resolver.resolve(track.clone(), LyricsMode::Plain).await?;
        let view = plain.settled().await;
        print_view(&track, &view, cfg)?;
        wait_for_end(clock).await;
        return Ok(());
    };

    tracing::debug!(lines = parsed.len(), "synchronized lyrics ready");
    let texts = parsed.lines.iter().map(|l| l.text.clone()).collect();
    let mut translated = TranslatedLyrics::new(
        translation_relay(cfg)?,
        &cfg.lyrics.target_language,
        texts,
    );
    translated.set_enabled(translate);

    let mut cursor = lyrics::follow_clock(parsed.lines, clock.clone(), cfg.lyrics.lookahead_ms);
    if let Some(index) = start_line {
        match cursor.timestamp_of(index) {
            Some(position_ms) => mpv.seek_to_ms(position_ms).await?,
            None => tracing::warn!("no lyric line {index}, playing from the start"),
        }
    }

    let mut ticker = tokio::time::interval(cfg.lyrics.cursor_tick());
    let mut printed = None;
    loop {
        ticker.tick().await;
        let status = clock.status();
        if status.ended {
            break;
        }
        cursor.tick();
        // Nothing is sung before the first timestamp
        let sung_until = status.position_ms + cfg.lyrics.lookahead_ms;
        let Some(line) = cursor.current().filter(|l| l.timestamp_ms <= sung_until) else {
            continue;
        };
        if printed == Some(cursor.index()) {
            continue;
        }
        println!("[{}] {}", format_timestamp(line.timestamp_ms), line.text);
        if translated.is_enabled()
            && let Some(text) = translated.line(cursor.index())
            && text != line.text
        {
            println!("    {text}");
        }
        printed = Some(cursor.index());
    }

    drop(mpv);
    Ok(())
}

async fn wait_for_end(mut clock: PlayerClock) {
    while !clock.status().ended {
        if !clock.changed().await {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_args_override_stored_metadata() {
        let stored = Track {
            video_id: "abc".into(),
            title: "Old".into(),
            artists: vec!["Someone".into()],
            album: Some("Album".into()),
            duration_seconds: Some(200),
        };
        let args = TrackArgs {
            title: Some("New".into()),
            duration: Some(180),
            ..TrackArgs::default()
        };
        let track = args.apply(stored);
        assert_eq!(track.title, "New");
        assert_eq!(track.artists, vec!["Someone".to_string()]);
        assert_eq!(track.album.as_deref(), Some("Album"));
        assert_eq!(track.duration_seconds, Some(180));
        assert!(!args.is_complete());
    }

    #[test]
    fn test_cli_parses_edit() {
        let cli = Cli::try_parse_from(["lyricsync", "edit", "abc", "--synced", "--text", "[00:01.00]hi"])
            .unwrap();
        match cli.command {
            Command::Edit {
                song_id, mode, text, ..
            } => {
                assert_eq!(song_id, "abc");
                assert!(mode.synced);
                assert_eq!(text.as_deref(), Some("[00:01.00]hi"));
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Cli::try_parse_from(["lyricsync", "edit", "abc"]).is_err());
    }

    #[test]
    fn test_plain_flag_overrides_synced_default() {
        let mut cfg = config::Config::default();
        cfg.lyrics.synchronized = true;

        fn pick(cfg: &config::Config, args: &[&str]) -> LyricsMode {
            match Cli::try_parse_from(args).unwrap().command {
                Command::Show { mode, .. } => mode.pick(cfg),
                other => panic!("unexpected command {other:?}"),
            }
        }
        assert_eq!(pick(&cfg, &["lyricsync", "show", "abc"]), LyricsMode::Synchronized);
        assert_eq!(pick(&cfg, &["lyricsync", "show", "abc", "--plain"]), LyricsMode::Plain);
        assert!(Cli::try_parse_from(["lyricsync", "show", "abc", "--plain", "--synced"]).is_err());
    }
}
