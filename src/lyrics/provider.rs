use super::lrclib::LrclibClient;
use crate::ytm::api::YtmClient;
use std::future::Future;

/// Remote lyrics sources. `Ok(None)` means the provider answered but has nothing.
pub trait LyricsProvider: Send + Sync + 'static {
    fn fetch_plain(&self, song_id: &str)
    -> impl Future<Output = anyhow::Result<Option<String>>> + Send;

    fn fetch_synchronized(
        &self,
        artist: &str,
        title: &str,
        duration_secs: u64,
    ) -> impl Future<Output = anyhow::Result<Option<String>>> + Send;
}

/// Plain lyrics from YouTube Music, synchronized lyrics from LRCLIB.
#[derive(Debug, Clone)]
pub struct ProviderGateway {
    ytm: YtmClient,
    lrclib: LrclibClient,
}

impl ProviderGateway {
    pub fn new(ytm: YtmClient, lrclib: LrclibClient) -> Self {
        Self { ytm, lrclib }
    }
}

impl LyricsProvider for ProviderGateway {
    async fn fetch_plain(&self, song_id: &str) -> anyhow::Result<Option<String>> {
        self.ytm.lyrics(song_id).await
    }

    async fn fetch_synchronized(
        &self,
        artist: &str,
        title: &str,
        duration_secs: u64,
    ) -> anyhow::Result<Option<String>> {
        self.lrclib.synced_lyrics(title, artist, duration_secs).await
    }
}

impl<T: LyricsProvider> LyricsProvider for std::sync::Arc<T> {
    fn fetch_plain(
        &self,
        song_id: &str,
    ) -> impl Future<Output = anyhow::Result<Option<String>>> + Send {
        (**self).fetch_plain(song_id)
    }

    fn fetch_synchronized(
        &self,
        artist: &str,
        title: &str,
        duration_secs: u64,
    ) -> impl Future<Output = anyhow::Result<Option<String>>> + Send {
        (**self).fetch_synchronized(artist, title, duration_secs)
    }
}
