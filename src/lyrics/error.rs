use super::record::LyricsMode;
use crate::storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum LyricsError {
    /// Provider call failed or returned malformed data.
    #[error("fetching {mode:?} lyrics for {song_id} failed: {cause:#}")]
    Fetch {
        song_id: String,
        mode: LyricsMode,
        cause: anyhow::Error,
    },
    /// Playback never reported a duration within the wait deadline.
    #[error("duration for {song_id} still unknown after {waited_ms}ms")]
    DurationUnavailable { song_id: String, waited_ms: u64 },
    #[error(transparent)]
    Persistence(#[from] StoreError),
}

