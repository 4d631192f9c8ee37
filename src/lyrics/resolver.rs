//! Cache-first lyrics resolution.
//!
//! A subscription follows one song's row in the [`LyricsStore`]. Whenever the
//! field for the requested mode is unset, the subscription fetches it from the
//! provider and writes it back; the store's change notification then carries
//! the result to every subscriber of that song.
//!
//! Only one fetch per (song, mode) runs at a time. Subscribers that find a fetch
//! already running wait for the store update, or for a failure notice from the
//! fetching subscription.

use super::error::LyricsError;
use super::provider::LyricsProvider;
use super::record::{field_of, LyricsField, LyricsMode, LyricsRecord};
use crate::player::PlaybackClock;
use crate::storage::{LyricsStore, StoreError};
use crate::ytm::models::Track;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::{CancellationToken, DropGuard};

#[derive(Debug, Clone, Copy)]
pub struct ResolverOptions {
    /// Interval between duration checks while the player is still loading
    pub duration_poll: Duration,
    /// Give up on a synchronized fetch if no duration shows up within this
    pub duration_wait: Duration,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            duration_poll: Duration::from_millis(100),
            duration_wait: Duration::from_secs(10),
        }
    }
}

/// What a subscriber currently knows about one (song, mode) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct LyricsView {
    pub mode: LyricsMode,
    pub record: Option<LyricsRecord>,
    /// A fetch is running for this pair, here or in another subscription
    pub fetching: bool,
    /// Sticky until lyrics with text arrive for this mode
    pub failed: bool,
    /// Set when the store failed and the subscription stopped
    pub store_error: Option<String>,
}

impl LyricsView {
    fn new(mode: LyricsMode) -> Self {
        Self {
            mode,
            record: None,
            fetching: false,
            failed: false,
            store_error: None,
        }
    }

    pub fn field(&self) -> &LyricsField {
        field_of(self.record.as_ref(), self.mode)
    }

    /// Displayed (and copyable) text; `Some("")` means no lyrics exist.
    pub fn text(&self) -> Option<&str> {
        self.field().text()
    }

    pub fn is_resolved(&self) -> bool {
        !self.field().is_unset()
    }

    /// Placeholder condition: nothing to show yet and nothing went wrong.
    pub fn is_loading(&self) -> bool {
        !self.is_resolved() && !self.failed && self.store_error.is_none()
    }

    fn is_settled(&self) -> bool {
        self.is_resolved() || self.failed || self.store_error.is_some()
    }
}

/// Live resolution of one (song, mode) pair. Dropping it cancels any wait or
/// fetch it owns.
pub struct LyricsSubscription {
    view: watch::Receiver<LyricsView>,
    _cancel: DropGuard,
}

impl LyricsSubscription {
    pub fn view(&self) -> LyricsView {
        self.view.borrow().clone()
    }

    /// Next emitted view, `None` once the subscription has stopped.
    pub async fn changed(&mut self) -> Option<LyricsView> {
        self.view.changed().await.ok()?;
        Some(self.view.borrow_and_update().clone())
    }

    /// Wait until lyrics are present (possibly empty), a fetch failed, or the
    /// store broke.
    pub async fn settled(&mut self) -> LyricsView {
        loop {
            {
                let view = self.view.borrow_and_update();
                if view.is_settled() {
                    return view.clone();
                }
            }
            if self.view.changed().await.is_err() {
                return self.view.borrow().clone();
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FetchKey {
    song_id: String,
    mode: LyricsMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchOutcome {
    Stored,
    Failed,
    Abandoned,
}

#[derive(Debug, Clone)]
struct FetchNotice {
    key: FetchKey,
    outcome: FetchOutcome,
}

#[derive(Debug, Clone)]
struct InFlight {
    keys: Arc<Mutex<HashSet<FetchKey>>>,
    notices: broadcast::Sender<FetchNotice>,
}

impl InFlight {
    fn new() -> Self {
        let (notices, _) = broadcast::channel(64);
        Self {
            keys: Arc::new(Mutex::new(HashSet::new())),
            notices,
        }
    }

    fn claim(&self, key: &FetchKey) -> Option<FetchClaim> {
        if !self.keys.lock().insert(key.clone()) {
            return None;
        }
        Some(FetchClaim {
            in_flight: self.clone(),
            key: key.clone(),
            outcome: FetchOutcome::Abandoned,
        })
    }
}

/// Exclusive right to fetch one pair. Released on drop; waiters are told
/// unless the result reached the store.
struct FetchClaim {
    in_flight: InFlight,
    key: FetchKey,
    outcome: FetchOutcome,
}

impl FetchClaim {
    fn settle(mut self, outcome: FetchOutcome) {
        self.outcome = outcome;
    }
}

impl Drop for FetchClaim {
    fn drop(&mut self) {
        self.in_flight.keys.lock().remove(&self.key);
        if self.outcome != FetchOutcome::Stored {
            let _ = self.in_flight.notices.send(FetchNotice {
                key: self.key.clone(),
                outcome: self.outcome,
            });
        }
    }
}

struct Shared<P, C> {
    store: Arc<LyricsStore>,
    provider: P,
    clock: C,
    options: ResolverOptions,
    in_flight: InFlight,
}

pub struct LyricsResolver<P, C> {
    shared: Arc<Shared<P, C>>,
}

impl<P, C> Clone for LyricsResolver<P, C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<P, C> LyricsResolver<P, C>
where
    P: LyricsProvider,
    C: PlaybackClock,
{
    pub fn new(store: Arc<LyricsStore>, provider: P, clock: C, options: ResolverOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                provider,
                clock,
                options,
                in_flight: InFlight::new(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<LyricsStore> {
        &self.shared.store
    }

    /// Follow `track`'s lyrics for `mode`, fetching the variant if it was never
    /// resolved.
    pub async fn resolve(
        &self,
        track: Track,
        mode: LyricsMode,
    ) -> Result<LyricsSubscription, LyricsError> {
        let song_id = track.video_id.clone();
        let records = with_store(&self.shared.store, move |store| store.subscribe(&song_id)).await?;

        let (view_tx, view_rx) = watch::channel(LyricsView::new(mode));
        let cancel = CancellationToken::new();
        tokio::spawn(
            self.shared
                .clone()
                .drive(track, mode, records, view_tx, cancel.clone()),
        );

        Ok(LyricsSubscription {
            view: view_rx,
            _cancel: cancel.drop_guard(),
        })
    }

    /// Replace the `mode` variant with user-entered text.
    pub async fn edit(&self, track: &Track, mode: LyricsMode, text: &str) -> Result<(), LyricsError> {
        let track = track.clone();
        let field = LyricsField::from(text);
        with_store(&self.shared.store, move |store| {
            store.ensure_song(&track)?;
            store.set_field(&track.video_id, mode, &field)
        })
        .await?;
        Ok(())
    }

    /// Forget the `mode` variant so live subscriptions fetch it again.
    pub async fn clear_and_refetch(&self, song_id: &str, mode: LyricsMode) -> Result<(), LyricsError> {
        let song_id = song_id.to_string();
        with_store(&self.shared.store, move |store| {
            store.set_field(&song_id, mode, &LyricsField::Unset)
        })
        .await?;
        Ok(())
    }
}

impl<P, C> Shared<P, C>
where
    P: LyricsProvider,
    C: PlaybackClock,
{
    async fn drive(
        self: Arc<Self>,
        track: Track,
        mode: LyricsMode,
        mut records: watch::Receiver<Option<LyricsRecord>>,
        view_tx: watch::Sender<LyricsView>,
        cancel: CancellationToken,
    ) {
        let key = FetchKey {
            song_id: track.video_id.clone(),
            mode,
        };
        let mut notices = self.in_flight.notices.subscribe();
        let mut failed = false;
        let mut should_fetch = true;

        loop {
            let record = records.borrow_and_update().clone();
            let unset = field_of(record.as_ref(), mode).is_unset();
            if field_of(record.as_ref(), mode).has_text() {
                failed = false;
            }

            let mut view = LyricsView {
                mode,
                record,
                fetching: false,
                failed,
                store_error: None,
            };

            if unset && should_fetch {
                match self.in_flight.claim(&key) {
                    Some(claim) => {
                        view.fetching = true;
                        view_tx.send_replace(view.clone());

                        let fetched = tokio::select! {
                            _ = cancel.cancelled() => return,
                            fetched = self.fetch(&track, mode) => fetched,
                        };

                        match fetched {
                            Ok(field) => {
                                let song_id = key.song_id.clone();
                                let stored = with_store(&self.store, move |store| {
                                    store.fill_if_unset(&song_id, mode, &field)
                                })
                                .await;
                                if let Err(e) = stored {
                                    tracing::error!(song_id = %key.song_id, "storing lyrics failed: {e}");
                                    view.fetching = false;
                                    view.store_error = Some(e.to_string());
                                    view_tx.send_replace(view);
                                    return;
                                }
                                claim.settle(FetchOutcome::Stored);
                            }
                            Err(e) => {
                                tracing::warn!("{e}");
                                claim.settle(FetchOutcome::Failed);
                                failed = true;
                                should_fetch = false;
                                view.fetching = false;
                                view.failed = true;
                                view_tx.send_replace(view);
                            }
                        }
                    }
                    None => {
                        view.fetching = true;
                        view_tx.send_replace(view);
                    }
                }
            } else {
                view_tx.send_replace(view);
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = records.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    should_fetch = true;
                }
                notice = notices.recv() => match notice {
                    Ok(notice) if notice.key == key => match notice.outcome {
                        FetchOutcome::Failed => {
                            failed = true;
                            should_fetch = false;
                        }
                        FetchOutcome::Abandoned => should_fetch = true,
                        FetchOutcome::Stored => {}
                    },
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => should_fetch = true,
                    Err(broadcast::error::RecvError::Closed) => return,
                },
            }
        }
    }

    async fn fetch(&self, track: &Track, mode: LyricsMode) -> Result<LyricsField, LyricsError> {
        let song_id = track.video_id.as_str();
        tracing::info!(song_id, mode = mode.label(), "fetching lyrics");

        let fetched = match mode {
            LyricsMode::Plain => self.provider.fetch_plain(song_id).await,
            LyricsMode::Synchronized => {
                let duration_ms = self.wait_for_duration(song_id).await?;
                self.provider
                    .fetch_synchronized(track.primary_artist(), &track.title, duration_ms / 1000)
                    .await
            }
        };

        let field = LyricsField::from_fetched(fetched.map_err(|cause| LyricsError::Fetch {
            song_id: song_id.to_string(),
            mode,
            cause,
        })?);
        tracing::info!(song_id, mode = mode.label(), found = field.has_text(), "lyrics fetched");
        Ok(field)
    }

    async fn wait_for_duration(&self, song_id: &str) -> Result<u64, LyricsError> {
        let started = tokio::time::Instant::now();
        loop {
            if let Some(duration_ms) = self.clock.duration_ms() {
                return Ok(duration_ms);
            }
            if started.elapsed() >= self.options.duration_wait {
                return Err(LyricsError::DurationUnavailable {
                    song_id: song_id.to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(self.options.duration_poll).await;
        }
    }
}

/// Run a store operation off the async workers.
async fn with_store<T, F>(store: &Arc<LyricsStore>, f: F) -> Result<T, StoreError>
where
    F: FnOnce(&LyricsStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(&store)).await?
}
