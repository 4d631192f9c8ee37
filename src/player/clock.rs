use super::PlayerEvent;
use tokio::sync::{mpsc, watch};

/// Read-only view of playback progress.
pub trait PlaybackClock: Send + Sync + 'static {
    fn position_ms(&self) -> u64;
    /// `None` until the media has been loaded.
    fn duration_ms(&self) -> Option<u64>;
}

impl<T: PlaybackClock> PlaybackClock for std::sync::Arc<T> {
    fn position_ms(&self) -> u64 {
        (**self).position_ms()
    }

    fn duration_ms(&self) -> Option<u64> {
        (**self).duration_ms()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackStatus {
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
    pub paused: bool,
    pub ended: bool,
}

impl PlaybackStatus {
    pub fn apply(&mut self, event: &PlayerEvent) {
        match event {
            PlayerEvent::Started => {
                self.paused = false;
                self.ended = false;
            }
            PlayerEvent::Paused => self.paused = true,
            PlayerEvent::Position { seconds } => self.position_ms = seconds_to_ms(*seconds),
            PlayerEvent::Duration { seconds } => {
                self.duration_ms = seconds.filter(|s| *s > 0.0).map(seconds_to_ms)
            }
            PlayerEvent::Ended => self.ended = true,
            PlayerEvent::Error(message) => tracing::warn!("player: {message}"),
        }
    }
}

fn seconds_to_ms(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

/// Clock fed by the player's event stream.
#[derive(Debug, Clone)]
pub struct PlayerClock {
    rx: watch::Receiver<PlaybackStatus>,
}

impl PlayerClock {
    /// Fold player events into a status snapshot until the event channel closes.
    pub fn spawn(mut events: mpsc::Receiver<PlayerEvent>) -> Self {
        let (tx, rx) = watch::channel(PlaybackStatus::default());
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                tx.send_modify(|status| status.apply(&event));
            }
        });
        Self { rx }
    }

    pub fn status(&self) -> PlaybackStatus {
        *self.rx.borrow()
    }

    /// Resolves on the next status change, `false` once the player is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl PlaybackClock for PlayerClock {
    fn position_ms(&self) -> u64 {
        self.rx.borrow().position_ms
    }

    fn duration_ms(&self) -> Option<u64> {
        self.rx.borrow().duration_ms
    }
}

/// Clock for resolving lyrics without playback, using catalogue metadata.
#[derive(Debug, Clone, Copy)]
pub struct KnownDuration(pub Option<u64>);

impl PlaybackClock for KnownDuration {
    fn position_ms(&self) -> u64 {
        0
    }

    fn duration_ms(&self) -> Option<u64> {
        self.0
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::PlaybackClock;
    use std::sync::atomic::{AtomicU64, Ordering};

    const UNSET: u64 = u64::MAX;

    /// Clock whose values tests set directly.
    #[derive(Debug)]
    pub struct ManualClock {
        position: AtomicU64,
        duration: AtomicU64,
    }

    impl ManualClock {
        pub fn new(duration_ms: Option<u64>) -> Self {
            Self {
                position: AtomicU64::new(0),
                duration: AtomicU64::new(duration_ms.unwrap_or(UNSET)),
            }
        }

        pub fn set_duration(&self, duration_ms: u64) {
            self.duration.store(duration_ms, Ordering::SeqCst);
        }

        pub fn set_position(&self, position_ms: u64) {
            self.position.store(position_ms, Ordering::SeqCst);
        }
    }

    impl PlaybackClock for ManualClock {
        fn position_ms(&self) -> u64 {
            self.position.load(Ordering::SeqCst)
        }

        fn duration_ms(&self) -> Option<u64> {
            match self.duration.load(Ordering::SeqCst) {
                UNSET => None,
                ms => Some(ms),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_folds_events() {
        let mut status = PlaybackStatus::default();
        status.apply(&PlayerEvent::Duration { seconds: Some(180.0) });
        status.apply(&PlayerEvent::Position { seconds: 12.3456 });
        status.apply(&PlayerEvent::Paused);
        assert_eq!(status.duration_ms, Some(180_000));
        assert_eq!(status.position_ms, 12_346);
        assert!(status.paused);

        status.apply(&PlayerEvent::Duration { seconds: None });
        assert_eq!(status.duration_ms, None);
        status.apply(&PlayerEvent::Position { seconds: -1.0 });
        assert_eq!(status.position_ms, 0);
    }

    #[tokio::test]
    async fn test_player_clock_tracks_events() {
        let (tx, rx) = mpsc::channel(8);
        let mut clock = PlayerClock::spawn(rx);
        assert_eq!(clock.duration_ms(), None);

        tx.send(PlayerEvent::Duration { seconds: Some(200.0) }).await.unwrap();
        assert!(clock.changed().await);
        assert_eq!(clock.duration_ms(), Some(200_000));

        drop(tx);
        while clock.changed().await {}
        assert_eq!(clock.status().duration_ms, Some(200_000));
    }
}
