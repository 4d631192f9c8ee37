pub mod clock;
pub mod mpv;

pub use clock::{PlaybackClock, PlayerClock};

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Started,
    Paused,
    Position { seconds: f64 },
    /// `None` while no file is loaded
    Duration { seconds: Option<f64> },
    Ended,
    Error(String),
}
