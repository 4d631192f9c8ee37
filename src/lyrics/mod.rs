//! Lyrics acquisition and synchronization
//!
//! - cache-first resolution of plain and synchronized lyrics per song
//! - LRC parsing and the playback cursor over synchronized lines
//! - on-demand translation of displayed lines

pub mod cursor;
pub mod error;
pub mod lrclib;
pub mod parser;
pub mod provider;
pub mod record;
pub mod resolver;
pub mod translate;

pub use cursor::{follow_clock, SyncCursor};
pub use error::LyricsError;
pub use lrclib::LrclibClient;
pub use parser::{SyncedLine, SyncedLyrics};
pub use provider::{LyricsProvider, ProviderGateway};
pub use record::{LyricsField, LyricsMode, LyricsRecord};
pub use resolver::{LyricsResolver, LyricsSubscription, LyricsView, ResolverOptions};
pub use translate::{GoogleTranslator, TranslatedLyrics, TranslationRelay, Translator};
