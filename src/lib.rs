//! Cached, synchronized lyrics for YouTube Music tracks.

pub mod config;
pub mod lyrics;
pub mod player;
pub mod storage;
pub mod ytm;
