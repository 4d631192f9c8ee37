//! LRCLIB API client
//!
//! LRCLIB is a free lyrics API that provides synchronized (LRC format) lyrics.
//! API Documentation: https://lrclib.net/docs

use anyhow::Context;
use serde::Deserialize;
use std::time::Duration;

/// Search hits further than this from the playing track's length are ignored
const DURATION_TOLERANCE_SECS: f64 = 3.0;

/// LRCLIB API response
#[derive(Debug, Deserialize, Clone)]
pub struct LrclibResponse {
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(rename = "plainLyrics")]
    pub plain_lyrics: Option<String>,
    #[serde(rename = "syncedLyrics")]
    pub synced_lyrics: Option<String>,
}

/// LRCLIB API client
#[derive(Debug, Clone)]
pub struct LrclibClient {
    client: reqwest::Client,
    base_url: String,
}

impl LrclibClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://lrclib.net/api";
    const USER_AGENT: &'static str = concat!("lyricsync/", env!("CARGO_PKG_VERSION"));

    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(Self::USER_AGENT)
            .timeout(timeout)
            .build()
            .context("build lrclib client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Synchronized lyrics for a track, `Ok(None)` if LRCLIB has none
    pub async fn synced_lyrics(
        &self,
        track_name: &str,
        artist_name: &str,
        duration_secs: u64,
    ) -> anyhow::Result<Option<String>> {
        // First try the "get" endpoint with exact match
        if let Some(lyrics) = self.get_exact(track_name, artist_name, duration_secs).await?
            && let Some(synced) = non_empty(lyrics.synced_lyrics)
        {
            return Ok(Some(synced));
        }

        // Fall back to search
        let results = self.search(track_name, artist_name).await?;
        Ok(pick_synced(results, duration_secs))
    }

    /// Get lyrics with exact match
    async fn get_exact(
        &self,
        track_name: &str,
        artist_name: &str,
        duration_secs: u64,
    ) -> anyhow::Result<Option<LrclibResponse>> {
        let url = format!(
            "{}/get?track_name={}&artist_name={}&duration={}",
            self.base_url,
            urlencoding::encode(track_name),
            urlencoding::encode(artist_name),
            duration_secs
        );

        let response = self.client.get(&url).send().await.context("send lrclib get")?;

        if response.status().is_success() {
            let lyrics: LrclibResponse = response.json().await.context("parse lrclib get")?;
            Ok(Some(lyrics))
        } else if response.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(None)
        } else {
            anyhow::bail!("LRCLIB API error: {}", response.status());
        }
    }

    /// Search for lyrics
    async fn search(
        &self,
        track_name: &str,
        artist_name: &str,
    ) -> anyhow::Result<Vec<LrclibResponse>> {
        let url = format!(
            "{}/search?track_name={}&artist_name={}",
            self.base_url,
            urlencoding::encode(track_name),
            urlencoding::encode(artist_name)
        );

        let response = self.client.get(&url).send().await.context("send lrclib search")?;

        if response.status().is_success() {
            response.json().await.context("parse lrclib search")
        } else if response.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(Vec::new())
        } else {
            anyhow::bail!("LRCLIB search error: {}", response.status());
        }
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}

/// Closest-length search hit that carries synced lyrics
fn pick_synced(results: Vec<LrclibResponse>, duration_secs: u64) -> Option<String> {
    let target = duration_secs as f64;
    results
        .into_iter()
        .filter_map(|r| {
            let delta = r.duration.map(|d| (d - target).abs());
            let synced = non_empty(r.synced_lyrics)?;
            match delta {
                Some(delta) if delta > DURATION_TOLERANCE_SECS => None,
                Some(delta) => Some((delta, synced)),
                None => Some((DURATION_TOLERANCE_SECS, synced)),
            }
        })
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, synced)| synced)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(duration: Option<f64>, synced: Option<&str>) -> LrclibResponse {
        LrclibResponse {
            duration,
            plain_lyrics: Some("plain".into()),
            synced_lyrics: synced.map(str::to_string),
        }
    }

    #[test]
    fn test_pick_closest_synced_hit() {
        let results = vec![
            hit(Some(200.0), Some("[00:01.00]far")),
            hit(Some(181.0), None),
            hit(Some(182.0), Some("[00:01.00]near")),
            hit(Some(179.5), Some("[00:01.00]nearest")),
        ];
        assert_eq!(pick_synced(results, 180).as_deref(), Some("[00:01.00]nearest"));
    }

    #[test]
    fn test_pick_ignores_blank_and_far_hits() {
        let results = vec![hit(Some(180.0), Some("  ")), hit(Some(240.0), Some("[00:01.00]x"))];
        assert_eq!(pick_synced(results, 180), None);
    }

    #[test]
    fn test_response_deserializes_nulls() {
        let raw = r#"{"id":1,"trackName":"t","artistName":"a","albumName":null,"duration":180.0,"instrumental":false,"plainLyrics":null,"syncedLyrics":"[00:01.00]x"}"#;
        let r: LrclibResponse = serde_json::from_str(raw).unwrap();
        assert!(r.plain_lyrics.is_none());
        assert_eq!(r.synced_lyrics.as_deref(), Some("[00:01.00]x"));
    }
}
