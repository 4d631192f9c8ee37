use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub video_id: String,
    pub title: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub duration_seconds: Option<u32>,
}

impl Track {
    /// First credited artist; synced lyrics lookups match on this.
    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or("")
    }

    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }

    /// Query used for "search lyrics online".
    pub fn lyrics_search_query(&self) -> String {
        format!("{} {} lyrics", self.title, self.artist_line())
    }

    pub fn lyrics_search_url(&self) -> String {
        format!(
            "https://www.google.com/search?q={}",
            urlencoding::encode(&self.lyrics_search_query())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query() {
        let t = Track {
            video_id: "abc".into(),
            title: "Bella ciao".into(),
            artists: vec!["A".into(), "B".into()],
            album: None,
            duration_seconds: None,
        };
        assert_eq!(t.primary_artist(), "A");
        assert_eq!(t.lyrics_search_query(), "Bella ciao A, B lyrics");
        assert_eq!(
            t.lyrics_search_url(),
            "https://www.google.com/search?q=Bella%20ciao%20A%2C%20B%20lyrics"
        );
    }
}
