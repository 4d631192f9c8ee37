//! Persisted lyrics entity.
//!
//! Each variant of a song's lyrics is tracked in one of three states. `Empty`
//! means a provider was asked and had nothing, which must never trigger another
//! fetch; `Unset` means nobody has asked yet (or the user cleared it).

use serde::{Deserialize, Serialize};

/// Which lyrics variant is requested or displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LyricsMode {
    Plain,
    Synchronized,
}

impl LyricsMode {
    pub fn from_synced_flag(synced: bool) -> Self {
        if synced {
            LyricsMode::Synchronized
        } else {
            LyricsMode::Plain
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LyricsMode::Plain => "plain",
            LyricsMode::Synchronized => "synchronized",
        }
    }

    /// Column holding this variant in the lyrics table.
    pub(crate) fn column(self) -> &'static str {
        match self {
            LyricsMode::Plain => "fixed",
            LyricsMode::Synchronized => "synced",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LyricsField {
    #[default]
    Unset,
    Empty,
    Value(String),
}

impl LyricsField {
    /// Provider answers map `None` and `""` to `Empty`.
    pub fn from_fetched(fetched: Option<String>) -> Self {
        match fetched {
            Some(text) if !text.is_empty() => LyricsField::Value(text),
            _ => LyricsField::Empty,
        }
    }

    /// SQL NULL is `Unset`, the empty string is `Empty`.
    pub fn from_column(value: Option<String>) -> Self {
        match value {
            None => LyricsField::Unset,
            Some(text) if text.is_empty() => LyricsField::Empty,
            Some(text) => LyricsField::Value(text),
        }
    }

    pub fn to_column(&self) -> Option<&str> {
        match self {
            LyricsField::Unset => None,
            LyricsField::Empty => Some(""),
            LyricsField::Value(text) => Some(text.as_str()),
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, LyricsField::Unset)
    }

    pub fn has_text(&self) -> bool {
        matches!(self, LyricsField::Value(_))
    }

    /// Text as displayed: `None` while unset, `""` when confirmed unavailable.
    pub fn text(&self) -> Option<&str> {
        self.to_column()
    }
}

impl From<&str> for LyricsField {
    fn from(text: &str) -> Self {
        if text.is_empty() {
            LyricsField::Empty
        } else {
            LyricsField::Value(text.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricsRecord {
    pub song_id: String,
    pub fixed: LyricsField,
    pub synced: LyricsField,
}

impl LyricsRecord {
    pub fn new(song_id: impl Into<String>) -> Self {
        Self {
            song_id: song_id.into(),
            fixed: LyricsField::Unset,
            synced: LyricsField::Unset,
        }
    }

    pub fn field(&self, mode: LyricsMode) -> &LyricsField {
        match mode {
            LyricsMode::Plain => &self.fixed,
            LyricsMode::Synchronized => &self.synced,
        }
    }

    /// Copy of this record with only the `mode` field replaced.
    pub fn with_field(&self, mode: LyricsMode, field: LyricsField) -> Self {
        let mut next = self.clone();
        match mode {
            LyricsMode::Plain => next.fixed = field,
            LyricsMode::Synchronized => next.synced = field,
        }
        next
    }
}

/// Field for `mode` on a possibly missing record.
pub fn field_of(record: Option<&LyricsRecord>, mode: LyricsMode) -> &LyricsField {
    const UNSET: &LyricsField = &LyricsField::Unset;
    record.map(|r| r.field(mode)).unwrap_or(UNSET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_states_are_distinct() {
        assert_eq!(LyricsField::from_column(None), LyricsField::Unset);
        assert_eq!(LyricsField::from_column(Some(String::new())), LyricsField::Empty);
        assert_eq!(
            LyricsField::from_column(Some("la".into())),
            LyricsField::Value("la".into())
        );
        assert_eq!(LyricsField::Empty.to_column(), Some(""));
        assert_eq!(LyricsField::Unset.to_column(), None);
    }

    #[test]
    fn test_fetched_nothing_is_empty() {
        assert_eq!(LyricsField::from_fetched(None), LyricsField::Empty);
        assert_eq!(LyricsField::from_fetched(Some(String::new())), LyricsField::Empty);
        assert!(LyricsField::from_fetched(Some("x".into())).has_text());
    }

    #[test]
    fn test_with_field_keeps_other_variant() {
        let rec = LyricsRecord {
            song_id: "abc".into(),
            fixed: LyricsField::Value("plain".into()),
            synced: LyricsField::Empty,
        };
        let next = rec.with_field(LyricsMode::Synchronized, LyricsField::Unset);
        assert_eq!(next.fixed, LyricsField::Value("plain".into()));
        assert!(next.synced.is_unset());
        assert!(field_of(None, LyricsMode::Plain).is_unset());
    }
}
