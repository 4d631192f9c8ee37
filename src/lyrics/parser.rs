//! LRC format parser
//!
//! Parses synchronized lyrics in LRC format:
//! [mm:ss.xx] Lyrics line here
//!
//! Example:
//! [00:12.34] Hello world
//! [00:15.00] Another line

use std::fmt::Write as _;

/// A single line of lyrics with timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedLine {
    /// Timestamp in milliseconds from start
    pub timestamp_ms: u64,
    /// The lyrics text, empty for instrumental gaps
    pub text: String,
}

impl SyncedLine {
    pub fn new(timestamp_ms: u64, text: impl Into<String>) -> Self {
        Self {
            timestamp_ms,
            text: text.into(),
        }
    }
}

/// A synchronized lyrics track, ordered by timestamp
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncedLyrics {
    pub lines: Vec<SyncedLine>,
}

impl SyncedLyrics {
    /// Parse LRC formatted lyrics
    pub fn parse(content: &str) -> Self {
        let mut lines = Vec::new();
        let mut offset_ms: i64 = 0;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            // Metadata tags like [ti:Title]; only [offset:] affects timing
            if let Some((tag, value)) = Self::parse_metadata(line) {
                if tag.eq_ignore_ascii_case("offset") {
                    offset_ms = value.trim_start_matches('+').parse().unwrap_or(0);
                }
                continue;
            }

            if let Some(parsed) = Self::parse_timed_line(line) {
                lines.extend(parsed);
                continue;
            }

            // Plain text line (no timestamp)
            if !line.starts_with('[') {
                lines.push(SyncedLine::new(0, line));
            }
        }

        // A positive offset makes lyrics appear sooner
        if offset_ms != 0 {
            for line in &mut lines {
                let shifted = i128::from(line.timestamp_ms) - i128::from(offset_ms);
                line.timestamp_ms = u64::try_from(shifted.max(0)).unwrap_or(u64::MAX);
            }
        }

        // Stable sort keeps duplicate timestamps in source order
        lines.sort_by_key(|l| l.timestamp_ms);

        Self { lines }
    }

    /// Serialize back to LRC, one `[mm:ss.xx]` line per entry
    pub fn to_lrc(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let _ = write!(out, "[{}]{}", format_timestamp(line.timestamp_ms), line.text);
        }
        out
    }

    /// Whether any line of `content` carries a timestamp.
    pub fn is_timed(content: &str) -> bool {
        content
            .lines()
            .any(|line| Self::parse_timed_line(line.trim()).is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Parse metadata tag like [ti:Title]
    fn parse_metadata(line: &str) -> Option<(String, String)> {
        if !line.starts_with('[') || !line.contains(':') {
            return None;
        }

        let end = line.find(']')?;
        let tag_content = &line[1..end];

        // Check if it looks like a metadata tag (not a timestamp)
        let colon_pos = tag_content.find(':')?;
        let tag = &tag_content[..colon_pos];

        let short_tag = tag.len() <= 3 && tag.chars().all(|c| c.is_ascii_alphabetic());
        if short_tag || tag.eq_ignore_ascii_case("offset") {
            let value = tag_content[colon_pos + 1..].trim().to_string();
            return Some((tag.to_string(), value));
        }

        None
    }

    /// Parse a timed line like [00:12.34]Lyrics or [00:12.34][00:15.00]Lyrics
    fn parse_timed_line(line: &str) -> Option<Vec<SyncedLine>> {
        let mut timestamps = Vec::new();
        let mut pos = 0;

        // Extract all timestamps at the beginning
        while pos < line.len() && line[pos..].starts_with('[') {
            let Some(end) = line[pos..].find(']') else {
                break;
            };
            let Some(ms) = parse_timestamp(&line[pos + 1..pos + end]) else {
                break;
            };
            timestamps.push(ms);
            pos += end + 1;
        }

        if timestamps.is_empty() {
            return None;
        }

        let text = line[pos..].trim();
        Some(
            timestamps
                .into_iter()
                .map(|ts| SyncedLine::new(ts, text))
                .collect(),
        )
    }
}

/// Parse timestamp string like "00:12.34" or "00:12:34" to milliseconds
fn parse_timestamp(s: &str) -> Option<u64> {
    // Format: mm:ss.xx or mm:ss:xx or mm:ss
    let parts: Vec<&str> = s.split([':', '.']).collect();

    match parts.len() {
        2 => {
            let min: u64 = parts[0].parse().ok()?;
            let sec: u64 = parts[1].parse().ok()?;
            to_millis(min, sec, 0)
        }
        3 => {
            let min: u64 = parts[0].parse().ok()?;
            let sec: u64 = parts[1].parse().ok()?;
            let frac = parts[2];
            // Handle both "34" (centiseconds) and "340" (milliseconds)
            let ms: u64 = match frac.len() {
                1 => frac.parse::<u64>().ok()? * 100,
                2 => frac.parse::<u64>().ok()? * 10,
                3 => frac.parse().ok()?,
                _ => return None,
            };
            to_millis(min, sec, ms)
        }
        _ => None,
    }
}

/// `None` when the stamp does not fit in a u64 of milliseconds
fn to_millis(min: u64, sec: u64, ms: u64) -> Option<u64> {
    min.checked_mul(60_000)?
        .checked_add(sec.checked_mul(1000)?)?
        .checked_add(ms)
}

/// Centiseconds when exact, milliseconds otherwise, so parsing gives the same value back
pub fn format_timestamp(ms: u64) -> String {
    let min = ms / 60_000;
    let sec = (ms % 60_000) / 1000;
    let frac = ms % 1000;
    if frac % 10 == 0 {
        format!("{:02}:{:02}.{:02}", min, sec, frac / 10)
    } else {
        format!("{:02}:{:02}.{:03}", min, sec, frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("00:12"), Some(12000));
        assert_eq!(parse_timestamp("01:30"), Some(90000));
        assert_eq!(parse_timestamp("00:12.34"), Some(12340));
        assert_eq!(parse_timestamp("00:12.340"), Some(12340));
        assert_eq!(parse_timestamp("00:12:34"), Some(12340));
        assert_eq!(parse_timestamp("ti:Title"), None);
    }

    #[test]
    fn test_parse_lrc() {
        let lrc = r#"
[ti:Test Song]
[ar:Test Artist]
[00:12.34]First line
[00:15.00]Second line
"#;
        let parsed = SyncedLyrics::parse(lrc);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.lines[0].timestamp_ms, 12340);
        assert_eq!(parsed.lines[0].text, "First line");
    }

    #[test]
    fn test_parse_keeps_gaps_and_duplicates() {
        let lrc = "[00:03.00]third\n[00:01.00][00:03.00]repeat\n[00:02.00]\n";
        let parsed = SyncedLyrics::parse(lrc);
        let stamps: Vec<u64> = parsed.lines.iter().map(|l| l.timestamp_ms).collect();
        assert_eq!(stamps, vec![1000, 2000, 3000, 3000]);
        assert_eq!(parsed.lines[1].text, "");
        assert_eq!(parsed.lines[2].text, "third");
        assert_eq!(parsed.lines[3].text, "repeat");
    }

    #[test]
    fn test_offset_tag_shifts_lines() {
        let parsed = SyncedLyrics::parse("[offset:+500]\n[00:01.00]a\n[00:00.20]b");
        assert_eq!(parsed.lines[0].timestamp_ms, 0);
        assert_eq!(parsed.lines[1].timestamp_ms, 500);
    }

    #[test]
    fn test_oversized_stamps_are_dropped() {
        assert_eq!(parse_timestamp("400000000000000:00.00"), None);
        assert_eq!(parse_timestamp("00:18446744073709551615"), None);

        let parsed = SyncedLyrics::parse("[400000000000000:00.00]x\n[00:02.00]y");
        assert_eq!(parsed.lines, vec![SyncedLine::new(2000, "y")]);
    }

    #[test]
    fn test_extreme_offsets_clamp() {
        let parsed = SyncedLyrics::parse("[offset:-9223372036854775808]\n[00:01.00]x");
        assert_eq!(parsed.lines[0].timestamp_ms, 9_223_372_036_854_776_808);

        let parsed = SyncedLyrics::parse("[offset:9223372036854775807]\n[00:01.00]x");
        assert_eq!(parsed.lines[0].timestamp_ms, 0);
    }

    #[test]
    fn test_untimed_text_is_detected() {
        assert!(!SyncedLyrics::is_timed("just words\nmore words"));
        assert!(SyncedLyrics::is_timed("[ar:Someone]\n[00:01.00]hi"));
        assert!(!SyncedLyrics::is_timed("[ar:Someone]\n"));
    }

    #[test]
    fn test_format_parses_back() {
        let track = SyncedLyrics {
            lines: vec![
                SyncedLine::new(0, "a"),
                SyncedLine::new(61_230, "b"),
                SyncedLine::new(62_005, ""),
            ],
        };
        let lrc = track.to_lrc();
        assert_eq!(lrc, "[00:00.00]a\n[01:01.23]b\n[01:02.005]");
        assert_eq!(SyncedLyrics::parse(&lrc), track);
    }
}
