use super::parser::SyncedLine;
use crate::player::PlaybackClock;

/// Tracks the active line of a synchronized track against playback position.
///
/// `position` is polled on every [`SyncCursor::tick`]; callers pass a closure
/// that already includes any lookahead bias.
pub struct SyncCursor<F> {
    lines: Vec<SyncedLine>,
    index: usize,
    position: F,
}

impl<F> SyncCursor<F>
where
    F: Fn() -> u64,
{
    pub fn new(lines: Vec<SyncedLine>, position: F) -> Self {
        let mut cursor = Self {
            lines,
            index: 0,
            position,
        };
        cursor.tick();
        cursor
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn lines(&self) -> &[SyncedLine] {
        &self.lines
    }

    pub fn current(&self) -> Option<&SyncedLine> {
        self.lines.get(self.index)
    }

    /// Where to seek when the user picks a line.
    pub fn timestamp_of(&self, index: usize) -> Option<u64> {
        self.lines.get(index).map(|l| l.timestamp_ms)
    }

    /// Re-read the position and move the index. Returns true if it changed.
    pub fn tick(&mut self) -> bool {
        if self.lines.is_empty() {
            return false;
        }

        let position = (self.position)();
        let previous = self.index;

        if position < self.lines[self.index].timestamp_ms {
            // Seek backwards
            self.index = self
                .lines
                .partition_point(|l| l.timestamp_ms <= position)
                .saturating_sub(1);
        } else {
            while self
                .lines
                .get(self.index + 1)
                .is_some_and(|next| next.timestamp_ms <= position)
            {
                self.index += 1;
            }
        }

        self.index != previous
    }
}

/// Cursor reading the player's position, shifted ahead by `lookahead_ms` so
/// highlighting does not trail the audio.
pub fn follow_clock<C: PlaybackClock>(
    lines: Vec<SyncedLine>,
    clock: C,
    lookahead_ms: u64,
) -> SyncCursor<impl Fn() -> u64> {
    SyncCursor::new(lines, move || clock.position_ms().saturating_add(lookahead_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn track(stamps: &[(u64, &str)]) -> Vec<SyncedLine> {
        stamps.iter().map(|(t, s)| SyncedLine::new(*t, *s)).collect()
    }

    fn cursor_with(lines: Vec<SyncedLine>) -> (SyncCursor<impl Fn() -> u64>, Rc<Cell<u64>>) {
        let pos = Rc::new(Cell::new(0));
        let source = pos.clone();
        (SyncCursor::new(lines, move || source.get()), pos)
    }

    #[test]
    fn test_index_follows_playback_and_seek() {
        let (mut cursor, pos) = cursor_with(track(&[(0, "a"), (1000, "b"), (3000, "c")]));
        let mut seen = Vec::new();
        for p in [0, 500, 1200, 2000, 900] {
            pos.set(p);
            cursor.tick();
            seen.push(cursor.index());
        }
        assert_eq!(seen, vec![0, 0, 1, 1, 0]);
    }

    #[test]
    fn test_skips_multiple_lines_on_fast_forward() {
        let (mut cursor, pos) =
            cursor_with(track(&[(0, "a"), (100, "b"), (200, "c"), (300, "d")]));
        pos.set(250);
        assert!(cursor.tick());
        assert_eq!(cursor.index(), 2);
        assert!(!cursor.tick());
        assert_eq!(cursor.current().map(|l| l.text.as_str()), Some("c"));
    }

    #[test]
    fn test_before_first_line_is_zero() {
        let (mut cursor, pos) = cursor_with(track(&[(500, "a"), (900, "b")]));
        assert_eq!(cursor.index(), 0);
        pos.set(1000);
        cursor.tick();
        assert_eq!(cursor.index(), 1);
        pos.set(10);
        assert!(cursor.tick());
        assert_eq!(cursor.index(), 0);
    }

    #[test]
    fn test_increasing_positions_never_move_back() {
        let lines = track(&[(0, "a"), (40, "b"), (40, "b2"), (95, "c"), (400, "d"), (401, "e")]);
        let (mut cursor, pos) = cursor_with(lines);
        let mut last = 0;
        for p in (0..600).step_by(7) {
            pos.set(p);
            cursor.tick();
            assert!(cursor.index() >= last);
            last = cursor.index();
        }
        assert_eq!(last, 5);
    }

    #[test]
    fn test_seek_lands_on_last_duplicate() {
        let (mut cursor, pos) = cursor_with(track(&[(0, "a"), (1000, "b"), (1000, "c"), (2000, "d")]));
        pos.set(5000);
        cursor.tick();
        pos.set(1500);
        cursor.tick();
        assert_eq!(cursor.index(), 2);
        assert_eq!(cursor.timestamp_of(2), Some(1000));
    }

    #[test]
    fn test_clock_lookahead() {
        use crate::player::clock::test_support::ManualClock;
        use std::sync::Arc;

        let clock = Arc::new(ManualClock::new(Some(10_000)));
        let mut cursor = follow_clock(track(&[(0, "a"), (1000, "b")]), clock.clone(), 50);
        clock.set_position(940);
        assert!(!cursor.tick());
        clock.set_position(950);
        assert!(cursor.tick());
        assert_eq!(cursor.index(), 1);
    }

    #[test]
    fn test_empty_track_never_changes() {
        let (mut cursor, pos) = cursor_with(Vec::new());
        pos.set(100);
        assert!(!cursor.tick());
        assert!(cursor.current().is_none());
    }
}
