use crate::lyrics::{LyricsField, LyricsMode, LyricsRecord};
use crate::ytm::models::Track;
use anyhow::Context;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::watch;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("lyrics store: {0:#}")]
    Database(anyhow::Error),
    #[error("lyrics store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        StoreError::Database(e)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Raw SQLite access. Not shared; [`LyricsStore`] owns one behind a lock.
struct Storage {
    conn: Connection,
}

impl Storage {
    fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }

        let conn = Connection::open(path).with_context(|| format!("open {}", path.display()))?;
        let s = Self { conn };
        s.init_schema()?;
        Ok(s)
    }

    fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory db")?;
        let s = Self { conn };
        s.init_schema()?;
        Ok(s)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch(
                r#"
CREATE TABLE IF NOT EXISTS songs (
  song_id TEXT PRIMARY KEY,
  title TEXT NOT NULL,
  artists_json TEXT NOT NULL,
  album TEXT,
  duration_seconds INTEGER,
  updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS lyrics (
  song_id TEXT PRIMARY KEY,
  fixed TEXT,
  synced TEXT,
  updated_at INTEGER NOT NULL
);
"#,
            )
            .context("init schema")?;
        Ok(())
    }

    fn upsert_song(&self, track: &Track, now_unix: i64) -> anyhow::Result<()> {
        let artists_json = serde_json::to_string(&track.artists).context("encode artists")?;
        self.conn
            .execute(
                r#"
INSERT INTO songs(song_id, title, artists_json, album, duration_seconds, updated_at)
VALUES(?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(song_id) DO UPDATE SET
  title=excluded.title,
  artists_json=excluded.artists_json,
  album=COALESCE(excluded.album, songs.album),
  duration_seconds=COALESCE(excluded.duration_seconds, songs.duration_seconds),
  updated_at=excluded.updated_at
"#,
                params![
                    track.video_id,
                    track.title,
                    artists_json,
                    track.album,
                    track.duration_seconds,
                    now_unix
                ],
            )
            .context("upsert song")?;
        Ok(())
    }

    fn get_song(&self, song_id: &str) -> anyhow::Result<Option<Track>> {
        self.conn
            .query_row(
                "SELECT title, artists_json, album, duration_seconds FROM songs WHERE song_id=?1",
                params![song_id],
                |row| {
                    let artists_json: String = row.get(1)?;
                    Ok(Track {
                        video_id: song_id.to_string(),
                        title: row.get(0)?,
                        artists: serde_json::from_str(&artists_json).unwrap_or_default(),
                        album: row.get(2)?,
                        duration_seconds: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("query song")
    }

    fn get_lyrics(&self, song_id: &str) -> anyhow::Result<Option<LyricsRecord>> {
        self.conn
            .query_row(
                "SELECT fixed, synced FROM lyrics WHERE song_id=?1",
                params![song_id],
                |row| {
                    Ok(LyricsRecord {
                        song_id: song_id.to_string(),
                        fixed: LyricsField::from_column(row.get(0)?),
                        synced: LyricsField::from_column(row.get(1)?),
                    })
                },
            )
            .optional()
            .context("query lyrics")
    }

    fn upsert_lyrics(&self, record: &LyricsRecord, now_unix: i64) -> anyhow::Result<()> {
        self.conn
            .execute(
                r#"
INSERT INTO lyrics(song_id, fixed, synced, updated_at)
VALUES(?1, ?2, ?3, ?4)
ON CONFLICT(song_id) DO UPDATE SET
  fixed=excluded.fixed,
  synced=excluded.synced,
  updated_at=excluded.updated_at
"#,
                params![
                    record.song_id,
                    record.fixed.to_column(),
                    record.synced.to_column(),
                    now_unix
                ],
            )
            .context("upsert lyrics")?;
        Ok(())
    }

    /// Merge one column. With `only_if_unset` an existing non-NULL value wins.
    fn set_lyrics_field(
        &self,
        song_id: &str,
        mode: LyricsMode,
        field: &LyricsField,
        only_if_unset: bool,
        now_unix: i64,
    ) -> anyhow::Result<bool> {
        let col = mode.column();
        let guard = if only_if_unset {
            format!("WHERE lyrics.{col} IS NULL")
        } else {
            String::new()
        };
        let sql = format!(
            r#"
INSERT INTO lyrics(song_id, {col}, updated_at)
VALUES(?1, ?2, ?3)
ON CONFLICT(song_id) DO UPDATE SET
  {col}=excluded.{col},
  updated_at=excluded.updated_at
{guard}
"#
        );
        let changed = self
            .conn
            .execute(&sql, params![song_id, field.to_column(), now_unix])
            .with_context(|| format!("write {col} lyrics"))?;
        Ok(changed > 0)
    }
}

/// Lyrics persistence with per-song change notification.
///
/// Every write publishes the row as it now stands to the song's watch channel
/// while the database lock is still held, so subscribers observe writes in
/// the order they were applied.
pub struct LyricsStore {
    db: Mutex<Storage>,
    watchers: Mutex<HashMap<String, watch::Sender<Option<LyricsRecord>>>>,
}

impl LyricsStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        Ok(Self::with_storage(Storage::open(path)?))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::with_storage(Storage::open_in_memory()?))
    }

    fn with_storage(storage: Storage) -> Self {
        Self {
            db: Mutex::new(storage),
            watchers: Mutex::new(HashMap::new()),
        }
    }

    /// Current record followed by every later change to it.
    pub fn subscribe(&self, song_id: &str) -> StoreResult<watch::Receiver<Option<LyricsRecord>>> {
        let db = self.db.lock();
        let mut watchers = self.watchers.lock();
        // Songs nobody follows anymore
        watchers.retain(|_, tx| tx.receiver_count() > 0);
        if let Some(tx) = watchers.get(song_id) {
            return Ok(tx.subscribe());
        }
        let current = db.get_lyrics(song_id)?;
        let (tx, rx) = watch::channel(current);
        watchers.insert(song_id.to_string(), tx);
        Ok(rx)
    }

    pub fn get(&self, song_id: &str) -> StoreResult<Option<LyricsRecord>> {
        Ok(self.db.lock().get_lyrics(song_id)?)
    }

    /// Replace both fields of the record.
    pub fn upsert(&self, record: &LyricsRecord) -> StoreResult<()> {
        let db = self.db.lock();
        db.upsert_lyrics(record, now_unix())?;
        self.publish(&db, &record.song_id)
    }

    /// Overwrite one field, leaving the other untouched.
    pub fn set_field(&self, song_id: &str, mode: LyricsMode, field: &LyricsField) -> StoreResult<()> {
        let db = self.db.lock();
        db.set_lyrics_field(song_id, mode, field, false, now_unix())?;
        tracing::debug!(song_id, mode = mode.label(), "lyrics field written");
        self.publish(&db, song_id)
    }

    /// Write one field only if it is still unset. Returns whether it was written.
    pub fn fill_if_unset(
        &self,
        song_id: &str,
        mode: LyricsMode,
        field: &LyricsField,
    ) -> StoreResult<bool> {
        let db = self.db.lock();
        let written = db.set_lyrics_field(song_id, mode, field, true, now_unix())?;
        if written {
            tracing::debug!(song_id, mode = mode.label(), "fetched lyrics stored");
            self.publish(&db, song_id)?;
        } else {
            tracing::debug!(song_id, mode = mode.label(), "lyrics already present, fetch result dropped");
        }
        Ok(written)
    }

    pub fn ensure_song(&self, track: &Track) -> StoreResult<()> {
        Ok(self.db.lock().upsert_song(track, now_unix())?)
    }

    pub fn get_song(&self, song_id: &str) -> StoreResult<Option<Track>> {
        Ok(self.db.lock().get_song(song_id)?)
    }

    #[cfg(test)]
    pub(crate) fn watched_songs(&self) -> usize {
        self.watchers.lock().len()
    }

    /// Make every later lyrics read and write fail.
    #[cfg(test)]
    pub(crate) fn drop_lyrics_table(&self) {
        self.db
            .lock()
            .conn
            .execute_batch("DROP TABLE lyrics")
            .unwrap();
    }

    fn publish(&self, db: &Storage, song_id: &str) -> StoreResult<()> {
        let mut watchers = self.watchers.lock();
        let Some(tx) = watchers.get(song_id) else {
            return Ok(());
        };
        if tx.receiver_count() == 0 {
            watchers.remove(song_id);
            return Ok(());
        }
        let record = db.get_lyrics(song_id)?;
        tx.send_replace(record);
        Ok(())
    }
}

fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
