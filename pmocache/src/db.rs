//! Index SQLite des entrées du cache
//!
//! Seuls les états durables (`ready`, `failed`) sont enregistrés. Les
//! horodatages sont stockés en microsecondes depuis l'époque Unix pour que
//! le tri LRU soit un simple tri numérique.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

use crate::entry::{CacheKey, CacheState};
use crate::quality::Quality;

const TABLE: &str = "audio_cache";

/// Ligne de l'index
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub key: CacheKey,
    pub state: CacheState,
    pub file_name: Option<String>,
    pub byte_size: u64,
    pub hits: u64,
    pub last_access: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Base de données SQLite du cache
#[derive(Debug)]
pub struct DB {
    conn: Mutex<Connection>,
}

fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<StoredEntry> {
    let quality: String = row.get(1)?;
    let quality = quality.parse::<Quality>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let state: String = row.get(2)?;
    let state = match state.as_str() {
        "ready" => CacheState::Ready,
        "failed" => CacheState::Failed,
        _ => CacheState::Missing,
    };
    let byte_size: i64 = row.get(4)?;
    let hits: i64 = row.get(5)?;
    let last_access: Option<i64> = row.get(6)?;

    Ok(StoredEntry {
        key: CacheKey::new(row.get::<_, String>(0)?, quality),
        state,
        file_name: row.get(3)?,
        byte_size: byte_size.max(0) as u64,
        hits: hits.max(0) as u64,
        last_access: last_access.and_then(DateTime::from_timestamp_micros),
        error: row.get(7)?,
    })
}

const COLUMNS: &str = "track_id, quality, state, file_name, byte_size, hits, last_access, error";

impl DB {
    /// Ouvre (ou crée) la base et ses index
    pub fn init(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {TABLE} (
                    track_id TEXT NOT NULL,
                    quality TEXT NOT NULL,
                    state TEXT NOT NULL,
                    file_name TEXT,
                    byte_size INTEGER NOT NULL DEFAULT 0,
                    hits INTEGER NOT NULL DEFAULT 0,
                    last_access INTEGER,
                    error TEXT,
                    PRIMARY KEY (track_id, quality)
                )"
            ),
            [],
        )?;

        // Index composite pour la politique LRU
        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{TABLE}_lru ON {TABLE} (state, last_access ASC, hits ASC)"
            ),
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Enregistre une entrée prête ; le compteur d'accès est conservé
    pub fn upsert_ready(&self, key: &CacheKey, file_name: &str, byte_size: u64) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {TABLE} ({COLUMNS})
                 VALUES (?1, ?2, 'ready', ?3, ?4, 0, ?5, NULL)
                 ON CONFLICT(track_id, quality) DO UPDATE SET
                     state = 'ready',
                     file_name = excluded.file_name,
                     byte_size = excluded.byte_size,
                     last_access = excluded.last_access,
                     error = NULL"
            ),
            params![
                key.track_id,
                key.quality.as_str(),
                file_name,
                byte_size as i64,
                now_micros()
            ],
        )?;
        Ok(())
    }

    /// Enregistre un échec avec son diagnostic
    pub fn upsert_failed(&self, key: &CacheKey, error: &str) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {TABLE} ({COLUMNS})
                 VALUES (?1, ?2, 'failed', NULL, 0, 0, ?3, ?4)
                 ON CONFLICT(track_id, quality) DO UPDATE SET
                     state = 'failed',
                     file_name = NULL,
                     byte_size = 0,
                     last_access = excluded.last_access,
                     error = excluded.error"
            ),
            params![key.track_id, key.quality.as_str(), now_micros(), error],
        )?;
        Ok(())
    }

    pub fn get(&self, key: &CacheKey) -> rusqlite::Result<Option<StoredEntry>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM {TABLE} WHERE track_id = ?1 AND quality = ?2"),
            params![key.track_id, key.quality.as_str()],
            entry_from_row,
        )
        .optional()
    }

    /// Met à jour le compteur d'accès et la date du dernier accès
    pub fn touch(&self, key: &CacheKey) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "UPDATE {TABLE} SET hits = hits + 1, last_access = ?1
                 WHERE track_id = ?2 AND quality = ?3"
            ),
            params![now_micros(), key.track_id, key.quality.as_str()],
        )?;
        Ok(())
    }

    pub fn delete(&self, key: &CacheKey) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!("DELETE FROM {TABLE} WHERE track_id = ?1 AND quality = ?2"),
            params![key.track_id, key.quality.as_str()],
        )?;
        Ok(())
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> rusqlite::Result<Vec<StoredEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let entries = stmt
            .query_map(params, entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn all(&self) -> rusqlite::Result<Vec<StoredEntry>> {
        self.query(
            &format!("SELECT {COLUMNS} FROM {TABLE} ORDER BY hits DESC"),
            [],
        )
    }

    /// Entrées prêtes, des moins récemment utilisées aux plus récentes
    pub fn ready_lru(&self) -> rusqlite::Result<Vec<StoredEntry>> {
        self.query(
            &format!(
                "SELECT {COLUMNS} FROM {TABLE}
                 WHERE state = 'ready'
                 ORDER BY last_access ASC, hits ASC"
            ),
            [],
        )
    }

    /// Toutes les qualités enregistrées pour une piste
    pub fn for_track(&self, track_id: &str) -> rusqlite::Result<Vec<StoredEntry>> {
        self.query(
            &format!("SELECT {COLUMNS} FROM {TABLE} WHERE track_id = ?1"),
            [track_id],
        )
    }

    /// Entrées prêtes dont le dernier accès est antérieur à `cutoff`
    pub fn ready_older_than(&self, cutoff: DateTime<Utc>) -> rusqlite::Result<Vec<StoredEntry>> {
        self.query(
            &format!(
                "SELECT {COLUMNS} FROM {TABLE}
                 WHERE state = 'ready' AND last_access < ?1
                 ORDER BY last_access ASC"
            ),
            [cutoff.timestamp_micros()],
        )
    }

    /// Somme des tailles des entrées prêtes
    pub fn ready_bytes(&self) -> rusqlite::Result<u64> {
        let conn = self.conn.lock().unwrap();
        let total: i64 = conn.query_row(
            &format!("SELECT COALESCE(SUM(byte_size), 0) FROM {TABLE} WHERE state = 'ready'"),
            [],
            |row| row.get(0),
        )?;
        Ok(total.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, DB) {
        let dir = TempDir::new().unwrap();
        let db = DB::init(&dir.path().join("cache.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_ready_then_failed_then_ready() {
        let (_dir, db) = open();
        let key = CacheKey::new("abc", Quality::Kbps192);

        assert!(db.get(&key).unwrap().is_none());

        db.upsert_ready(&key, "abc.192.mp3", 1234).unwrap();
        let entry = db.get(&key).unwrap().unwrap();
        assert_eq!(entry.state, CacheState::Ready);
        assert_eq!(entry.byte_size, 1234);
        assert_eq!(entry.file_name.as_deref(), Some("abc.192.mp3"));

        db.upsert_failed(&key, "boom").unwrap();
        let entry = db.get(&key).unwrap().unwrap();
        assert_eq!(entry.state, CacheState::Failed);
        assert_eq!(entry.byte_size, 0);
        assert_eq!(entry.error.as_deref(), Some("boom"));

        db.upsert_ready(&key, "abc.192.mp3", 99).unwrap();
        let entry = db.get(&key).unwrap().unwrap();
        assert_eq!(entry.state, CacheState::Ready);
        assert!(entry.error.is_none());
    }

    #[test]
    fn test_touch_and_lru_order() {
        let (_dir, db) = open();
        let a = CacheKey::new("a", Quality::Kbps128);
        let b = CacheKey::new("b", Quality::Kbps128);

        db.upsert_ready(&a, "a.128.mp3", 10).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        db.upsert_ready(&b, "b.128.mp3", 20).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        db.touch(&a).unwrap();

        let order: Vec<_> = db
            .ready_lru()
            .unwrap()
            .into_iter()
            .map(|e| e.key.track_id)
            .collect();
        assert_eq!(order, vec!["b", "a"]);
        assert_eq!(db.get(&a).unwrap().unwrap().hits, 1);
        assert_eq!(db.ready_bytes().unwrap(), 30);
    }

    #[test]
    fn test_failed_entries_are_not_counted() {
        let (_dir, db) = open();
        db.upsert_ready(&CacheKey::new("a", Quality::Flac), "a.flac.flac", 100)
            .unwrap();
        db.upsert_failed(&CacheKey::new("b", Quality::Flac), "nope")
            .unwrap();

        assert_eq!(db.all().unwrap().len(), 2);
        assert_eq!(db.ready_bytes().unwrap(), 100);
        assert_eq!(db.ready_lru().unwrap().len(), 1);

        db.delete(&CacheKey::new("a", Quality::Flac)).unwrap();
        assert_eq!(db.all().unwrap().len(), 1);
    }
}
