//! SQLite backend.
//!
//! One connection behind a mutex; the write volume here is a handful of
//! rows per submission, nowhere near needing a pool. Elements and
//! keywords are stored as JSON text, timestamps as RFC 3339.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    CaveStore, Element, HashKind, HashRecord, MetaRecord, StoreError, StoreResult, Submission,
    SubmissionStatus,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cave (
    id          INTEGER PRIMARY KEY,
    elements    TEXT NOT NULL,
    channel_id  TEXT NOT NULL,
    user_id     TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    status      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cave_status  ON cave(status);
CREATE INDEX IF NOT EXISTS idx_cave_channel ON cave(channel_id);
CREATE INDEX IF NOT EXISTS idx_cave_user    ON cave(user_id);

CREATE TABLE IF NOT EXISTS cave_hash (
    cave_id INTEGER NOT NULL,
    hash    TEXT NOT NULL,
    kind    TEXT NOT NULL,
    PRIMARY KEY (cave_id, hash, kind)
);
CREATE INDEX IF NOT EXISTS idx_cave_hash_kind ON cave_hash(kind);

CREATE TABLE IF NOT EXISTS cave_meta (
    cave_id  INTEGER PRIMARY KEY,
    rating   INTEGER NOT NULL,
    kind     TEXT NOT NULL,
    keywords TEXT NOT NULL
);
";

/// SQLite-backed [`CaveStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<std::path::Path>) -> StoreResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Fresh in-memory database, mainly for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn submission_from_row(
        id: u32,
        elements: String,
        channel_id: String,
        user_id: String,
        created_at: String,
        status: String,
    ) -> StoreResult<Submission> {
        let elements: Vec<Element> = serde_json::from_str(&elements)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| StoreError::Serialization(e.to_string()))?
            .with_timezone(&Utc);
        let status = SubmissionStatus::parse(&status)
            .ok_or_else(|| StoreError::Storage(format!("unknown status '{status}'")))?;
        Ok(Submission {
            id,
            elements,
            channel_id,
            user_id,
            created_at,
            status,
        })
    }
}

impl CaveStore for SqliteStore {
    fn get_submission(&self, id: u32) -> StoreResult<Option<Submission>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT elements, channel_id, user_id, created_at, status FROM cave WHERE id = ?1",
                params![id],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, String>(3)?,
                        r.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((elements, channel, user, created, status)) => Ok(Some(
                Self::submission_from_row(id, elements, channel, user, created, status)?,
            )),
            None => Ok(None),
        }
    }

    fn submissions_by_status(&self, status: SubmissionStatus) -> StoreResult<Vec<Submission>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, elements, channel_id, user_id, created_at, status
             FROM cave WHERE status = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![status.as_str()], |r| {
                Ok((
                    r.get::<_, u32>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, e, c, u, t, s)| Self::submission_from_row(id, e, c, u, t, s))
            .collect()
    }

    fn upsert_submission(&self, submission: &Submission) -> StoreResult<()> {
        let elements = serde_json::to_string(&submission.elements)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO cave (id, elements, channel_id, user_id, created_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
               elements = excluded.elements,
               channel_id = excluded.channel_id,
               user_id = excluded.user_id,
               created_at = excluded.created_at,
               status = excluded.status",
            params![
                submission.id,
                elements,
                submission.channel_id,
                submission.user_id,
                submission.created_at.to_rfc3339(),
                submission.status.as_str(),
            ],
        )?;
        Ok(())
    }

    fn remove_submission(&self, id: u32) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM cave WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn hashes(&self, kind: Option<HashKind>) -> StoreResult<Vec<HashRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT cave_id, hash, kind FROM cave_hash
             WHERE ?1 IS NULL OR kind = ?1
             ORDER BY cave_id",
        )?;
        let rows = stmt
            .query_map(params![kind.map(|k| k.as_str())], |r| {
                Ok((
                    r.get::<_, u32>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(cave_id, hash, kind)| {
                let kind = HashKind::parse(&kind)
                    .ok_or_else(|| StoreError::Storage(format!("unknown hash kind '{kind}'")))?;
                Ok(HashRecord {
                    cave_id,
                    hash,
                    kind,
                })
            })
            .collect()
    }

    fn upsert_hashes(&self, records: &[HashRecord]) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for rec in records {
            tx.execute(
                "INSERT OR REPLACE INTO cave_hash (cave_id, hash, kind) VALUES (?1, ?2, ?3)",
                params![rec.cave_id, rec.hash, rec.kind.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn remove_hashes(&self, cave_id: u32) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM cave_hash WHERE cave_id = ?1", params![cave_id])?;
        Ok(())
    }

    fn get_meta(&self, cave_id: u32) -> StoreResult<Option<MetaRecord>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT rating, kind, keywords FROM cave_meta WHERE cave_id = ?1",
                params![cave_id],
                |r| {
                    Ok((
                        r.get::<_, u8>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((rating, kind, keywords)) => Ok(Some(MetaRecord {
                cave_id,
                rating,
                kind,
                keywords: serde_json::from_str(&keywords)?,
            })),
            None => Ok(None),
        }
    }

    fn metas_by_kind(&self, kind: &str) -> StoreResult<Vec<MetaRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT cave_id, rating, kind, keywords FROM cave_meta WHERE kind = ?1 ORDER BY cave_id",
        )?;
        let rows = stmt
            .query_map(params![kind], |r| {
                Ok((
                    r.get::<_, u32>(0)?,
                    r.get::<_, u8>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(cave_id, rating, kind, keywords)| {
                Ok(MetaRecord {
                    cave_id,
                    rating,
                    kind,
                    keywords: serde_json::from_str(&keywords)?,
                })
            })
            .collect()
    }

    fn all_metas(&self) -> StoreResult<Vec<MetaRecord>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT cave_id, rating, kind, keywords FROM cave_meta ORDER BY cave_id")?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, u32>(0)?,
                    r.get::<_, u8>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(cave_id, rating, kind, keywords)| {
                Ok(MetaRecord {
                    cave_id,
                    rating,
                    kind,
                    keywords: serde_json::from_str(&keywords)?,
                })
            })
            .collect()
    }

    fn upsert_meta(&self, meta: &MetaRecord) -> StoreResult<()> {
        let keywords = serde_json::to_string(&meta.keywords)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO cave_meta (cave_id, rating, kind, keywords)
             VALUES (?1, ?2, ?3, ?4)",
            params![meta.cave_id, meta.rating, meta.kind, keywords],
        )?;
        Ok(())
    }

    fn remove_meta(&self, cave_id: u32) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM cave_meta WHERE cave_id = ?1", params![cave_id])?;
        Ok(())
    }
}
