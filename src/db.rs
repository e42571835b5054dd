use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info, warn};

use crate::config::FALLBACK_STATUS;
use crate::error::StoreError;
use crate::record::{Field, FieldMap, Record};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS jobs (
        id               TEXT PRIMARY KEY,
        title            TEXT,
        company          TEXT,
        location         TEXT,
        via              TEXT,
        posted_at        TEXT,
        url              TEXT,
        source           TEXT,
        description      TEXT,
        salary           TEXT,
        llm_score        REAL,
        llm_blurb        TEXT,
        assessment_flag  INTEGER DEFAULT 0,
        assessment_terms TEXT DEFAULT '',
        status           TEXT DEFAULT 'harvested',
        notes            TEXT DEFAULT '',
        created_at       TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_jobs_created ON jobs(created_at);
";

/// Columns added after the first release; applied only when missing.
const MIGRATIONS: &[(&str, &str)] = &[
    ("assessment_flag", "ALTER TABLE jobs ADD COLUMN assessment_flag INTEGER DEFAULT 0"),
    ("assessment_terms", "ALTER TABLE jobs ADD COLUMN assessment_terms TEXT DEFAULT ''"),
    ("status", "ALTER TABLE jobs ADD COLUMN status TEXT DEFAULT 'harvested'"),
    ("notes", "ALTER TABLE jobs ADD COLUMN notes TEXT DEFAULT ''"),
];

const COLUMNS: &str = "id, title, company, location, via, posted_at, url, source, description, salary,
     llm_score, llm_blurb, assessment_flag, assessment_terms, status, notes, created_at";

/// SQLite-backed job store with first-write-wins inserts.
pub struct Store {
    conn: Mutex<Connection>,
    statuses: Vec<String>,
}

impl Store {
    /// Open (creating if needed) the database file and bring the schema up
    /// to date. `statuses` is the closed set of lifecycle states; empty
    /// means any status is accepted.
    pub fn open(path: &Path, statuses: &[String]) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        init_schema(&mut conn)?;
        info!("Job store ready at {}", path.display());

        Ok(Store {
            conn: Mutex::new(conn),
            statuses: statuses.to_vec(),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn default_status(&self) -> &str {
        self.statuses
            .first()
            .map(String::as_str)
            .unwrap_or(FALLBACK_STATUS)
    }

    /// Insert the record unless its id is already stored. Returns whether a
    /// row was written; an existing row is never touched. On insert the
    /// record's status, notes and created_at are updated to what was stored.
    pub fn upsert(&self, record: &mut Record) -> Result<bool, StoreError> {
        let status = self.insert_status(&record.status);
        let notes = record.notes.trim().to_string();
        let created_at = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();

        let inserted = self.conn().execute(
            &format!(
                "INSERT OR IGNORE INTO jobs ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
            ),
            rusqlite::params![
                record.id,
                record.title,
                record.company,
                record.location,
                record.via,
                record.posted_at,
                record.url,
                record.source.as_str(),
                record.description,
                record.salary,
                record.llm_score,
                record.llm_blurb,
                record.assessment_flag,
                record.assessment_terms,
                status,
                notes,
                created_at,
            ],
        )? == 1;

        if inserted {
            record.status = status;
            record.notes = notes;
            record.created_at = Some(created_at);
        } else {
            debug!(id = %record.id, "already stored, skipping");
        }
        Ok(inserted)
    }

    /// Lenient on insert: unknown statuses become the default.
    fn insert_status(&self, status: &str) -> String {
        let status = status.trim().to_lowercase();
        if self.statuses.is_empty() {
            if status.is_empty() {
                FALLBACK_STATUS.to_string()
            } else {
                status
            }
        } else if self.statuses.contains(&status) {
            status
        } else {
            self.default_status().to_string()
        }
    }

    /// Most recently created records first, at most `limit`.
    pub fn latest(&self, limit: usize) -> Result<Vec<Record>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM jobs ORDER BY created_at DESC, rowid DESC LIMIT ?1"
        ))?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let maps = stmt
            .query_map([limit as i64], |row| {
                let mut map = FieldMap::new();
                for (i, name) in names.iter().enumerate() {
                    let value: rusqlite::types::Value = row.get(i)?;
                    map.insert(name.clone(), Field::from(value));
                }
                Ok(map)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(maps.len());
        for map in &maps {
            match Record::from_map(map) {
                Ok(mut record) => {
                    if record.status.trim().is_empty() {
                        record.status = self.default_status().to_string();
                    }
                    records.push(record);
                }
                Err(e) => {
                    let id = match map.get("id") {
                        Some(Field::Text(id)) => id.as_str(),
                        _ => "?",
                    };
                    warn!(id, error = %e, "skipping unreadable stored row");
                }
            }
        }
        Ok(records)
    }

    /// Overwrite status and notes of a stored record. Strict on the status
    /// value; `Ok(false)` when the id is unknown. Notes are stored as given.
    pub fn update_status(
        &self,
        id: &str,
        status: &str,
        notes: Option<&str>,
    ) -> Result<bool, StoreError> {
        if !self.statuses.is_empty() && !self.statuses.iter().any(|s| s == status) {
            return Err(StoreError::InvalidStatus {
                status: status.to_string(),
                allowed: self.statuses.join(", "),
            });
        }
        let changed = self.conn().execute(
            "UPDATE jobs SET status = ?1, notes = ?2 WHERE id = ?3",
            rusqlite::params![status, notes.unwrap_or(""), id],
        )?;
        Ok(changed > 0)
    }

    /// Row counts per status, most common first.
    pub fn status_counts(&self) -> Result<Vec<(String, usize)>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT COALESCE(NULLIF(TRIM(status), ''), ?1), COUNT(*) AS n
             FROM jobs GROUP BY 1 ORDER BY n DESC, 1",
        )?;
        let rows = stmt
            .query_map([self.default_status()], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Create the table and add any missing columns. Runs under an immediate
/// transaction so concurrent starters apply migrations one at a time.
fn init_schema(conn: &mut Connection) -> Result<(), StoreError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute_batch(SCHEMA)?;

    let existing: Vec<String> = {
        let mut stmt = tx.prepare("PRAGMA table_info(jobs)")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        names
    };
    for (column, ddl) in MIGRATIONS {
        if !existing.iter().any(|c| c == column) {
            info!("Migrating jobs table: adding column {}", column);
            tx.execute_batch(ddl)?;
        }
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Source;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn statuses() -> Vec<String> {
        ["harvested", "applied", "interviewing"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn open(dir: &TempDir) -> Store {
        Store::open(&dir.path().join("data/jobs.db"), &statuses()).unwrap()
    }

    fn job(id: &str, title: &str) -> Record {
        Record::new(id, title, "Acme", format!("https://acme/{id}"), Source::SearchJobs)
    }

    #[test]
    fn second_insert_is_ignored() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let mut first = job("a1", "Head of Data");
        first.llm_score = Some(70.0);
        assert!(store.upsert(&mut first).unwrap());

        let mut again = job("a1", "Changed Title");
        again.llm_score = Some(99.0);
        assert!(!store.upsert(&mut again).unwrap());
        assert!(again.created_at.is_none());

        let rows = store.latest(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Head of Data");
        assert_eq!(rows[0].llm_score, Some(70.0));
    }

    #[test]
    fn concurrent_inserts_store_one_row() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(open(&dir));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.upsert(&mut job("same", "Lead Engineer")).unwrap())
            })
            .collect();
        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|written| *written)
            .count();

        assert_eq!(inserted, 1);
        assert_eq!(store.latest(10).unwrap().len(), 1);
    }

    #[test]
    fn insert_normalizes_status_and_notes() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let mut r = job("s1", "VP Analytics");
        r.status = "  APPLIED ".into();
        r.notes = "  call back  ".into();
        assert!(store.upsert(&mut r).unwrap());
        assert_eq!(r.status, "applied");
        assert_eq!(r.notes, "call back");
        assert!(r.created_at.is_some());

        let mut unknown = job("s2", "VP Analytics");
        unknown.status = "ghosted".into();
        store.upsert(&mut unknown).unwrap();
        assert_eq!(unknown.status, "harvested");
    }

    #[test]
    fn empty_status_set_accepts_anything() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("jobs.db"), &[]).unwrap();

        let mut blank = job("b1", "Director");
        blank.status = "".into();
        store.upsert(&mut blank).unwrap();
        assert_eq!(blank.status, "harvested");

        let mut custom = job("b2", "Director");
        custom.status = "Shortlist".into();
        store.upsert(&mut custom).unwrap();
        assert_eq!(custom.status, "shortlist");
        assert!(store.update_status("b2", "anything", None).unwrap());
    }

    #[test]
    fn latest_orders_newest_first_and_limits() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        for id in ["o1", "o2", "o3"] {
            store.upsert(&mut job(id, "Head of Data")).unwrap();
        }
        let rows = store.latest(2).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["o3", "o2"]);
    }

    #[test]
    fn latest_backfills_blank_status() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.upsert(&mut job("n1", "Head of Data")).unwrap();
        store
            .conn()
            .execute("UPDATE jobs SET status = NULL WHERE id = 'n1'", [])
            .unwrap();
        assert_eq!(store.latest(1).unwrap()[0].status, "harvested");
    }

    #[test]
    fn update_status_rules() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.upsert(&mut job("u1", "Head of Data")).unwrap();

        let err = store.update_status("u1", "hired", Some("x")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidStatus { .. }));
        assert_eq!(store.latest(1).unwrap()[0].status, "harvested");

        assert!(!store.update_status("missing", "applied", None).unwrap());

        assert!(store.update_status("u1", "applied", Some(" sent resume ")).unwrap());
        let row = &store.latest(1).unwrap()[0];
        assert_eq!(row.status, "applied");
        assert_eq!(row.notes, " sent resume ");

        assert!(store.update_status("u1", "interviewing", None).unwrap());
        assert_eq!(store.latest(1).unwrap()[0].notes, "");
    }

    #[test]
    fn survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            store.upsert(&mut job("p1", "Principal Analyst")).unwrap();
        }
        let store = open(&dir);
        assert_eq!(store.latest(5).unwrap()[0].id, "p1");
        assert!(!store.upsert(&mut job("p1", "Principal Analyst")).unwrap());
    }

    #[test]
    fn migrates_old_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE jobs (id TEXT PRIMARY KEY, title TEXT, company TEXT, location TEXT,
                 via TEXT, posted_at TEXT, url TEXT, source TEXT, description TEXT, salary TEXT,
                 llm_score REAL, llm_blurb TEXT, created_at TEXT);
                 INSERT INTO jobs (id, title, company, url, source, created_at)
                 VALUES ('old', 'Head of Data', 'Acme', 'https://acme/old', 'search_jobs', '2024-01-01T00:00:00');",
            )
            .unwrap();
        }
        let store = Store::open(&path, &statuses()).unwrap();
        let row = &store.latest(1).unwrap()[0];
        assert_eq!(row.id, "old");
        assert_eq!(row.status, "harvested");
        assert!(!row.assessment_flag);
        assert_eq!(row.notes, "");
    }

    #[test]
    fn unreadable_rows_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .conn()
            .execute_batch(
                "INSERT INTO jobs (id, title, company, url, source, status, created_at)
                 VALUES ('legacy', 'Head of Data', 'Acme', 'https://acme/legacy', 'google_jobs', 'harvested', '2024-01-01T00:00:00');
                 INSERT INTO jobs (id, title, company, url, source, created_at)
                 VALUES ('broken', NULL, 'Acme', 'https://acme/broken', 'search_jobs', '2024-01-02T00:00:00');",
            )
            .unwrap();
        store.upsert(&mut job("fresh", "VP Analytics")).unwrap();

        let rows = store.latest(10).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["fresh", "legacy"]);
        assert_eq!(rows[1].source, Source::SearchJobs);
    }

    #[test]
    fn counts_by_status() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        for id in ["c1", "c2", "c3"] {
            store.upsert(&mut job(id, "Head of Data")).unwrap();
        }
        store.update_status("c1", "applied", None).unwrap();
        let counts = store.status_counts().unwrap();
        assert_eq!(counts[0], ("harvested".to_string(), 2));
        assert_eq!(counts[1], ("applied".to_string(), 1));
    }
}
