use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};

use crate::record::{Creator, Description, Keyword, Record, SetRef, Title};

/// Raised by `DocumentStore::add` when a document with the same `doc_id`
/// already exists, mirroring the reference store's `AlreadyExists`.
#[derive(Debug)]
pub struct AlreadyExists(pub String);

impl std::fmt::Display for AlreadyExists {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "document already exists: {}", self.0)
    }
}

impl std::error::Error for AlreadyExists {}

/// Operations the harvester and the OAI verb dispatcher require of a
/// document store. A single concrete implementation (`SqliteDocumentStore`)
/// is provided; anything else behind this contract (e.g. a different
/// embedded database) is out of scope.
pub trait DocumentStore: Send + Sync {
    fn add(&self, record: &Record) -> Result<()>;
    fn upsert(&self, record: &Record) -> Result<()>;
    fn delete(&self, doc_id: &str) -> Result<()>;
    fn fetch(&self, doc_id: &str) -> Result<Option<Record>>;
    fn filter(
        &self,
        set: Option<&str>,
        from: Option<&str>,
        until: Option<&str>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Record>>;
    fn sets(&self) -> Result<Vec<SetRef>>;
    fn earliest_datestamp(&self) -> Result<Option<String>>;
}

pub trait VariableStore: Send + Sync {
    fn fetch(&self, name: &str, default: &str) -> Result<String>;
    fn upsert(&self, name: &str, value: &str) -> Result<()>;
}

/// SQLite-backed implementation of both store contracts. Records are
/// stored one row per `doc_id`, with the nested list fields (`sets`,
/// `creators`, `titles`, `descriptions`, `keywords`) serialized to JSON
/// TEXT columns, the same way the teacher's `db.rs` stores an arXiv
/// article's `versions`/`authors`/`categories`.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    /// Opens (creating if necessary) the sqlite database at `path` and
    /// ensures the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("could not open sqlite database")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                doc_id TEXT PRIMARY KEY,
                xml_url TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                pub_date TEXT,
                language TEXT NOT NULL,
                publisher TEXT NOT NULL,
                doi TEXT NOT NULL,
                type TEXT NOT NULL,
                journal_acron TEXT NOT NULL,
                sets TEXT NOT NULL,
                creators TEXT NOT NULL,
                titles TEXT NOT NULL,
                descriptions TEXT NOT NULL,
                keywords TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS documents_timestamp ON documents (timestamp);
            CREATE TABLE IF NOT EXISTS variables (name TEXT PRIMARY KEY, value TEXT NOT NULL);",
        )
        .context("creating document store schema")?;
        Ok(SqliteDocumentStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("could not open in-memory sqlite database")?;
        conn.execute_batch(
            "CREATE TABLE documents (
                doc_id TEXT PRIMARY KEY,
                xml_url TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                pub_date TEXT,
                language TEXT NOT NULL,
                publisher TEXT NOT NULL,
                doi TEXT NOT NULL,
                type TEXT NOT NULL,
                journal_acron TEXT NOT NULL,
                sets TEXT NOT NULL,
                creators TEXT NOT NULL,
                titles TEXT NOT NULL,
                descriptions TEXT NOT NULL,
                keywords TEXT NOT NULL
            );
            CREATE TABLE variables (name TEXT PRIMARY KEY, value TEXT NOT NULL);",
        )?;
        Ok(SqliteDocumentStore {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<Record> {
        let sets_json: String = row.get("sets")?;
        let creators_json: String = row.get("creators")?;
        let titles_json: String = row.get("titles")?;
        let descriptions_json: String = row.get("descriptions")?;
        let keywords_json: String = row.get("keywords")?;
        let pub_date: Option<String> = row.get("pub_date")?;

        Ok(Record {
            doc_id: row.get("doc_id")?,
            xml_url: row.get("xml_url")?,
            timestamp: row.get("timestamp")?,
            pub_date: pub_date.and_then(|d| d.parse().ok()),
            language: row.get("language")?,
            publisher: row.get("publisher")?,
            doi: row.get("doi")?,
            type_: row.get("type")?,
            journal_acron: row.get("journal_acron")?,
            sets: serde_json::from_str::<Vec<SetRef>>(&sets_json).unwrap_or_default(),
            creators: serde_json::from_str::<Vec<Creator>>(&creators_json).unwrap_or_default(),
            titles: serde_json::from_str::<Vec<Title>>(&titles_json).unwrap_or_default(),
            descriptions: serde_json::from_str::<Vec<Description>>(&descriptions_json).unwrap_or_default(),
            keywords: serde_json::from_str::<Vec<Keyword>>(&keywords_json).unwrap_or_default(),
        })
    }

    fn write(&self, conn: &Connection, record: &Record, replace: bool) -> Result<()> {
        let sql = if replace {
            "INSERT OR REPLACE INTO documents
                (doc_id, xml_url, timestamp, pub_date, language, publisher, doi, type,
                 journal_acron, sets, creators, titles, descriptions, keywords)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)"
        } else {
            "INSERT INTO documents
                (doc_id, xml_url, timestamp, pub_date, language, publisher, doi, type,
                 journal_acron, sets, creators, titles, descriptions, keywords)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)"
        };
        let mut stmt = conn.prepare_cached(sql)?;
        let result = stmt.execute(params![
            record.doc_id,
            record.xml_url,
            record.timestamp,
            record.pub_date.map(|d| d.to_string()),
            record.language,
            record.publisher,
            record.doi,
            record.type_,
            record.journal_acron,
            serde_json::to_string(&record.sets)?,
            serde_json::to_string(&record.creators)?,
            serde_json::to_string(&record.titles)?,
            serde_json::to_string(&record.descriptions)?,
            serde_json::to_string(&record.keywords)?,
        ]);
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if !replace && e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                bail!(AlreadyExists(record.doc_id.clone()))
            }
            Err(e) => Err(e).context("writing document record"),
        }
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn add(&self, record: &Record) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        self.write(&conn, record, false)
    }

    fn upsert(&self, record: &Record) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        self.write(&conn, record, true)
    }

    fn delete(&self, doc_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM documents WHERE doc_id = ?1", params![doc_id])
            .context("deleting document record")?;
        Ok(())
    }

    fn fetch(&self, doc_id: &str) -> Result<Option<Record>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM documents WHERE doc_id = ?1",
            params![doc_id],
            Self::row_to_record,
        )
        .optional()
        .context("fetching document record")
    }

    fn filter(
        &self,
        set: Option<&str>,
        from: Option<&str>,
        until: Option<&str>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Record>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = String::from("SELECT * FROM documents WHERE 1=1");
        if set.is_some() {
            sql.push_str(" AND sets LIKE '%' || ?1 || '%'");
        }
        if from.is_some() {
            sql.push_str(" AND timestamp >= ?2");
        }
        if until.is_some() {
            sql.push_str(" AND timestamp <= ?3");
        }
        sql.push_str(" ORDER BY timestamp ASC LIMIT ?4 OFFSET ?5");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                set.unwrap_or_default(),
                from.unwrap_or_default(),
                until.unwrap_or_default(),
                limit,
                offset,
            ],
            Self::row_to_record,
        )?;
        let mut records = Vec::new();
        for row in rows {
            let record = row.context("reading document row")?;
            if let Some(set) = set {
                // The LIKE above is a coarse pre-filter (it matches the set_spec
                // string anywhere in the serialized JSON); confirm a real match
                // against the parsed `sets` before keeping the row.
                if !record.sets.iter().any(|s| s.set_spec == set) {
                    continue;
                }
            }
            records.push(record);
        }
        Ok(records)
    }

    fn sets(&self) -> Result<Vec<SetRef>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT sets FROM documents")?;
        let rows = stmt.query_map((), |row| row.get::<_, String>(0))?;
        let mut seen = std::collections::BTreeMap::new();
        for row in rows {
            let sets_json = row.context("reading sets column")?;
            let sets: Vec<SetRef> = serde_json::from_str(&sets_json).unwrap_or_default();
            for s in sets {
                if !s.set_spec.is_empty() {
                    seen.entry(s.set_spec.clone()).or_insert(s);
                }
            }
        }
        Ok(seen.into_values().collect())
    }

    fn earliest_datestamp(&self) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT timestamp FROM documents ORDER BY timestamp ASC LIMIT 1",
            (),
            |row| row.get(0),
        )
        .optional()
        .context("reading earliest datestamp")
    }
}

impl VariableStore for SqliteDocumentStore {
    fn fetch(&self, name: &str, default: &str) -> Result<String> {
        let conn = self.conn.lock().unwrap();
        let value: Option<String> = conn
            .query_row("SELECT value FROM variables WHERE name = ?1", params![name], |row| row.get(0))
            .optional()
            .context("fetching variable")?;
        Ok(value.unwrap_or_else(|| default.to_string()))
    }

    fn upsert(&self, name: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO variables (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            params![name, value],
        )
        .context("upserting variable")?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_record(doc_id: &str, timestamp: &str, set_spec: &str) -> Record {
        Record {
            doc_id: doc_id.to_string(),
            xml_url: format!("http://kernel.example/documents/{doc_id}"),
            timestamp: timestamp.to_string(),
            pub_date: None,
            language: "pt".to_string(),
            publisher: "Publisher".to_string(),
            doi: "10.1590/xyz".to_string(),
            type_: "research-article".to_string(),
            journal_acron: set_spec.to_string(),
            sets: vec![SetRef {
                set_spec: set_spec.to_string(),
                set_name: "Journal Name".to_string(),
            }],
            creators: vec![],
            titles: vec![],
            descriptions: vec![],
            keywords: vec![],
        }
    }

    #[test]
    fn add_then_fetch_round_trips() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let record = sample_record("abc", "2020-01-01T00:00:00Z", "rsp");
        store.add(&record).unwrap();
        let fetched = store.fetch("abc").unwrap().unwrap();
        assert_eq!(fetched.doc_id, "abc");
        assert_eq!(fetched.sets[0].set_spec, "rsp");
    }

    #[test]
    fn add_twice_fails_with_already_exists() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let record = sample_record("abc", "2020-01-01T00:00:00Z", "rsp");
        store.add(&record).unwrap();
        let err = store.add(&record).unwrap_err();
        assert!(err.downcast_ref::<AlreadyExists>().is_some());
    }

    #[test]
    fn upsert_replaces_existing_record() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let mut record = sample_record("abc", "2020-01-01T00:00:00Z", "rsp");
        store.upsert(&record).unwrap();
        record.publisher = "New Publisher".to_string();
        store.upsert(&record).unwrap();
        let fetched = store.fetch("abc").unwrap().unwrap();
        assert_eq!(fetched.publisher, "New Publisher");
    }

    #[test]
    fn delete_is_idempotent() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.delete("missing").unwrap();
        let record = sample_record("abc", "2020-01-01T00:00:00Z", "rsp");
        store.upsert(&record).unwrap();
        store.delete("abc").unwrap();
        store.delete("abc").unwrap();
        assert!(store.fetch("abc").unwrap().is_none());
    }

    #[test]
    fn filter_orders_by_timestamp_and_respects_set() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.upsert(&sample_record("b", "2020-02-01T00:00:00Z", "rsp")).unwrap();
        store.upsert(&sample_record("a", "2020-01-01T00:00:00Z", "rsp")).unwrap();
        store.upsert(&sample_record("c", "2020-03-01T00:00:00Z", "other")).unwrap();

        let all = store.filter(None, None, None, 0, 10).unwrap();
        assert_eq!(all.iter().map(|r| r.doc_id.as_str()).collect::<Vec<_>>(), vec!["a", "b", "c"]);

        let rsp_only = store.filter(Some("rsp"), None, None, 0, 10).unwrap();
        assert_eq!(rsp_only.len(), 2);
    }

    #[test]
    fn sets_are_sorted_and_deduplicated() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.upsert(&sample_record("a", "2020-01-01T00:00:00Z", "rsp")).unwrap();
        store.upsert(&sample_record("b", "2020-01-02T00:00:00Z", "rsp")).unwrap();
        store.upsert(&sample_record("c", "2020-01-03T00:00:00Z", "abc")).unwrap();

        let sets = store.sets().unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].set_spec, "abc");
        assert_eq!(sets[1].set_spec, "rsp");
    }

    #[test]
    fn earliest_datestamp_is_the_minimum_timestamp() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        assert_eq!(store.earliest_datestamp().unwrap(), None);
        store.upsert(&sample_record("a", "2020-02-01T00:00:00Z", "rsp")).unwrap();
        store.upsert(&sample_record("b", "2020-01-01T00:00:00Z", "rsp")).unwrap();
        assert_eq!(store.earliest_datestamp().unwrap(), Some("2020-01-01T00:00:00Z".to_string()));
    }

    #[test]
    fn variable_store_defaults_then_upserts() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        assert_eq!(VariableStore::fetch(&store, "last_synced_timestamp", "").unwrap(), "");
        VariableStore::upsert(&store, "last_synced_timestamp", "2020-01-01T00:00:00Z").unwrap();
        assert_eq!(
            VariableStore::fetch(&store, "last_synced_timestamp", "").unwrap(),
            "2020-01-01T00:00:00Z"
        );
    }
}
