// logfacts - platform/sqlite.rs
//
// SQLite-backed fact store. One connection guarded by a mutex; statements
// arrive fully rendered, so nothing is bound.

use crate::core::store::{FactStore, Row, Value};
use crate::util::constants;
use crate::util::error::StoreError;
use crate::util::logging::preview;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug)]
pub struct SqliteFactStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteFactStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let open_err = |source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        };
        let conn = Connection::open(path).map_err(open_err)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
            .map_err(open_err)?;
        Self::configure(conn, path.to_path_buf())
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let path = PathBuf::from(":memory:");
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: path.clone(),
            source,
        })?;
        Self::configure(conn, path)
    }

    fn configure(conn: Connection, path: PathBuf) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_millis(constants::SQLITE_BUSY_TIMEOUT_MS))
            .map_err(|source| StoreError::Open {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "Fact store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn statement_err(statement: &str) -> impl Fn(rusqlite::Error) -> StoreError + '_ {
    move |source| StoreError::Statement {
        statement: preview(statement).to_string(),
        source,
    }
}

fn to_value(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Text(String::from_utf8_lossy(b).into_owned()),
    }
}

impl FactStore for SqliteFactStore {
    fn execute_write(&self, statement: &str) -> Result<usize, StoreError> {
        self.lock()
            .execute(statement, [])
            .map_err(statement_err(statement))
    }

    fn execute_query(&self, statement: &str) -> Result<Vec<Row>, StoreError> {
        let conn = self.lock();
        let err = statement_err(statement);
        let mut stmt = conn.prepare(statement).map_err(&err)?;
        let columns = stmt.column_count();
        let rows = stmt
            .query_map([], |row| {
                (0..columns)
                    .map(|i| row.get_ref(i).map(to_value))
                    .collect::<Result<Row, _>>()
            })
            .map_err(&err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(&err)
    }

    /// All statements commit together or not at all.
    fn execute_batch(&self, statements: &[String]) -> Result<usize, StoreError> {
        let mut conn = self.lock();
        let tx = conn
            .transaction()
            .map_err(statement_err("BEGIN TRANSACTION"))?;
        let mut affected = 0;
        for statement in statements {
            affected += tx.execute(statement, []).map_err(statement_err(statement))?;
        }
        tx.commit().map_err(statement_err("COMMIT"))?;
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteFactStore {
        let s = SqliteFactStore::open_in_memory().unwrap();
        s.execute_write("CREATE TABLE T (Id INTEGER, Name TEXT, Score REAL)")
            .unwrap();
        s
    }

    #[test]
    fn test_write_and_query() {
        let s = store();
        assert_eq!(
            s.execute_write("INSERT INTO T VALUES (1, 'a', 0.5)").unwrap(),
            1
        );
        s.execute_write("INSERT INTO T VALUES (2, null, null)").unwrap();
        let rows = s.execute_query("SELECT Id, Name, Score FROM T ORDER BY Id").unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Value::Integer(1), Value::Text("a".into()), Value::Real(0.5)],
                vec![Value::Integer(2), Value::Null, Value::Null],
            ]
        );
    }

    #[test]
    fn test_max_value() {
        let s = store();
        assert_eq!(s.max_value("T", "Id", "").unwrap(), Value::Null);
        s.execute_write("INSERT INTO T VALUES (4, 'x', 1)").unwrap();
        s.execute_write("INSERT INTO T VALUES (9, 'y', 1)").unwrap();
        assert_eq!(s.max_value("T", "Id", "").unwrap(), Value::Integer(9));
        assert_eq!(
            s.max_value("T", "Id", "Name = 'x'").unwrap(),
            Value::Integer(4)
        );
    }

    #[test]
    fn test_batch_is_atomic() {
        let s = store();
        let err = s
            .execute_batch(&[
                "INSERT INTO T VALUES (1, 'a', 1)".to_string(),
                "INSERT INTO Missing VALUES (1)".to_string(),
            ])
            .unwrap_err();
        assert!(matches!(err, StoreError::Statement { .. }));
        assert!(!err.is_transient());
        assert!(s.execute_query("SELECT * FROM T").unwrap().is_empty());

        let n = s
            .execute_batch(&[
                "INSERT INTO T VALUES (1, 'a', 1)".to_string(),
                "INSERT INTO T VALUES (2, 'b', 1)".to_string(),
            ])
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.db");
        {
            let s = SqliteFactStore::open(&path).unwrap();
            s.execute_write("CREATE TABLE T (Id INTEGER)").unwrap();
            s.execute_write("INSERT INTO T VALUES (3)").unwrap();
        }
        let s = SqliteFactStore::open(&path).unwrap();
        assert_eq!(s.max_value("T", "Id", "").unwrap(), Value::Integer(3));
        assert_eq!(s.path(), path);
    }

    #[test]
    fn test_bad_statement_keeps_preview() {
        let s = store();
        match s.execute_write("INSERT INTO Nope VALUES (1)").unwrap_err() {
            StoreError::Statement { statement, .. } => assert!(statement.contains("Nope")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
