use super::{Connection, Row};
use crate::config::SabresConfig;
use crate::error::{Result, SabresError};
use rusqlite::types::Value as SqlValue;
use std::path::PathBuf;
use std::time::Duration;

/// [`Connection`] backed by a SQLite database file or an in-memory database.
///
/// `open`/`close` are reference counted. A file database is closed when the
/// last user closes it; an in-memory database stays open for the lifetime of
/// the value, since closing it would discard its contents.
pub struct SqliteConnection {
    path: Option<PathBuf>,
    foreign_keys: bool,
    busy_timeout: Duration,
    conn: Option<rusqlite::Connection>,
    open_count: usize,
    in_transaction: bool,
    successful: bool,
}

impl SqliteConnection {
    pub fn new(config: &SabresConfig) -> Self {
        SqliteConnection {
            path: config.database_path(),
            foreign_keys: config.foreign_keys,
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            conn: None,
            open_count: 0,
            in_transaction: false,
            successful: false,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(&SabresConfig::in_memory())
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn connect(&self) -> Result<rusqlite::Connection> {
        let conn = match &self.path {
            Some(path) => rusqlite::Connection::open(path)?,
            None => rusqlite::Connection::open_in_memory()?,
        };
        conn.busy_timeout(self.busy_timeout)?;
        if self.foreign_keys {
            conn.execute_batch("PRAGMA foreign_keys = ON")?;
        }
        Ok(conn)
    }

    fn conn(&self) -> Result<&rusqlite::Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| SabresError::IllegalState("Connection is not open".into()))
    }
}

impl Connection for SqliteConnection {
    fn open(&mut self) -> Result<()> {
        if self.conn.is_none() {
            log::debug!("Opening database {:?}", self.path);
            self.conn = Some(self.connect()?);
        }
        self.open_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open_count = self.open_count.saturating_sub(1);
        if self.open_count > 0 || self.path.is_none() || self.in_transaction {
            return Ok(());
        }
        if let Some(conn) = self.conn.take() {
            log::debug!("Closing database {:?}", self.path);
            conn.close().map_err(|(_, e)| SabresError::Storage(e))?;
        }
        Ok(())
    }

    fn begin_transaction(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(SabresError::IllegalState(
                "A transaction is already active on this connection".into(),
            ));
        }
        self.conn()?.execute_batch("BEGIN IMMEDIATE TRANSACTION")?;
        log::debug!("BEGIN");
        self.in_transaction = true;
        self.successful = false;
        Ok(())
    }

    fn set_transaction_successful(&mut self) {
        self.successful = true;
    }

    fn end_transaction(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(SabresError::IllegalState("No active transaction to end".into()));
        }
        let commit = self.successful;
        self.in_transaction = false;
        self.successful = false;

        let conn = self.conn()?;
        if commit {
            log::debug!("COMMIT");
            if let Err(e) = conn.execute_batch("COMMIT") {
                // A failed COMMIT can leave the transaction open
                if !conn.is_autocommit() {
                    conn.execute_batch("ROLLBACK")?;
                }
                return Err(e.into());
            }
        } else {
            log::warn!("Rolling back transaction");
            conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn exec(&mut self, sql: &str) -> Result<()> {
        log::debug!("{sql}");
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        log::debug!("{sql}");
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;

        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let rows = stmt.query_map([], |row| {
            let mut columns = Vec::with_capacity(column_names.len());
            for (i, name) in column_names.iter().enumerate() {
                let value: SqlValue = row.get(i)?;
                columns.push((name.clone(), value));
            }
            Ok(Row::new(columns))
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    fn last_insert_id(&mut self) -> Result<i64> {
        Ok(self.conn()?.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_memory() -> SqliteConnection {
        let mut conn = SqliteConnection::in_memory();
        conn.open().unwrap();
        conn.exec("CREATE TABLE t (objectId INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        conn
    }

    #[test]
    fn test_exec_query_and_row_id() {
        let mut conn = open_memory();
        conn.exec("INSERT INTO t (name) VALUES ('alice')").unwrap();
        assert_eq!(conn.last_insert_id().unwrap(), 1);

        let rows = conn.query("SELECT objectId, name FROM t").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_i64("objectId"), Some(1));
        assert_eq!(rows[0].get_text("name"), Some("alice"));
        assert!(!rows[0].is_null("name"));
        assert!(rows[0].is_null("missing"));
    }

    #[test]
    fn test_transaction_commit() {
        let mut conn = open_memory();
        conn.begin_transaction().unwrap();
        conn.exec("INSERT INTO t (name) VALUES ('alice')").unwrap();
        conn.set_transaction_successful();
        conn.end_transaction().unwrap();

        assert_eq!(conn.query("SELECT * FROM t").unwrap().len(), 1);
    }

    #[test]
    fn test_transaction_rollback_without_success_mark() {
        let mut conn = open_memory();
        conn.begin_transaction().unwrap();
        conn.exec("INSERT INTO t (name) VALUES ('alice')").unwrap();
        conn.end_transaction().unwrap();

        assert!(conn.query("SELECT * FROM t").unwrap().is_empty());
    }

    #[test]
    fn test_nested_begin_is_rejected() {
        let mut conn = open_memory();
        conn.begin_transaction().unwrap();
        assert!(matches!(
            conn.begin_transaction(),
            Err(SabresError::IllegalState(_))
        ));
        conn.end_transaction().unwrap();
        assert!(conn.end_transaction().is_err());
    }

    #[test]
    fn test_file_database_closes_when_unused() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = SabresConfig::with_database(tmp.path().join("test.db"));
        let mut conn = SqliteConnection::new(&config);

        conn.open().unwrap();
        conn.open().unwrap();
        conn.exec("CREATE TABLE t (x INTEGER)").unwrap();
        conn.close().unwrap();
        assert!(conn.is_open());
        conn.close().unwrap();
        assert!(!conn.is_open());
        assert!(conn.exec("SELECT 1").is_err());

        conn.open().unwrap();
        assert!(conn.query("SELECT * FROM t").unwrap().is_empty());
    }

    #[test]
    fn test_storage_errors_surface() {
        let mut conn = open_memory();
        let err = conn.exec("INSERT INTO nope VALUES (1)").unwrap_err();
        assert!(matches!(err, SabresError::Storage(_)));
    }
}
