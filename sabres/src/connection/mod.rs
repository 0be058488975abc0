mod sqlite;

pub use sqlite::SqliteConnection;

use crate::error::Result;
use rusqlite::types::Value as SqlValue;

/// The storage engine Sabres drives.
///
/// Transactions follow a begin / mark-successful / end protocol: `end_transaction`
/// commits when the transaction was marked successful and rolls back otherwise.
pub trait Connection: Send {
    fn open(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn begin_transaction(&mut self) -> Result<()>;

    fn set_transaction_successful(&mut self);

    fn end_transaction(&mut self) -> Result<()>;

    /// Execute a statement that returns no rows.
    fn exec(&mut self, sql: &str) -> Result<()>;

    fn query(&mut self, sql: &str) -> Result<Vec<Row>>;

    /// Row id generated by the most recent insert.
    fn last_insert_id(&mut self) -> Result<i64>;
}

/// One result row, columns in select order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new(columns: Vec<(String, SqlValue)>) -> Self {
        Row { columns }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Integer column, `None` when missing, null or not an integer.
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        match self.get(column) {
            Some(SqlValue::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn get_text(&self, column: &str) -> Option<&str> {
        match self.get(column) {
            Some(SqlValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self, column: &str) -> bool {
        matches!(self.get(column), None | Some(SqlValue::Null))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }
}
