use crate::value::Value;
use std::fmt;

/// Column storage classes used by Sabres tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
    Text,
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Integer => write!(f, "INTEGER"),
            SqlType::Real => write!(f, "REAL"),
            SqlType::Text => write!(f, "TEXT"),
        }
    }
}

/// Quote an identifier, doubling embedded double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

pub trait Statement {
    fn to_sql(&self) -> String;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    sql_type: SqlType,
    primary_key: bool,
    not_null: bool,
    references: Option<(String, String)>,
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Column {
            name: name.into(),
            sql_type,
            primary_key: false,
            not_null: false,
            references: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Make this column a foreign key into `table(column)`.
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some((table.into(), column.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn definition(&self) -> String {
        let mut sql = format!("{} {}", quote_ident(&self.name), self.sql_type);
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some((table, column)) = &self.references {
            sql.push_str(&format!(
                " REFERENCES {}({})",
                quote_ident(table),
                quote_ident(column)
            ));
        }
        sql
    }
}

/// Conjunction of `column = literal` comparisons.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Where {
    clauses: Vec<(String, String)>,
}

impl Where {
    pub fn equal_to(column: impl Into<String>, value: &Value) -> Self {
        Where::default().and(column, value)
    }

    pub fn and(mut self, column: impl Into<String>, value: &Value) -> Self {
        self.clauses.push((column.into(), value.to_sql()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    fn to_sql(&self) -> String {
        let parts: Vec<String> = self
            .clauses
            .iter()
            .map(|(column, literal)| format!("{} = {}", quote_ident(column), literal))
            .collect();
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn where_sql(predicate: &Option<Where>) -> String {
    match predicate {
        Some(predicate) if !predicate.is_empty() => predicate.to_sql(),
        _ => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    table: String,
    if_not_exists: bool,
    columns: Vec<Column>,
}

impl CreateTable {
    pub fn new(table: impl Into<String>) -> Self {
        CreateTable {
            table: table.into(),
            if_not_exists: false,
            columns: Vec::new(),
        }
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }
}

impl Statement for CreateTable {
    fn to_sql(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(Column::definition).collect();
        format!(
            "CREATE TABLE {}{} ({})",
            if self.if_not_exists { "IF NOT EXISTS " } else { "" },
            quote_ident(&self.table),
            columns.join(", ")
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlterTable {
    table: String,
    column: Column,
}

impl AlterTable {
    pub fn add_column(table: impl Into<String>, column: Column) -> Self {
        AlterTable {
            table: table.into(),
            column,
        }
    }
}

impl Statement for AlterTable {
    fn to_sql(&self) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(&self.table),
            self.column.definition()
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    table: String,
    columns: Vec<String>,
    count: bool,
    predicate: Option<Where>,
}

impl Select {
    pub fn new<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Select {
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            count: false,
            predicate: None,
        }
    }

    /// `SELECT COUNT(*)` over the table.
    pub fn count(table: impl Into<String>) -> Self {
        Select {
            table: table.into(),
            columns: Vec::new(),
            count: true,
            predicate: None,
        }
    }

    pub fn where_(mut self, predicate: Where) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

impl Statement for Select {
    fn to_sql(&self) -> String {
        let columns = if self.count {
            "COUNT(*)".to_string()
        } else if self.columns.is_empty() {
            "*".to_string()
        } else {
            let quoted: Vec<String> = self.columns.iter().map(|c| quote_ident(c)).collect();
            quoted.join(", ")
        };
        format!(
            "SELECT {} FROM {}{}",
            columns,
            quote_ident(&self.table),
            where_sql(&self.predicate)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    table: String,
    values: Vec<(String, String)>,
}

impl Insert {
    pub fn new(table: impl Into<String>) -> Self {
        Insert {
            table: table.into(),
            values: Vec::new(),
        }
    }

    pub fn value(mut self, column: impl Into<String>, value: &Value) -> Self {
        self.values.push((column.into(), value.to_sql()));
        self
    }

    pub fn values<'a, I>(self, values: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        values
            .into_iter()
            .fold(self, |insert, (column, value)| insert.value(column.as_str(), value))
    }
}

impl Statement for Insert {
    fn to_sql(&self) -> String {
        if self.values.is_empty() {
            return format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&self.table));
        }
        let columns: Vec<String> = self.values.iter().map(|(c, _)| quote_ident(c)).collect();
        let literals: Vec<&str> = self.values.iter().map(|(_, l)| l.as_str()).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table),
            columns.join(", "),
            literals.join(", ")
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    table: String,
    values: Vec<(String, String)>,
    predicate: Option<Where>,
}

impl Update {
    pub fn new(table: impl Into<String>) -> Self {
        Update {
            table: table.into(),
            values: Vec::new(),
            predicate: None,
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: &Value) -> Self {
        self.values.push((column.into(), value.to_sql()));
        self
    }

    pub fn where_(mut self, predicate: Where) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// No columns to set; such an update must not be issued.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Statement for Update {
    fn to_sql(&self) -> String {
        let assignments: Vec<String> = self
            .values
            .iter()
            .map(|(column, literal)| format!("{} = {}", quote_ident(column), literal))
            .collect();
        format!(
            "UPDATE {} SET {}{}",
            quote_ident(&self.table),
            assignments.join(", "),
            where_sql(&self.predicate)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    table: String,
    predicate: Option<Where>,
}

impl Delete {
    pub fn new(table: impl Into<String>) -> Self {
        Delete {
            table: table.into(),
            predicate: None,
        }
    }

    pub fn where_(mut self, predicate: Where) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

impl Statement for Delete {
    fn to_sql(&self) -> String {
        format!(
            "DELETE FROM {}{}",
            quote_ident(&self.table),
            where_sql(&self.predicate)
        )
    }
}
