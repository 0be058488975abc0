mod migration;
mod registry;

pub use migration::{attribute_column, SchemaMigration};
pub(crate) use registry::check_binding;
pub use registry::SchemaRegistry;

use crate::connection::Connection;
use crate::error::Result;
use crate::sql::{Select, Statement, Where};
use crate::value::{Descriptor, Value};
use std::collections::BTreeMap;

/// Primary key column present in every class table.
pub const OBJECT_ID_KEY: &str = "objectId";

/// Attribute name → descriptor for one class. Attributes are only ever added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    attributes: BTreeMap<String, Descriptor>,
}

impl Schema {
    pub fn new(attributes: BTreeMap<String, Descriptor>) -> Self {
        Schema { attributes }
    }

    pub fn get(&self, key: &str) -> Option<&Descriptor> {
        self.attributes.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.attributes.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Descriptor)> {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// This schema extended with `additions`.
    pub fn merged(&self, additions: &BTreeMap<String, Descriptor>) -> Schema {
        let mut attributes = self.attributes.clone();
        for (key, descriptor) in additions {
            attributes
                .entry(key.clone())
                .or_insert_with(|| descriptor.clone());
        }
        Schema { attributes }
    }

    /// Columns selected when reading a full row of this class.
    pub fn columns(&self) -> Vec<String> {
        std::iter::once(OBJECT_ID_KEY.to_string())
            .chain(self.attributes.keys().cloned())
            .collect()
    }
}

/// Whether `table` exists in the database.
pub fn table_exists(conn: &mut dyn Connection, table: &str) -> Result<bool> {
    let select = Select::new("sqlite_master", ["name"]).where_(
        Where::equal_to("type", &Value::String("table".into()))
            .and("name", &Value::String(table.to_string())),
    );
    Ok(!conn.query(&select.to_sql())?.is_empty())
}
