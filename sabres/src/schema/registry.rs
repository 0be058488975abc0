use super::{table_exists, Schema};
use crate::connection::Connection;
use crate::error::{Result, SabresError};
use crate::sql::{Column, CreateTable, Insert, Select, SqlType, Statement, Where};
use crate::value::{Descriptor, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

const CLASS_COLUMN: &str = "className";
const ATTRIBUTE_COLUMN: &str = "attribute";
const DESCRIPTOR_COLUMN: &str = "descriptor";

/// Process-wide cache of class schemas, persisted in a metadata table.
///
/// Each class is loaded from the metadata table at most once. A class whose
/// table does not exist yet is cached as absent until a save publishes it.
pub struct SchemaRegistry {
    metadata_table: String,
    schemas: Mutex<HashMap<String, Option<Schema>>>,
}

impl SchemaRegistry {
    pub fn new(metadata_table: impl Into<String>) -> Self {
        SchemaRegistry {
            metadata_table: metadata_table.into(),
            schemas: Mutex::new(HashMap::new()),
        }
    }

    fn schemas(&self) -> MutexGuard<'_, HashMap<String, Option<Schema>>> {
        self.schemas.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the metadata table if needed.
    pub fn initialize(&self, conn: &mut dyn Connection) -> Result<()> {
        let create = CreateTable::new(self.metadata_table.as_str())
            .if_not_exists()
            .with_column(Column::new(CLASS_COLUMN, SqlType::Text).not_null())
            .with_column(Column::new(ATTRIBUTE_COLUMN, SqlType::Text).not_null())
            .with_column(Column::new(DESCRIPTOR_COLUMN, SqlType::Text).not_null());
        conn.exec(&create.to_sql())
    }

    /// Cached schema of `class`, `None` when absent or not loaded.
    pub fn get_schema(&self, class: &str) -> Option<Schema> {
        self.schemas().get(class).cloned().flatten()
    }

    pub fn is_loaded(&self, class: &str) -> bool {
        self.schemas().contains_key(class)
    }

    /// Load `class` from the metadata table unless it is already cached.
    pub fn load(&self, conn: &mut dyn Connection, class: &str) -> Result<Option<Schema>> {
        let mut schemas = self.schemas();
        if let Some(cached) = schemas.get(class) {
            return Ok(cached.clone());
        }

        let select = Select::new(
            self.metadata_table.as_str(),
            [ATTRIBUTE_COLUMN, DESCRIPTOR_COLUMN],
        )
        .where_(Where::equal_to(CLASS_COLUMN, &Value::String(class.to_string())));

        let mut attributes = BTreeMap::new();
        for row in conn.query(&select.to_sql())? {
            let (Some(key), Some(raw)) = (row.get_text(ATTRIBUTE_COLUMN), row.get_text(DESCRIPTOR_COLUMN))
            else {
                return Err(SabresError::Decode {
                    column: self.metadata_table.clone(),
                    reason: format!("malformed schema row for class {class}"),
                });
            };
            attributes.insert(key.to_string(), Descriptor::from_metadata(raw)?);
        }

        let schema = if !attributes.is_empty() || table_exists(conn, class)? {
            Some(Schema::new(attributes))
        } else {
            None
        };
        log::debug!(
            "Loaded schema for class {class}: {} attributes",
            schema.as_ref().map_or(0, Schema::len)
        );
        schemas.insert(class.to_string(), schema.clone());
        Ok(schema)
    }

    /// Every class recorded in the metadata table.
    pub fn persisted_classes(&self, conn: &mut dyn Connection) -> Result<BTreeSet<String>> {
        let select = Select::new(self.metadata_table.as_str(), [CLASS_COLUMN]);
        let classes = conn
            .query(&select.to_sql())?
            .iter()
            .filter_map(|row| row.get_text(CLASS_COLUMN).map(str::to_string))
            .collect();
        Ok(classes)
    }

    /// Conflict check for a put: `Ok(true)` when `key` is new to the class,
    /// `Ok(false)` when it is already bound to `descriptor`.
    pub fn check(&self, class: &str, key: &str, descriptor: &Descriptor) -> Result<bool> {
        check_binding(self.get_schema(class).as_ref(), class, key, descriptor)
    }

    /// Persist `additions` for `class` inside the caller's transaction.
    ///
    /// Returns the merged schema. The cache is not touched; the caller
    /// publishes the result once the transaction commits.
    pub fn update(
        &self,
        conn: &mut dyn Connection,
        class: &str,
        current: Option<&Schema>,
        additions: &BTreeMap<String, Descriptor>,
    ) -> Result<Schema> {
        for (key, descriptor) in additions {
            let insert = Insert::new(self.metadata_table.as_str())
                .value(CLASS_COLUMN, &Value::String(class.to_string()))
                .value(ATTRIBUTE_COLUMN, &Value::String(key.clone()))
                .value(DESCRIPTOR_COLUMN, &Value::String(descriptor.to_metadata()?));
            conn.exec(&insert.to_sql())?;
        }
        Ok(current.cloned().unwrap_or_default().merged(additions))
    }

    /// Make committed schemas visible to lookups.
    pub fn publish(&self, committed: HashMap<String, Schema>) {
        let mut schemas = self.schemas();
        for (class, schema) in committed {
            log::info!("Schema of class {class} now has {} attributes", schema.len());
            schemas.insert(class, Some(schema));
        }
    }
}

pub(crate) fn check_binding(
    schema: Option<&Schema>,
    class: &str,
    key: &str,
    descriptor: &Descriptor,
) -> Result<bool> {
    match schema.and_then(|schema| schema.get(key)) {
        Some(existing) if existing != descriptor => Err(SabresError::SchemaConflict {
            class: class.to_string(),
            key: key.to_string(),
            existing: existing.to_string(),
            attempted: descriptor.to_string(),
        }),
        Some(_) => Ok(false),
        None => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteConnection;

    fn setup() -> (SqliteConnection, SchemaRegistry) {
        let mut conn = SqliteConnection::in_memory();
        conn.open().unwrap();
        let registry = SchemaRegistry::new("_sabres_schema");
        registry.initialize(&mut conn).unwrap();
        (conn, registry)
    }

    fn additions() -> BTreeMap<String, Descriptor> {
        let mut additions = BTreeMap::new();
        additions.insert("title".to_string(), Descriptor::String);
        additions.insert("cast".to_string(), Descriptor::list(Descriptor::pointer("Actor")));
        additions
    }

    #[test]
    fn test_unknown_class_is_absent() {
        let (mut conn, registry) = setup();
        assert!(registry.load(&mut conn, "Movie").unwrap().is_none());
        assert!(registry.is_loaded("Movie"));
        assert!(registry.get_schema("Movie").is_none());
    }

    #[test]
    fn test_update_then_publish() {
        let (mut conn, registry) = setup();
        registry.load(&mut conn, "Movie").unwrap();

        let merged = registry.update(&mut conn, "Movie", None, &additions()).unwrap();
        assert_eq!(merged.len(), 2);
        // Not visible until published
        assert!(registry.get_schema("Movie").is_none());

        registry.publish(HashMap::from([("Movie".to_string(), merged.clone())]));
        assert_eq!(registry.get_schema("Movie"), Some(merged));
    }

    #[test]
    fn test_persisted_schema_loads_in_fresh_registry() {
        let (mut conn, registry) = setup();
        registry.update(&mut conn, "Movie", None, &additions()).unwrap();

        let fresh = SchemaRegistry::new("_sabres_schema");
        let schema = fresh.load(&mut conn, "Movie").unwrap().unwrap();
        assert_eq!(
            schema.get("cast"),
            Some(&Descriptor::list(Descriptor::pointer("Actor")))
        );
        assert_eq!(
            fresh.persisted_classes(&mut conn).unwrap(),
            BTreeSet::from(["Movie".to_string()])
        );
    }

    #[test]
    fn test_load_happens_once() {
        let (mut conn, registry) = setup();
        assert!(registry.load(&mut conn, "Movie").unwrap().is_none());

        // Rows written behind the registry's back are not re-read
        registry.update(&mut conn, "Movie", None, &additions()).unwrap();
        assert!(registry.load(&mut conn, "Movie").unwrap().is_none());
    }

    #[test]
    fn test_check_binding() {
        let (_conn, registry) = setup();
        registry.publish(HashMap::from([(
            "Movie".to_string(),
            Schema::default().merged(&additions()),
        )]));

        assert!(!registry.check("Movie", "title", &Descriptor::String).unwrap());
        assert!(registry.check("Movie", "year", &Descriptor::Integer).unwrap());
        assert!(matches!(
            registry.check("Movie", "title", &Descriptor::Long),
            Err(SabresError::SchemaConflict { .. })
        ));
    }
}
