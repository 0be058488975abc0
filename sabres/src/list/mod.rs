use crate::connection::Connection;
use crate::error::{Result, SabresError};
use crate::object::SabresObject;
use crate::schema::{attribute_column, table_exists, OBJECT_ID_KEY};
use crate::sql::{Column, CreateTable, Delete, Insert, Select, SqlType, Statement, Where};
use crate::value::{Descriptor, Value};

const OWNER_ID_COLUMN: &str = "ownerId";
const POSITION_COLUMN: &str = "position";
const VALUE_COLUMN: &str = "value";

/// Auxiliary table holding the ordered contents of one list attribute of a class.
///
/// Contents are replaced wholesale on every write, never diffed.
pub struct ListStore {
    class: String,
    attribute: String,
}

impl ListStore {
    pub fn new(class: impl Into<String>, attribute: impl Into<String>) -> Self {
        ListStore {
            class: class.into(),
            attribute: attribute.into(),
        }
    }

    /// `<Class>_<attribute>_list`, with underscores inside either part doubled
    /// so distinct pairs never share a table.
    pub fn table_name(&self) -> String {
        format!(
            "{}_{}_list",
            self.class.replace('_', "__"),
            self.attribute.replace('_', "__")
        )
    }

    fn create_table(&self, element: &Descriptor) -> CreateTable {
        CreateTable::new(self.table_name())
            .if_not_exists()
            .with_column(
                Column::new(OBJECT_ID_KEY, SqlType::Integer)
                    .primary_key()
                    .not_null(),
            )
            .with_column(Column::new(OWNER_ID_COLUMN, SqlType::Integer).not_null())
            .with_column(Column::new(POSITION_COLUMN, SqlType::Integer).not_null())
            .with_column(attribute_column(VALUE_COLUMN, element))
    }

    /// Replace every element stored for `owner_id` with `elements`.
    pub fn insert(&self, conn: &mut dyn Connection, owner_id: i64, elements: &[Value]) -> Result<()> {
        let Some(first) = elements.first() else {
            return Err(SabresError::Validation(format!(
                "List {}.{} cannot be empty",
                self.class, self.attribute
            )));
        };
        let table = self.table_name();
        conn.exec(&self.create_table(&first.descriptor()).to_sql())?;
        conn.exec(
            &Delete::new(table.as_str())
                .where_(Where::equal_to(OWNER_ID_COLUMN, &Value::Long(owner_id)))
                .to_sql(),
        )?;

        for (position, element) in elements.iter().enumerate() {
            let insert = Insert::new(table.as_str())
                .value(OWNER_ID_COLUMN, &Value::Long(owner_id))
                .value(POSITION_COLUMN, &Value::Long(position as i64))
                .value(VALUE_COLUMN, element);
            conn.exec(&insert.to_sql())?;
        }
        Ok(())
    }

    /// Elements stored for `owner_id` in list order; empty if there are none.
    pub fn select(
        &self,
        conn: &mut dyn Connection,
        owner_id: i64,
        element: &Descriptor,
        detached: &dyn Fn(&str, i64) -> Result<SabresObject>,
    ) -> Result<Vec<Value>> {
        let table = self.table_name();
        if !table_exists(conn, &table)? {
            return Ok(Vec::new());
        }

        let select = Select::new(table.as_str(), [POSITION_COLUMN, VALUE_COLUMN])
            .where_(Where::equal_to(OWNER_ID_COLUMN, &Value::Long(owner_id)));
        let mut rows = conn.query(&select.to_sql())?;
        rows.sort_by_key(|row| row.get_i64(POSITION_COLUMN));

        rows.iter()
            .map(|row| {
                let raw = row.get(VALUE_COLUMN).ok_or_else(|| SabresError::Decode {
                    column: format!("{table}.{VALUE_COLUMN}"),
                    reason: "missing list element".into(),
                })?;
                Value::decode(element, raw, VALUE_COLUMN, detached)
            })
            .collect()
    }
}
