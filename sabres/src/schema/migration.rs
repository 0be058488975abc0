use super::{Schema, OBJECT_ID_KEY};
use crate::error::{Result, SabresError};
use crate::sql::{AlterTable, Column, CreateTable, SqlType, Statement};
use crate::value::Descriptor;
use std::collections::BTreeMap;

/// The DDL a save must run before writing rows of a class.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaMigration {
    /// First save of the class: the table does not exist yet.
    CreateTable {
        class: String,
        attributes: BTreeMap<String, Descriptor>,
    },
    /// New attributes on an existing table, one column each.
    AddAttributes {
        class: String,
        attributes: BTreeMap<String, Descriptor>,
    },
    Unchanged,
}

impl SchemaMigration {
    /// Reconcile an instance's pending attributes with the class's current schema.
    ///
    /// Pending attributes another instance already added with the same
    /// descriptor are dropped; a different descriptor is a conflict.
    pub fn plan(
        class: &str,
        current: Option<&Schema>,
        pending: &BTreeMap<String, Descriptor>,
    ) -> Result<SchemaMigration> {
        let Some(current) = current else {
            return Ok(SchemaMigration::CreateTable {
                class: class.to_string(),
                attributes: pending.clone(),
            });
        };

        let mut attributes = BTreeMap::new();
        for (key, descriptor) in pending {
            match current.get(key) {
                Some(existing) if existing == descriptor => {}
                Some(existing) => {
                    return Err(SabresError::SchemaConflict {
                        class: class.to_string(),
                        key: key.clone(),
                        existing: existing.to_string(),
                        attempted: descriptor.to_string(),
                    })
                }
                None => {
                    attributes.insert(key.clone(), descriptor.clone());
                }
            }
        }

        if attributes.is_empty() {
            Ok(SchemaMigration::Unchanged)
        } else {
            Ok(SchemaMigration::AddAttributes {
                class: class.to_string(),
                attributes,
            })
        }
    }

    /// Attributes this migration adds to the registry.
    pub fn additions(&self) -> Option<&BTreeMap<String, Descriptor>> {
        match self {
            SchemaMigration::CreateTable { attributes, .. }
            | SchemaMigration::AddAttributes { attributes, .. } => Some(attributes),
            SchemaMigration::Unchanged => None,
        }
    }

    pub fn statements(&self) -> Vec<String> {
        match self {
            SchemaMigration::CreateTable { class, attributes } => {
                let create = attributes.iter().fold(
                    CreateTable::new(class.as_str()).if_not_exists().with_column(
                        Column::new(OBJECT_ID_KEY, SqlType::Integer)
                            .primary_key()
                            .not_null(),
                    ),
                    |create, (key, descriptor)| create.with_column(attribute_column(key, descriptor)),
                );
                vec![create.to_sql()]
            }
            SchemaMigration::AddAttributes { class, attributes } => attributes
                .iter()
                .map(|(key, descriptor)| {
                    AlterTable::add_column(class.as_str(), attribute_column(key, descriptor))
                        .to_sql()
                })
                .collect(),
            SchemaMigration::Unchanged => Vec::new(),
        }
    }

    pub fn describe(&self) -> String {
        let list = |attributes: &BTreeMap<String, Descriptor>| {
            attributes
                .iter()
                .map(|(key, descriptor)| format!("{key}: {descriptor}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self {
            SchemaMigration::CreateTable { class, attributes } => {
                format!("Class '{}' created with ({})", class, list(attributes))
            }
            SchemaMigration::AddAttributes { class, attributes } => {
                format!("Class '{}' gained ({})", class, list(attributes))
            }
            SchemaMigration::Unchanged => "Schema unchanged".to_string(),
        }
    }
}

/// Column holding `key` in its class table. Pointer columns reference the target class.
pub fn attribute_column(key: &str, descriptor: &Descriptor) -> Column {
    let column = Column::new(key, descriptor.sql_type());
    match descriptor.referenced_class() {
        Some(class) => column.references(class, OBJECT_ID_KEY),
        None => column,
    }
}
