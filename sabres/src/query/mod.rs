use crate::background::Completion;
use crate::error::{Result, SabresError};
use crate::object::{decode_objects, SabresObject};
use crate::schema::{Schema, OBJECT_ID_KEY};
use crate::sql::{Select, Statement, Where};
use crate::store::Sabres;
use crate::value::{Descriptor, IntoValue, Value};

/// Equality lookup over one class.
///
/// Predicates are combined with AND. Invalid predicates are reported when the
/// query runs.
pub struct Query {
    sabres: Sabres,
    class: String,
    predicates: Vec<(String, Value)>,
    invalid: Option<String>,
}

impl Query {
    pub(crate) fn new(sabres: Sabres, class: &str) -> Self {
        Query {
            sabres,
            class: class.to_string(),
            predicates: Vec::new(),
            invalid: None,
        }
    }

    pub fn equal_to(mut self, key: &str, value: impl IntoValue) -> Self {
        match value.into_value() {
            Ok(value) => self.predicates.push((key.to_string(), value)),
            Err(SabresError::Validation(reason)) => {
                self.invalid.get_or_insert(format!("{key}: {reason}"));
            }
            Err(e) => {
                self.invalid.get_or_insert(format!("{key}: {e}"));
            }
        }
        self
    }

    pub fn find(&self) -> Result<Vec<SabresObject>> {
        let mut session = self.sabres.session()?;
        let conn = session.conn();
        let Some(schema) = self.sabres.schemas().load(conn, &self.class)? else {
            return Ok(Vec::new());
        };
        let select = Select::new(self.class.as_str(), schema.columns()).where_(self.predicate(&schema)?);
        let rows = conn.query(&select.to_sql())?;
        decode_objects(&self.sabres, conn, &self.class, &schema, &rows)
    }

    pub fn first(&self) -> Result<Option<SabresObject>> {
        Ok(self.find()?.into_iter().next())
    }

    pub fn count(&self) -> Result<i64> {
        let mut session = self.sabres.session()?;
        let conn = session.conn();
        let Some(schema) = self.sabres.schemas().load(conn, &self.class)? else {
            return Ok(0);
        };
        let select = Select::count(self.class.as_str()).where_(self.predicate(&schema)?);
        let rows = conn.query(&select.to_sql())?;
        Ok(rows
            .first()
            .and_then(|row| row.get_i64("COUNT(*)"))
            .unwrap_or(0))
    }

    pub fn find_in_background(self) -> Completion<Vec<SabresObject>> {
        Completion::spawn(move || self.find())
    }

    fn predicate(&self, schema: &Schema) -> Result<Where> {
        if let Some(reason) = &self.invalid {
            return Err(SabresError::Validation(format!("Invalid query value for {reason}")));
        }

        let mut clause = Where::default();
        for (key, value) in &self.predicates {
            let expected = if key == OBJECT_ID_KEY {
                Descriptor::Long
            } else {
                match schema.get(key) {
                    Some(Descriptor::List { .. }) => {
                        return Err(SabresError::Validation(format!(
                            "Cannot query list attribute {}.{}",
                            self.class, key
                        )))
                    }
                    Some(descriptor) => descriptor.clone(),
                    None => {
                        return Err(SabresError::Validation(format!(
                            "Class {} has no attribute {}",
                            self.class, key
                        )))
                    }
                }
            };
            let actual = value.descriptor();
            let id_lookup = key == OBJECT_ID_KEY && actual == Descriptor::Integer;
            if actual != expected && !id_lookup {
                return Err(SabresError::Validation(format!(
                    "Attribute {}.{} is {}, not {}",
                    self.class, key, expected, actual
                )));
            }
            clause = clause.and(key.as_str(), value);
        }
        Ok(clause)
    }
}
