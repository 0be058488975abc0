use super::{ObjectState, SabresObject, CREATED_AT_KEY, UPDATED_AT_KEY};
use crate::connection::Connection;
use crate::error::{Result, SabresError};
use crate::list::ListStore;
use crate::schema::{Schema, SchemaMigration, SchemaRegistry, OBJECT_ID_KEY};
use crate::sql::{Insert, Statement, Update, Where};
use crate::value::Value;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Save `root` and its new or modified referents in one transaction.
pub(super) fn save(root: &SabresObject) -> Result<()> {
    {
        let state = root.lock();
        if state.id != 0 && state.dirty_keys.is_empty() {
            return Ok(());
        }
    }

    let sabres = root.sabres().clone();
    let mut session = sabres.session()?;
    let conn = session.conn();
    conn.begin_transaction()?;

    let mut ctx = SaveContext::new(conn, sabres.schemas());
    let outcome = match ctx.save_object(root) {
        Ok(()) => {
            ctx.conn.set_transaction_successful();
            ctx.conn.end_transaction()
        }
        Err(e) => {
            if let Err(rollback) = ctx.conn.end_transaction() {
                log::warn!("Rollback after failed save also failed: {rollback}");
            }
            Err(e)
        }
    };

    match outcome {
        Ok(()) => {
            log::debug!(
                "Saved {}({}) with {} objects",
                root.class_name(),
                root.object_id(),
                ctx.snapshots.len()
            );
            sabres.schemas().publish(ctx.staged);
            Ok(())
        }
        Err(e) => {
            ctx.restore();
            Err(e)
        }
    }
}

/// State of one save call: schemas changed so far, instances touched, and
/// the depth-first walk over the object graph.
struct SaveContext<'a> {
    conn: &'a mut dyn Connection,
    registry: &'a SchemaRegistry,
    /// Schemas migrated in this transaction, published only after commit.
    staged: HashMap<String, Schema>,
    snapshots: Vec<(SabresObject, ObjectState)>,
    on_stack: HashSet<usize>,
    done: HashSet<usize>,
    now: DateTime<Utc>,
}

impl<'a> SaveContext<'a> {
    fn new(conn: &'a mut dyn Connection, registry: &'a SchemaRegistry) -> Self {
        SaveContext {
            conn,
            registry,
            staged: HashMap::new(),
            snapshots: Vec::new(),
            on_stack: HashSet::new(),
            done: HashSet::new(),
            now: truncated_now(),
        }
    }

    fn save_object(&mut self, object: &SabresObject) -> Result<()> {
        let identity = object.identity();
        if self.done.contains(&identity) {
            return Ok(());
        }
        if self.on_stack.contains(&identity) {
            // A stored ancestor's row already exists and is written by its own frame
            if object.object_id() != 0 {
                return Ok(());
            }
            return Err(SabresError::Validation(format!(
                "Cannot save {}: new objects reference each other in a cycle",
                object.class_name()
            )));
        }

        let snapshot = {
            let state = object.lock();
            if state.id != 0 && state.dirty_keys.is_empty() {
                self.done.insert(identity);
                return Ok(());
            }
            state.clone()
        };
        self.snapshots.push((object.clone(), snapshot));

        self.on_stack.insert(identity);
        let result = self.write(object);
        self.on_stack.remove(&identity);
        self.done.insert(identity);
        result
    }

    fn write(&mut self, object: &SabresObject) -> Result<()> {
        let class = object.class_name().to_string();
        let now = Value::Date(self.now);
        let current = self.current_schema(&class)?;
        if object.object_id() == 0 {
            object.store(CREATED_AT_KEY, now.clone(), current.as_ref())?;
        }
        object.store(UPDATED_AT_KEY, now, current.as_ref())?;

        self.migrate(object, &class, current)?;

        let children: Vec<SabresObject> = object
            .lock()
            .values
            .values()
            .flat_map(referents)
            .collect();
        for child in &children {
            self.save_object(child)?;
        }

        let (id, values, dirty_keys) = {
            let state = object.lock();
            (state.id, state.values.clone(), state.dirty_keys.clone())
        };

        let id = if id == 0 {
            self.conn
                .exec(&Insert::new(class.as_str()).values(values.iter()).to_sql())?;
            let id = self.conn.last_insert_id()?;
            object.lock().id = id;
            id
        } else {
            let update = dirty_keys
                .iter()
                .filter_map(|key| values.get(key).map(|value| (key, value)))
                .fold(Update::new(class.as_str()), |update, (key, value)| {
                    update.set(key.as_str(), value)
                })
                .where_(Where::equal_to(OBJECT_ID_KEY, &Value::Long(id)));
            if !update.is_empty() {
                self.conn.exec(&update.to_sql())?;
            }
            id
        };

        for (key, value) in &values {
            if let Value::List(elements) = value {
                ListStore::new(class.as_str(), key.as_str()).insert(self.conn, id, elements)?;
            }
        }

        let mut state = object.lock();
        state.dirty_keys.clear();
        state.schema_changes.clear();
        state.data_available = true;
        Ok(())
    }

    /// Schema of `class` as seen inside this transaction.
    fn current_schema(&mut self, class: &str) -> Result<Option<Schema>> {
        match self.staged.get(class) {
            Some(schema) => Ok(Some(schema.clone())),
            None => self.registry.load(self.conn, class),
        }
    }

    /// Create or alter the class table for the attributes `object` introduces.
    fn migrate(&mut self, object: &SabresObject, class: &str, current: Option<Schema>) -> Result<()> {
        let pending = object.lock().schema_changes.clone();
        let migration = SchemaMigration::plan(class, current.as_ref(), &pending)?;
        for statement in migration.statements() {
            self.conn.exec(&statement)?;
        }
        if let Some(additions) = migration.additions() {
            let merged = self
                .registry
                .update(self.conn, class, current.as_ref(), additions)?;
            log::info!("{}", migration.describe());
            self.staged.insert(class.to_string(), merged);
        }
        Ok(())
    }

    /// Put every touched instance back the way it was before the save.
    fn restore(self) {
        for (object, snapshot) in self.snapshots.into_iter().rev() {
            *object.lock() = snapshot;
        }
    }
}

/// Objects a value points to, directly or as list elements.
fn referents(value: &Value) -> Vec<SabresObject> {
    match value {
        Value::Pointer(object) => vec![object.clone()],
        Value::List(elements) => elements.iter().flat_map(referents).collect(),
        _ => Vec::new(),
    }
}

fn truncated_now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
