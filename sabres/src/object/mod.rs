mod model;
mod save;

pub use model::Model;

use crate::background::{self, Completion};
use crate::connection::{Connection, Row};
use crate::error::{Result, SabresError};
use crate::list::ListStore;
use crate::schema::{check_binding, Schema, OBJECT_ID_KEY};
use crate::sql::{Delete, Select, Statement, Where};
use crate::store::Sabres;
use crate::value::{Descriptor, IntoValue, Value};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

/// Attribute stamped on the first save of an object.
pub const CREATED_AT_KEY: &str = "createdAt";
/// Attribute stamped on every save of an object.
pub const UPDATED_AT_KEY: &str = "updatedAt";

const UNDEFINED: &str = "(undefined)";

#[derive(Debug, Clone, Default)]
pub(crate) struct ObjectState {
    pub(crate) id: i64,
    pub(crate) values: BTreeMap<String, Value>,
    /// Attributes the class schema does not know yet.
    pub(crate) schema_changes: BTreeMap<String, Descriptor>,
    pub(crate) dirty_keys: BTreeSet<String>,
    pub(crate) data_available: bool,
}

/// A persistent object: a class name, a row id and a set of typed attributes.
///
/// Instances are handles; clones share state. An object is Transient until
/// its first save (`object_id() == 0`), Clean after a save or fetch, Dirty
/// after a `put`, and Detached when it only stands for a stored row whose
/// data has not been fetched (see [`Sabres::create_without_data`]).
#[derive(Clone)]
pub struct SabresObject {
    sabres: Sabres,
    class_name: Arc<str>,
    state: Arc<Mutex<ObjectState>>,
}

macro_rules! typed_getter {
    ($($name:ident => $variant:ident : $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&self, key: &str) -> Result<Option<$ty>> {
                Ok(match self.get_value(key)? {
                    Some(Value::$variant(v)) => Some(v),
                    _ => None,
                })
            }
        )*
    };
}

impl SabresObject {
    /// Blank transient instance of `class`. Normally called from a class factory.
    pub fn new(sabres: &Sabres, class: &str) -> Self {
        SabresObject {
            sabres: sabres.clone(),
            class_name: Arc::from(class),
            state: Arc::new(Mutex::new(ObjectState::default())),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ObjectState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Identity of the shared state, stable across clones.
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.state) as usize
    }

    pub(crate) fn sabres(&self) -> &Sabres {
        &self.sabres
    }

    pub fn object_id(&self) -> i64 {
        self.lock().id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn is_data_available(&self) -> bool {
        self.lock().data_available
    }

    pub fn is_dirty(&self) -> bool {
        !self.lock().dirty_keys.is_empty()
    }

    pub fn is_dirty_key(&self, key: &str) -> bool {
        self.lock().dirty_keys.contains(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().values.contains_key(key)
    }

    /// Attribute names of the class, including ones this instance is about to add.
    pub fn key_set(&self) -> BTreeSet<String> {
        let mut keys: BTreeSet<String> = self
            .sabres
            .schema(&self.class_name)
            .map(|schema| schema.keys().cloned().collect())
            .unwrap_or_default();
        keys.extend(self.lock().schema_changes.keys().cloned());
        keys
    }

    /// Whether both objects are stored rows of the same class with the same id.
    pub fn has_same_id(&self, other: &SabresObject) -> bool {
        let id = self.object_id();
        id != 0 && self.class_name == other.class_name && id == other.object_id()
    }

    /// Turn this instance into a reference to the stored row `id`.
    pub(crate) fn detach(&self, id: i64) {
        let mut state = self.lock();
        *state = ObjectState {
            id,
            ..ObjectState::default()
        };
    }

    /// Replace the whole state with a row just read from storage.
    pub(crate) fn load(&self, id: i64, values: BTreeMap<String, Value>) {
        let mut state = self.lock();
        *state = ObjectState {
            id,
            values,
            data_available: true,
            ..ObjectState::default()
        };
    }

    /// Set `key` to `value` and mark it dirty.
    ///
    /// Fails with a schema conflict if the class already binds `key` to a
    /// different type; the instance is left untouched in that case.
    pub fn put(&self, key: &str, value: impl IntoValue) -> Result<()> {
        if key.is_empty() {
            return Err(SabresError::Validation("Key cannot be empty".into()));
        }
        if key == OBJECT_ID_KEY {
            return Err(SabresError::Validation(format!(
                "{OBJECT_ID_KEY} is assigned by the database and cannot be set"
            )));
        }
        let value = value.into_value()?;
        let schema = self.sabres.schemas().get_schema(&self.class_name);
        self.store(key, value, schema.as_ref())
    }

    /// Conflict-checked assignment against an explicit schema.
    pub(crate) fn store(&self, key: &str, value: Value, schema: Option<&Schema>) -> Result<()> {
        let descriptor = value.descriptor();
        let is_new = check_binding(schema, &self.class_name, key, &descriptor)?;

        let mut state = self.lock();
        if is_new {
            state.schema_changes.insert(key.to_string(), descriptor);
        } else {
            state.schema_changes.remove(key);
        }
        state.values.insert(key.to_string(), value);
        state.dirty_keys.insert(key.to_string());
        Ok(())
    }

    /// Set `key` to a list holding only `value`, replacing any previous list.
    pub fn add(&self, key: &str, value: impl IntoValue) -> Result<()> {
        self.put(key, Value::list(vec![value.into_value()?])?)
    }

    pub fn add_all<V: IntoValue>(&self, key: &str, values: impl IntoIterator<Item = V>) -> Result<()> {
        self.put(key, values.into_iter().collect::<Vec<V>>())
    }

    /// Current value of `key`, `None` when unset.
    ///
    /// Fails with `IllegalState` on a stored object whose data has not been fetched.
    pub fn get_value(&self, key: &str) -> Result<Option<Value>> {
        let state = self.lock();
        if state.id != 0 && !state.data_available {
            return Err(SabresError::IllegalState(format!(
                "Data of {}({}) is not available, fetch it first",
                self.class_name, state.id
            )));
        }
        Ok(state.values.get(key).cloned())
    }

    typed_getter! {
        get_bool => Boolean: bool,
        get_byte => Byte: i8,
        get_short => Short: i16,
        get_int => Integer: i32,
        get_long => Long: i64,
        get_float => Float: f32,
        get_double => Double: f64,
        get_string => String: String,
        get_date => Date: DateTime<Utc>,
        get_list => List: Vec<Value>,
        get_object => Pointer: SabresObject,
    }

    pub fn created_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.get_date(CREATED_AT_KEY)
    }

    pub fn updated_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.get_date(UPDATED_AT_KEY)
    }

    /// Display form of `key`, `(undefined)` when unset.
    pub fn stringify(&self, key: &str) -> Result<String> {
        Ok(self
            .get_value(key)?
            .map_or_else(|| UNDEFINED.to_string(), |value| value.to_string()))
    }

    /// JSON object with `objectId` and every attribute held in memory.
    pub fn to_json(&self) -> serde_json::Value {
        let (id, values) = {
            let state = self.lock();
            (state.id, state.values.clone())
        };
        let mut map = serde_json::Map::new();
        map.insert(OBJECT_ID_KEY.to_string(), id.into());
        for (key, value) in &values {
            map.insert(key.clone(), value.to_json());
        }
        serde_json::Value::Object(map)
    }

    /// Persist this object and every new or modified object it points to,
    /// in one transaction.
    ///
    /// On failure nothing is written and every touched instance is restored
    /// to its state before the call. Saving a clean object does nothing.
    pub fn save(&self) -> Result<()> {
        save::save(self)
    }

    /// Replace the in-memory state with the stored row.
    pub fn fetch(&self) -> Result<()> {
        let id = self.require_id("fetch")?;
        let mut session = self.sabres.session()?;
        let conn = session.conn();
        let not_found = || SabresError::NotFound {
            class: self.class_name.to_string(),
            id,
        };

        let Some(schema) = self.sabres.schemas().load(conn, &self.class_name)? else {
            return Err(not_found());
        };
        let select = Select::new(self.class_name(), schema.columns())
            .where_(Where::equal_to(OBJECT_ID_KEY, &Value::Long(id)));
        let rows = conn.query(&select.to_sql())?;
        let Some(row) = rows.first() else {
            return Err(not_found());
        };

        let values = decode_values(&self.sabres, conn, &self.class_name, &schema, id, row)?;
        self.load(id, values);
        log::debug!("Fetched {}({})", self.class_name, id);
        Ok(())
    }

    /// Delete the stored row. Pointed-to objects and list contents are kept.
    pub fn delete(&self) -> Result<()> {
        let id = self.require_id("delete")?;
        let mut session = self.sabres.session()?;
        let conn = session.conn();

        if self.sabres.schemas().load(conn, &self.class_name)?.is_none() {
            return Err(SabresError::NotFound {
                class: self.class_name.to_string(),
                id,
            });
        }
        let delete = Delete::new(self.class_name())
            .where_(Where::equal_to(OBJECT_ID_KEY, &Value::Long(id)));
        conn.exec(&delete.to_sql())?;
        log::debug!("Deleted {}({})", self.class_name, id);
        Ok(())
    }

    fn require_id(&self, operation: &str) -> Result<i64> {
        match self.object_id() {
            0 => Err(SabresError::Validation(format!(
                "Cannot {operation} {}: it has never been saved",
                self.class_name
            ))),
            id => Ok(id),
        }
    }

    pub fn save_in_background(&self) -> Completion<()> {
        let object = self.clone();
        Completion::spawn(move || object.save())
    }

    pub fn fetch_in_background(&self) -> Completion<()> {
        let object = self.clone();
        Completion::spawn(move || object.fetch())
    }

    pub fn delete_in_background(&self) -> Completion<()> {
        let object = self.clone();
        Completion::spawn(move || object.delete())
    }

    /// Save on a worker thread and hand the outcome to `callback` there.
    pub fn save_with<C>(&self, callback: C) -> JoinHandle<()>
    where
        C: FnOnce(Result<()>) + Send + 'static,
    {
        let object = self.clone();
        background::spawn_with(move || object.save(), callback)
    }

    pub fn fetch_with<C>(&self, callback: C) -> JoinHandle<()>
    where
        C: FnOnce(Result<()>) + Send + 'static,
    {
        let object = self.clone();
        background::spawn_with(move || object.fetch(), callback)
    }

    pub fn delete_with<C>(&self, callback: C) -> JoinHandle<()>
    where
        C: FnOnce(Result<()>) + Send + 'static,
    {
        let object = self.clone();
        background::spawn_with(move || object.delete(), callback)
    }
}

impl PartialEq for SabresObject {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state) || self.has_same_id(other)
    }
}

impl fmt::Debug for SabresObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Pointer cycles make a deep format unsafe, so only our own keys are shown
        let mut debug = f.debug_struct("SabresObject");
        debug.field("class", &self.class_name);
        match self.state.try_lock() {
            Ok(state) => {
                debug
                    .field("id", &state.id)
                    .field("keys", &state.values.keys().collect::<Vec<_>>())
                    .field("dirty", &state.dirty_keys)
                    .field("data_available", &state.data_available);
            }
            Err(_) => {
                debug.field("state", &"<locked>");
            }
        }
        debug.finish()
    }
}

/// Decode one stored row of `class` into attribute values.
///
/// Pointers become detached instances; lists are read from their list tables.
pub(crate) fn decode_values(
    sabres: &Sabres,
    conn: &mut dyn Connection,
    class: &str,
    schema: &Schema,
    id: i64,
    row: &Row,
) -> Result<BTreeMap<String, Value>> {
    let detached = |class: &str, id: i64| sabres.create_without_data(class, id);
    let mut values = BTreeMap::new();

    for (key, descriptor) in schema.iter() {
        let value = match descriptor {
            Descriptor::List { element } => {
                let elements = ListStore::new(class, key.as_str()).select(conn, id, element, &detached)?;
                if elements.is_empty() {
                    continue;
                }
                Value::List(elements)
            }
            _ => match row.get(key) {
                Some(raw) if !row.is_null(key) => Value::decode(descriptor, raw, key, &detached)?,
                _ => continue,
            },
        };
        values.insert(key.clone(), value);
    }
    Ok(values)
}

/// Build clean instances of `class` from full rows.
pub(crate) fn decode_objects(
    sabres: &Sabres,
    conn: &mut dyn Connection,
    class: &str,
    schema: &Schema,
    rows: &[Row],
) -> Result<Vec<SabresObject>> {
    rows.iter()
        .map(|row| -> Result<SabresObject> {
            let id = row.get_i64(OBJECT_ID_KEY).ok_or_else(|| SabresError::Decode {
                column: format!("{class}.{OBJECT_ID_KEY}"),
                reason: "missing row id".into(),
            })?;
            let values = decode_values(sabres, conn, class, schema, id, row)?;
            let object = sabres.create(class)?;
            object.load(id, values);
            Ok(object)
        })
        .collect()
}
