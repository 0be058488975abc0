use crate::error::{Result, SabresError};
use crate::object::SabresObject;
use crate::store::Sabres;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Builds a fresh, transient instance of one class.
pub type ObjectFactory = Arc<dyn Fn(&Sabres) -> SabresObject + Send + Sync>;

struct Registrations {
    factories: BTreeMap<String, ObjectFactory>,
    sealed: bool,
}

/// Class name → factory. Sealed once the connection has been opened.
pub struct ClassRegistry {
    inner: Mutex<Registrations>,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        ClassRegistry {
            inner: Mutex::new(Registrations {
                factories: BTreeMap::new(),
                sealed: false,
            }),
        }
    }
}

impl ClassRegistry {
    fn lock(&self) -> MutexGuard<'_, Registrations> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, class: &str, factory: ObjectFactory) -> Result<()> {
        let mut inner = self.lock();
        if inner.sealed {
            return Err(SabresError::IllegalState(format!(
                "Cannot register class {class} after the database has been opened"
            )));
        }
        if class.is_empty() {
            return Err(SabresError::Validation("Class name cannot be empty".into()));
        }
        inner.factories.insert(class.to_string(), factory);
        Ok(())
    }

    pub fn seal(&self) {
        self.lock().sealed = true;
    }

    pub fn contains(&self, class: &str) -> bool {
        self.lock().factories.contains_key(class)
    }

    pub fn class_names(&self) -> Vec<String> {
        self.lock().factories.keys().cloned().collect()
    }

    pub fn factory(&self, class: &str) -> Result<ObjectFactory> {
        self.lock()
            .factories
            .get(class)
            .cloned()
            .ok_or_else(|| SabresError::UnregisteredClass(class.to_string()))
    }
}

/// Factory producing a blank instance of `class`.
pub fn default_factory(class: &str) -> ObjectFactory {
    let class = class.to_string();
    Arc::new(move |sabres: &Sabres| SabresObject::new(sabres, &class))
}
