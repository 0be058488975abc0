use crate::classes::{default_factory, ClassRegistry, ObjectFactory};
use crate::config::SabresConfig;
use crate::connection::{Connection, SqliteConnection};
use crate::error::{Result, SabresError};
use crate::object::{decode_objects, Model, SabresObject};
use crate::query::Query;
use crate::schema::{Schema, SchemaRegistry};
use crate::sql::{Select, Statement};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The main entry point for Sabres.
///
/// Holds the shared connection, the schema registry and the class registry.
/// Cloning is cheap and every clone refers to the same database.
#[derive(Clone)]
pub struct Sabres {
    inner: Arc<Inner>,
}

struct Inner {
    config: SabresConfig,
    connection: Mutex<Box<dyn Connection>>,
    schemas: SchemaRegistry,
    classes: ClassRegistry,
}

/// Collects class registrations, then opens the database.
///
/// Registration is only possible here, so every class is known before the
/// connection is first opened.
#[derive(Default)]
pub struct SabresBuilder {
    classes: Vec<(String, ObjectFactory)>,
    discover: bool,
}

impl SabresBuilder {
    /// Register `class` with a custom factory.
    pub fn register<F>(mut self, class: &str, factory: F) -> Self
    where
        F: Fn(&Sabres) -> SabresObject + Send + Sync + 'static,
    {
        let factory: ObjectFactory = Arc::new(factory);
        self.classes.push((class.to_string(), factory));
        self
    }

    pub fn register_model<M: Model>(mut self) -> Self {
        self.classes
            .push((M::CLASS_NAME.to_string(), default_factory(M::CLASS_NAME)));
        self
    }

    /// Also register every class recorded in the database's schema metadata.
    pub fn discover_classes(mut self) -> Self {
        self.discover = true;
        self
    }

    pub fn open(self, config: SabresConfig) -> Result<Sabres> {
        let connection = SqliteConnection::new(&config);
        self.open_with(config, Box::new(connection))
    }

    pub fn open_in_memory(self) -> Result<Sabres> {
        self.open(SabresConfig::in_memory())
    }

    /// Open over an arbitrary storage engine.
    pub fn open_with(self, config: SabresConfig, connection: Box<dyn Connection>) -> Result<Sabres> {
        let classes = ClassRegistry::default();
        for (class, factory) in self.classes {
            classes.register(&class, factory)?;
        }

        let sabres = Sabres {
            inner: Arc::new(Inner {
                schemas: SchemaRegistry::new(config.metadata_table.as_str()),
                config,
                connection: Mutex::new(connection),
                classes,
            }),
        };
        sabres.boot(self.discover)?;
        Ok(sabres)
    }
}

impl Sabres {
    pub fn builder() -> SabresBuilder {
        SabresBuilder::default()
    }

    /// Create the metadata table, seal the class registry and load the schema
    /// of every registered class.
    fn boot(&self, discover: bool) -> Result<()> {
        let mut session = self.session()?;
        let conn = session.conn();
        self.inner.schemas.initialize(conn)?;

        if discover {
            for class in self.inner.schemas.persisted_classes(conn)? {
                if !self.inner.classes.contains(&class) {
                    self.inner.classes.register(&class, default_factory(&class))?;
                }
            }
        }
        self.inner.classes.seal();

        let class_names = self.inner.classes.class_names();
        for class in &class_names {
            self.inner.schemas.load(conn, class)?;
        }
        log::info!(
            "Opened {} with {} registered classes",
            self.inner.config.database,
            class_names.len()
        );
        Ok(())
    }

    /// Lock and open the shared connection for the duration of one operation.
    pub(crate) fn session(&self) -> Result<Session<'_>> {
        let mut conn = self
            .inner
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        conn.open()?;
        Ok(Session { conn })
    }

    pub(crate) fn schemas(&self) -> &SchemaRegistry {
        &self.inner.schemas
    }

    pub fn config(&self) -> &SabresConfig {
        &self.inner.config
    }

    pub fn class_names(&self) -> Vec<String> {
        self.inner.classes.class_names()
    }

    /// Current schema of `class`, `None` until its first save.
    pub fn schema(&self, class: &str) -> Option<Schema> {
        self.inner.schemas.get_schema(class)
    }

    /// New transient instance of a registered class.
    pub fn create(&self, class: &str) -> Result<SabresObject> {
        let factory = self.inner.classes.factory(class)?;
        let object = factory(self);
        if object.class_name() != class {
            return Err(SabresError::IllegalState(format!(
                "Factory for class {} produced an instance of {}",
                class,
                object.class_name()
            )));
        }
        Ok(object)
    }

    /// Instance standing for the stored object `id` whose data has not been fetched.
    pub fn create_without_data(&self, class: &str, id: i64) -> Result<SabresObject> {
        let object = self.create(class)?;
        object.detach(id);
        Ok(object)
    }

    pub fn create_model<M: Model>(&self) -> Result<M> {
        Ok(M::from_object(self.create(M::CLASS_NAME)?))
    }

    pub fn query(&self, class: &str) -> Query {
        Query::new(self.clone(), class)
    }

    /// Every stored object of `class`, fully populated. Meant for diagnostics.
    pub fn fetch_all(&self, class: &str) -> Result<Vec<SabresObject>> {
        let mut session = self.session()?;
        let conn = session.conn();
        let Some(schema) = self.inner.schemas.load(conn, class)? else {
            return Ok(Vec::new());
        };
        let rows = conn.query(&Select::new(class, schema.columns()).to_sql())?;
        decode_objects(self, conn, class, &schema, &rows)
    }
}

/// Exclusive use of the shared connection; closes it when dropped.
pub(crate) struct Session<'a> {
    conn: MutexGuard<'a, Box<dyn Connection>>,
}

impl Session<'_> {
    pub(crate) fn conn(&mut self) -> &mut dyn Connection {
        &mut **self.conn
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.conn.close() {
            log::warn!("Failed to close connection: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Descriptor;

    #[test]
    fn test_open_in_memory() {
        let sabres = Sabres::builder()
            .register("Movie", |sabres: &Sabres| SabresObject::new(sabres, "Movie"))
            .open_in_memory()
            .unwrap();
        assert_eq!(sabres.class_names(), vec!["Movie"]);
        assert!(sabres.schema("Movie").is_none());
        assert!(sabres.fetch_all("Movie").unwrap().is_empty());
    }

    #[test]
    fn test_create_requires_registration() {
        let sabres = Sabres::builder().open_in_memory().unwrap();
        assert!(matches!(
            sabres.create("Movie"),
            Err(SabresError::UnregisteredClass(_))
        ));
    }

    #[test]
    fn test_factory_must_build_its_class() {
        let sabres = Sabres::builder()
            .register("Movie", |sabres: &Sabres| SabresObject::new(sabres, "Film"))
            .open_in_memory()
            .unwrap();
        assert!(matches!(
            sabres.create("Movie"),
            Err(SabresError::IllegalState(_))
        ));
    }

    #[test]
    fn test_create_without_data_is_detached() {
        let sabres = Sabres::builder()
            .register("Movie", |sabres: &Sabres| SabresObject::new(sabres, "Movie"))
            .open_in_memory()
            .unwrap();
        let movie = sabres.create_without_data("Movie", 4).unwrap();
        assert_eq!(movie.object_id(), 4);
        assert!(!movie.is_data_available());
    }

    #[test]
    fn test_schema_survives_reopen_and_discovery() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = SabresConfig::with_database(tmp.path().join("movies.db"));

        {
            let sabres = Sabres::builder()
                .register("Movie", |sabres: &Sabres| SabresObject::new(sabres, "Movie"))
                .open(config.clone())
                .unwrap();
            let movie = sabres.create("Movie").unwrap();
            movie.put("title", "Fight Club").unwrap();
            movie.save().unwrap();
        }

        let reopened = Sabres::builder().discover_classes().open(config).unwrap();
        assert_eq!(reopened.class_names(), vec!["Movie"]);
        let schema = reopened.schema("Movie").unwrap();
        assert_eq!(schema.get("title"), Some(&Descriptor::String));
        assert_eq!(schema.get("createdAt"), Some(&Descriptor::Date));

        let movies = reopened.fetch_all("Movie").unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(
            movies[0].get_string("title").unwrap(),
            Some("Fight Club".to_string())
        );
    }
}
