pub mod background;
pub mod classes;
pub mod config;
pub mod connection;
pub mod error;
pub mod list;
pub mod object;
pub mod query;
pub mod schema;
pub mod sql;
pub mod store;
pub mod value;

pub use background::Completion;
pub use config::SabresConfig;
pub use connection::{Connection, Row, SqliteConnection};
pub use error::{ErrorKind, Result, SabresError};
pub use object::{Model, SabresObject, CREATED_AT_KEY, UPDATED_AT_KEY};
pub use query::Query;
pub use schema::{Schema, OBJECT_ID_KEY};
pub use store::{Sabres, SabresBuilder};
pub use value::{Descriptor, IntoValue, Value};
