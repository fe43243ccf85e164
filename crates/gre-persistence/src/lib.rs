//! Postgres-backed persistence: a `GraphStore` implementation, rule/action
//! DSL storage, connection pooling, embedded migrations and `.env`
//! configuration. Mirrors `chem-persistence`'s role for this workspace.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::init_dotenv;
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, PgActionStorage, PgGraphStore, PgPool, PgRuleStorage};
