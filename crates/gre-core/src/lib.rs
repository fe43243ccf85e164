//! Reactive rule engine over a property graph.
//!
//! Module map mirrors the pipeline a rule body travels through: DSL text is
//! [`parser`] into `gre_ast`, expressions are run by [`eval`], graph
//! patterns are lowered by [`translate`] for backends that speak SQL,
//! [`store`] is the storage seam, [`registry`] holds actions and rules,
//! [`exec`] performs one transactional action, [`event`] fans update events
//! out to observers, [`engine`] drives the reactive cascade, and [`batch`]
//! runs many actions concurrently.

pub mod batch;
pub mod bindings;
pub mod engine;
pub mod errors;
pub mod eval;
pub mod event;
pub mod exec;
pub mod hashing;
pub mod parser;
pub mod registry;
pub mod store;
pub mod translate;

pub use batch::{BatchExecution, BatchExecutionConfig, BatchExecutionResult, BatchExecutor, BatchFailure, BatchSuccess, ProgressEvent};
pub use bindings::{initial_bindings, BoundVar, Bindings};
pub use engine::{RuleEngine, DEFAULT_CASCADE_LIMIT};
pub use errors::{EngineError, StoreError, ValidationError};
pub use eval::{call_builtin, entity_to_value, EvalContext, Evaluator};
pub use event::{GraphEventEmitter, Listener, SubscriptionId};
pub use exec::{ActionExecutor, ExecutionResult};
pub use hashing::{hash_str, hash_value, to_canonical_json};
pub use parser::{lex, parse, ParseError, Spanned, Token};
pub use registry::{ActionRegistry, RuleRegistry};
pub use store::{neighbors_sql, shortest_path_sql, GraphStore, InMemoryGraphStore, Row};
pub use translate::{Params, SqlTranslator};
