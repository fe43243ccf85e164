//! `graphrules` top-level library.
//!
//! Thin glue over the workspace: re-exports the pieces `main.rs`'s demo
//! needs so a caller embedding this crate doesn't have to depend on
//! `gre-ast`/`gre-core` directly for the common path.

pub use gre_ast::{Direction, Expr, ForClause, GraphEntity, GraphRelationship, ParsedItem, RuleDef, Statement, Trigger, TriggerType, UpdateEvent, Value};
pub use gre_core::{parse, ActionExecutor, ActionRegistry, GraphEventEmitter, GraphStore, InMemoryGraphStore, RuleEngine, RuleRegistry};
