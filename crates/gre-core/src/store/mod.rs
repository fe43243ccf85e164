//! Graph store interface (C3, §4.2). The *only* way the rest of the core
//! touches persisted graph data. Direct SQL appears only inside the pattern
//! translator (§4.5, `crate::translate`) and a backend's own implementation
//! of this trait — e.g. `gre-persistence`'s Postgres store calls the
//! translator to build SQL text and runs it through
//! `execute_parameterized_sql`; the in-memory store below just walks the
//! AST directly.

mod cte;
mod in_memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use gre_ast::{Direction, ForClause, GraphEntity, Neighbor, Pattern, Value};

use crate::bindings::Bindings;
use crate::errors::StoreError;

pub use cte::{neighbors_sql, shortest_path_sql};
pub use in_memory::InMemoryGraphStore;

/// One row returned by `execute_parameterized_sql`: a backend-specific
/// escape hatch for callers (recursive-CTE neighbor/path queries, rule
/// storage) that need raw result sets rather than whole `GraphEntity`
/// values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row(pub BTreeMap<String, Value>);

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn get_entity(&self, id: i64) -> Result<Option<GraphEntity>, StoreError>;

    async fn get_entity_by_name(&self, name: &str, entity_type: Option<&str>) -> Result<Option<GraphEntity>, StoreError>;

    async fn search_entities(&self, term: &str, entity_type: Option<&str>, limit: usize) -> Result<Vec<GraphEntity>, StoreError>;

    async fn neighbors(
        &self,
        entity_name: &str,
        hops: u32,
        direction: Direction,
        relationship_type: Option<&str>,
        property_filter: Option<(&str, &Value)>,
    ) -> Result<Vec<Neighbor>, StoreError>;

    async fn shortest_path(&self, from_name: &str, to_name: &str, max_depth: u32) -> Result<Option<Vec<GraphEntity>>, StoreError>;

    async fn update_entity_properties(&self, id: i64, merge_patch: BTreeMap<String, Value>) -> Result<GraphEntity, StoreError>;

    /// Applies one or more property patches as a single atomic unit — all
    /// commit together or none do — for the action executor's persist step
    /// (§4.6) and the rule engine's per-row `SET` mutations (§4.8, "one
    /// transaction per rule execution"). The in-memory backend has no
    /// separate transaction log and applies patches in order; the
    /// Postgres backend wraps the whole batch, including each patch's own
    /// read-modify-write, in one `conn.transaction(...)`, closing the race
    /// a bare sequence of `update_entity_properties` calls would have under
    /// concurrent writers.
    async fn run_in_transaction(&self, mutations: Vec<(i64, BTreeMap<String, Value>)>) -> Result<Vec<GraphEntity>, StoreError>;

    /// Translates and runs a rule body's `FOR` clause, returning one
    /// `GraphEntity` per matching row. Backends that keep data relationally
    /// route this through `crate::translate::SqlTranslator`; the in-memory
    /// backend evaluates the AST directly.
    async fn query_for_clause(&self, for_clause: &ForClause, bindings: &Bindings) -> Result<Vec<GraphEntity>, StoreError>;

    /// Evaluates an `EXISTS(pattern)` sub-expression against bound variables.
    async fn exists_pattern(&self, pattern: &Pattern, bindings: &Bindings) -> Result<bool, StoreError>;

    /// Raw parameterized SQL escape hatch (§4.2); backends with no SQL
    /// engine behind them (the in-memory store) return `StoreError::Backend`.
    async fn execute_parameterized_sql(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError>;
}
