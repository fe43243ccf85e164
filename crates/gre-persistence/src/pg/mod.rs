//! Postgres-backed `GraphStore` plus rule/action DSL storage (§4.2, §4.10).
//!
//! Diesel is synchronous; every public method offloads its blocking work to
//! `tokio::task::spawn_blocking` so this can sit behind `gre_core::GraphStore`
//! (an `#[async_trait]`) without starving the async runtime.

mod action_storage;
mod rule_storage;

pub use action_storage::PgActionStorage;
pub use rule_storage::PgRuleStorage;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel::sql_types::{BigInt, Bool, Double, Jsonb, Nullable, Text};
use gre_ast::{Direction, ForClause, GraphEntity, GraphRelationship, Neighbor, Pattern, Value};
use gre_core::bindings::Bindings;
use gre_core::errors::StoreError;
use gre_core::store::{neighbors_sql, shortest_path_sql, GraphStore, Row};
use gre_core::translate::SqlTranslator;

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::{graph_entities, graph_relationships};

pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Builds an r2d2 pool and runs pending migrations against it once.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let min = min_size.max(1);
    let max = max_size.max(min);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(min)).max_size(max).build(manager).map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env();
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}

#[derive(Queryable, QueryableByName, Debug)]
#[diesel(table_name = graph_entities)]
struct EntityRow {
    id: i64,
    name: String,
    entity_type: String,
    is_instance: bool,
    properties: serde_json::Value,
    uri: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EntityRow> for GraphEntity {
    fn from(row: EntityRow) -> Self {
        let properties = match gre_ast::Value::from_json(row.properties) {
            Value::Map(m) => m,
            _ => BTreeMap::new(),
        };
        GraphEntity { id: row.id, name: row.name, entity_type: row.entity_type, is_instance: row.is_instance, properties, uri: row.uri, created_at: row.created_at, updated_at: row.updated_at }
    }
}

#[derive(Queryable, QueryableByName, Debug)]
#[diesel(table_name = graph_relationships)]
struct RelationshipRow {
    id: i64,
    source_id: i64,
    target_id: i64,
    relationship_type: String,
    properties: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<RelationshipRow> for GraphRelationship {
    fn from(row: RelationshipRow) -> Self {
        let properties = match gre_ast::Value::from_json(row.properties) {
            Value::Map(m) => m,
            _ => BTreeMap::new(),
        };
        GraphRelationship { id: row.id, source_id: row.source_id, target_id: row.target_id, relationship_type: row.relationship_type, properties, created_at: row.created_at }
    }
}

/// A row wrapped as `row_to_json(t)` — lets `execute_parameterized_sql`
/// accept genuinely arbitrary SQL text despite Diesel's `QueryableByName`
/// wanting a fixed column set: wrapping the caller's query in a single JSON
/// column sidesteps that and gives us a generic `Row(BTreeMap<String, Value>)`
/// on the Rust side.
#[derive(QueryableByName)]
struct JsonRow {
    #[diesel(sql_type = Jsonb)]
    j: serde_json::Value,
}

pub struct PgGraphStore {
    pool: PgPool,
}

impl PgGraphStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool.get().map_err(PersistenceError::from)
    }

    fn run_parameterized(&self, sql: &str, params: &[Value]) -> Result<Vec<serde_json::Value>, PersistenceError> {
        let wrapped = format!("SELECT row_to_json(t) AS j FROM ({sql}) t");
        let mut query = diesel::sql_query(wrapped).into_boxed::<Pg>();
        for p in params {
            query = bind_dynamic(query, p);
        }
        let mut conn = self.conn()?;
        let rows: Vec<JsonRow> = query.get_results(&mut conn)?;
        Ok(rows.into_iter().map(|r| r.j).collect())
    }

    /// Not part of `GraphStore` — relationship rows aren't addressed by id
    /// anywhere in the DSL, but callers building admin tooling over the raw
    /// schema want this.
    pub async fn get_relationship(&self, id: i64) -> Result<Option<GraphRelationship>, StoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<GraphRelationship>, PersistenceError> {
            let mut conn = pool.get()?;
            let row: Option<RelationshipRow> = graph_relationships::table.find(id).first(&mut conn).optional()?;
            Ok(row.map(GraphRelationship::from))
        })
        .await
        .map_err(|e| StoreError::Backend(format!("join error: {e}")))?
        .map_err(Into::into)
    }
}

fn bind_dynamic<'a>(query: diesel::query_builder::BoxedSqlQuery<'a, Pg, diesel::query_builder::SqlQuery>, value: &Value) -> diesel::query_builder::BoxedSqlQuery<'a, Pg, diesel::query_builder::SqlQuery> {
    match value {
        Value::Null => query.bind::<Nullable<Text>, _>(None::<String>),
        Value::Bool(b) => query.bind::<Bool, _>(*b),
        Value::Int(i) => query.bind::<BigInt, _>(*i),
        Value::Float(f) => query.bind::<Double, _>(*f),
        Value::String(s) => query.bind::<Text, _>(s.clone()),
        Value::List(_) | Value::Map(_) => query.bind::<Jsonb, _>(value.to_json()),
    }
}

#[async_trait::async_trait]
impl GraphStore for PgGraphStore {
    async fn get_entity(&self, id: i64) -> Result<Option<GraphEntity>, StoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<GraphEntity>, PersistenceError> {
            let mut conn = pool.get()?;
            let row: Option<EntityRow> = graph_entities::table.find(id).first(&mut conn).optional()?;
            Ok(row.map(GraphEntity::from))
        })
        .await
        .map_err(|e| StoreError::Backend(format!("join error: {e}")))?
        .map_err(Into::into)
    }

    async fn get_entity_by_name(&self, name: &str, entity_type: Option<&str>) -> Result<Option<GraphEntity>, StoreError> {
        let pool = self.pool.clone();
        let name = name.to_string();
        let entity_type = entity_type.map(|s| s.to_string());
        tokio::task::spawn_blocking(move || -> Result<Option<GraphEntity>, PersistenceError> {
            let mut conn = pool.get()?;
            let mut query = graph_entities::table.filter(graph_entities::name.eq(&name)).into_boxed();
            if let Some(et) = &entity_type {
                query = query.filter(graph_entities::entity_type.eq(et));
            }
            let row: Option<EntityRow> = query.first(&mut conn).optional()?;
            Ok(row.map(GraphEntity::from))
        })
        .await
        .map_err(|e| StoreError::Backend(format!("join error: {e}")))?
        .map_err(Into::into)
    }

    async fn search_entities(&self, term: &str, entity_type: Option<&str>, limit: usize) -> Result<Vec<GraphEntity>, StoreError> {
        let pool = self.pool.clone();
        let term = format!("%{term}%");
        let entity_type = entity_type.map(|s| s.to_string());
        tokio::task::spawn_blocking(move || -> Result<Vec<GraphEntity>, PersistenceError> {
            let mut conn = pool.get()?;
            let mut query = graph_entities::table.filter(graph_entities::name.ilike(&term)).into_boxed();
            if let Some(et) = &entity_type {
                query = query.filter(graph_entities::entity_type.eq(et));
            }
            let rows: Vec<EntityRow> = query.limit(limit as i64).load(&mut conn)?;
            Ok(rows.into_iter().map(GraphEntity::from).collect())
        })
        .await
        .map_err(|e| StoreError::Backend(format!("join error: {e}")))?
        .map_err(Into::into)
    }

    async fn neighbors(&self, entity_name: &str, hops: u32, direction: Direction, relationship_type: Option<&str>, _property_filter: Option<(&str, &Value)>) -> Result<Vec<Neighbor>, StoreError> {
        let (sql, _) = neighbors_sql(direction);
        let params = vec![Value::String(entity_name.to_string()), Value::Int(hops as i64)];
        let rows = self.run_parameterized(&sql, &params).map_err(StoreError::from)?;
        let mut out = Vec::new();
        for row in rows {
            let Value::Map(map) = gre_ast::Value::from_json(row) else { continue };
            let Some(rel_type) = map.get("rel_type").and_then(|v| v.as_str()) else { continue };
            if let Some(wanted) = relationship_type {
                if rel_type != wanted {
                    continue;
                }
            }
            let entity = map_to_entity(&map);
            let distance = map.get("depth").and_then(|v| v.as_f64()).map(|d| d as u32 - 1).unwrap_or(0);
            let relationship = GraphRelationship { id: 0, source_id: 0, target_id: entity.id, relationship_type: rel_type.to_string(), properties: BTreeMap::new(), created_at: entity.updated_at };
            out.push(Neighbor { entity, relationship, distance });
        }
        Ok(out)
    }

    async fn shortest_path(&self, from_name: &str, to_name: &str, max_depth: u32) -> Result<Option<Vec<GraphEntity>>, StoreError> {
        let Some(from) = self.get_entity_by_name(from_name, None).await? else { return Ok(None) };
        let Some(to) = self.get_entity_by_name(to_name, None).await? else { return Ok(None) };
        let (sql, _) = shortest_path_sql();
        let params = vec![Value::Int(from.id), Value::Int(to.id), Value::Int(max_depth as i64)];
        let rows = self.run_parameterized(&sql, &params).map_err(StoreError::from)?;
        let Some(row) = rows.into_iter().next() else { return Ok(None) };
        let Value::Map(map) = gre_ast::Value::from_json(row) else { return Ok(None) };
        let Some(Value::List(ids)) = map.get("path_ids").cloned() else { return Ok(None) };
        let mut path = Vec::with_capacity(ids.len());
        for id in ids {
            let Value::Int(id) = id else { continue };
            if let Some(entity) = self.get_entity(id).await? {
                path.push(entity);
            }
        }
        Ok(Some(path))
    }

    async fn update_entity_properties(&self, id: i64, merge_patch: BTreeMap<String, Value>) -> Result<GraphEntity, StoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<GraphEntity, PersistenceError> {
            let mut conn = pool.get()?;
            let current: EntityRow = graph_entities::table.find(id).first(&mut conn)?;
            let mut properties = match gre_ast::Value::from_json(current.properties) {
                Value::Map(m) => m,
                _ => BTreeMap::new(),
            };
            for (k, v) in merge_patch {
                properties.insert(k, v);
            }
            let payload = Value::Map(properties).to_json();
            let updated: EntityRow = diesel::update(graph_entities::table.find(id))
                .set((graph_entities::properties.eq(&payload), graph_entities::updated_at.eq(Utc::now())))
                .get_result(&mut conn)?;
            Ok(updated.into())
        })
        .await
        .map_err(|e| StoreError::Backend(format!("join error: {e}")))?
        .map_err(Into::into)
    }

    async fn run_in_transaction(&self, mutations: Vec<(i64, BTreeMap<String, Value>)>) -> Result<Vec<GraphEntity>, StoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<GraphEntity>, PersistenceError> {
            let mut conn = pool.get()?;
            conn.transaction(|conn| -> Result<Vec<GraphEntity>, PersistenceError> {
                let mut updated = Vec::with_capacity(mutations.len());
                for (id, merge_patch) in mutations {
                    let current: EntityRow = graph_entities::table.find(id).first(conn)?;
                    let mut properties = match gre_ast::Value::from_json(current.properties) {
                        Value::Map(m) => m,
                        _ => BTreeMap::new(),
                    };
                    for (k, v) in merge_patch {
                        properties.insert(k, v);
                    }
                    let payload = Value::Map(properties).to_json();
                    let row: EntityRow = diesel::update(graph_entities::table.find(id))
                        .set((graph_entities::properties.eq(&payload), graph_entities::updated_at.eq(Utc::now())))
                        .get_result(conn)?;
                    updated.push(row.into());
                }
                Ok(updated)
            })
        })
        .await
        .map_err(|e| StoreError::Backend(format!("join error: {e}")))?
        .map_err(Into::into)
    }

    async fn query_for_clause(&self, for_clause: &ForClause, bindings: &Bindings) -> Result<Vec<GraphEntity>, StoreError> {
        let (sql, params) = SqlTranslator::new().translate_for(for_clause, bindings).map_err(|e| StoreError::Backend(e.to_string()))?;
        let rows = self.run_parameterized(&sql, &params).map_err(StoreError::from)?;
        Ok(rows
            .into_iter()
            .filter_map(|r| match gre_ast::Value::from_json(r) {
                Value::Map(map) => Some(map_to_entity(&map)),
                _ => None,
            })
            .collect())
    }

    async fn exists_pattern(&self, pattern: &Pattern, bindings: &Bindings) -> Result<bool, StoreError> {
        let (sql, params) = SqlTranslator::new().translate_pattern(pattern, bindings).map_err(|e| StoreError::Backend(e.to_string()))?;
        let wrapped = format!("SELECT {sql} AS matched");
        let rows = self.run_parameterized_select(&wrapped, &params).map_err(StoreError::from)?;
        Ok(rows.first().and_then(|v| v.as_bool()).unwrap_or(false))
    }

    async fn execute_parameterized_sql(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        let rows = self.run_parameterized(sql, params).map_err(StoreError::from)?;
        Ok(rows
            .into_iter()
            .map(|r| match gre_ast::Value::from_json(r) {
                Value::Map(m) => Row(m),
                other => {
                    let mut m = BTreeMap::new();
                    m.insert("value".to_string(), other);
                    Row(m)
                }
            })
            .collect())
    }
}

impl PgGraphStore {
    /// Like `run_parameterized`, but for a bare scalar `SELECT <expr> AS x`
    /// (used by `exists_pattern`, which isn't a row set).
    fn run_parameterized_select(&self, sql: &str, params: &[Value]) -> Result<Vec<bool>, PersistenceError> {
        #[derive(QueryableByName)]
        struct BoolRow {
            #[diesel(sql_type = Bool)]
            matched: bool,
        }
        let mut query = diesel::sql_query(sql).into_boxed::<Pg>();
        for p in params {
            query = bind_dynamic(query, p);
        }
        let mut conn = self.conn()?;
        let rows: Vec<BoolRow> = query.get_results(&mut conn)?;
        Ok(rows.into_iter().map(|r| r.matched).collect())
    }
}

fn map_to_entity(map: &BTreeMap<String, Value>) -> GraphEntity {
    let id = map.get("id").and_then(|v| v.as_f64()).unwrap_or(0.0) as i64;
    let name = map.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let entity_type = map.get("entity_type").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let is_instance = matches!(map.get("is_instance"), Some(Value::Bool(true)) | None);
    let properties = match map.get("properties") {
        Some(Value::Map(m)) => m.clone(),
        _ => BTreeMap::new(),
    };
    let now = map.get("updated_at").and_then(|v| v.as_str()).and_then(|s| DateTime::parse_from_rfc3339(s).ok()).map(|d| d.with_timezone(&Utc)).unwrap_or_else(Utc::now);
    GraphEntity { id, name, entity_type, is_instance, properties, uri: map.get("uri").and_then(|v| v.as_str()).map(str::to_string), created_at: now, updated_at: now }
}
