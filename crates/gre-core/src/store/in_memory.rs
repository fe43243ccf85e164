//! In-memory `GraphStore` (§4.2), grounded in no particular storage engine:
//! it interprets the AST directly rather than going through
//! `crate::translate::SqlTranslator`, which only the relational backend
//! needs. Used for unit/integration tests and the root demo; `dashmap`
//! gives lock-free concurrent reads matching the batch executor's
//! fan-out (§4.9).

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use gre_ast::{Direction, ForClause, GraphEntity, GraphRelationship, Neighbor, Pattern, PatternEdge, Value};

use crate::bindings::{BoundVar, Bindings};
use crate::errors::StoreError;
use crate::eval::{entity_to_value, EvalContext, Evaluator};

use super::{GraphStore, Row};

pub struct InMemoryGraphStore {
    entities: DashMap<i64, GraphEntity>,
    relationships: DashMap<i64, GraphRelationship>,
    next_entity_id: AtomicI64,
    next_relationship_id: AtomicI64,
    self_ref: Weak<InMemoryGraphStore>,
}

impl InMemoryGraphStore {
    /// `Arc::new_cyclic` lets the store hand itself out as `Arc<dyn
    /// GraphStore>` from `&self` (needed to populate `EvalContext::store`
    /// for `EXISTS` during `query_for_clause`) without the trait's `&self`
    /// receiver having to change.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            entities: DashMap::new(),
            relationships: DashMap::new(),
            next_entity_id: AtomicI64::new(1),
            next_relationship_id: AtomicI64::new(1),
            self_ref: weak.clone(),
        })
    }

    fn as_dyn_store(&self) -> Arc<dyn GraphStore> {
        self.self_ref.upgrade().expect("InMemoryGraphStore dropped while still in use")
    }

    /// Test/demo fixture helper, not part of the `GraphStore` contract:
    /// assigns an id if `entity.id == 0`.
    pub fn insert_entity(&self, mut entity: GraphEntity) -> i64 {
        if entity.id == 0 {
            entity.id = self.next_entity_id.fetch_add(1, Ordering::SeqCst);
        }
        let id = entity.id;
        self.entities.insert(id, entity);
        id
    }

    /// Test/demo fixture helper: assigns an id if `rel.id == 0`.
    pub fn insert_relationship(&self, mut rel: GraphRelationship) -> i64 {
        if rel.id == 0 {
            rel.id = self.next_relationship_id.fetch_add(1, Ordering::SeqCst);
        }
        let id = rel.id;
        self.relationships.insert(id, rel);
        id
    }

    fn find_by_name(&self, name: &str, entity_type: Option<&str>) -> Option<GraphEntity> {
        self.entities
            .iter()
            .find(|e| e.name == name && entity_type.map(|t| t == e.entity_type).unwrap_or(true))
            .map(|e| e.clone())
    }

    fn find_by_id_or_name(&self, key: &str) -> Option<GraphEntity> {
        if let Ok(id) = key.parse::<i64>() {
            if let Some(e) = self.entities.get(&id) {
                return Some(e.clone());
            }
        }
        self.find_by_name(key, None)
    }

    /// One BFS step out of `from_id`, honoring direction and an optional
    /// relationship-type filter.
    fn adjacent(&self, from_id: i64, direction: Direction, relationship_type: Option<&str>) -> Vec<(GraphRelationship, i64)> {
        let mut out = Vec::new();
        for rel in self.relationships.iter() {
            if let Some(rt) = relationship_type {
                if rel.relationship_type != rt {
                    continue;
                }
            }
            let forward = rel.source_id == from_id;
            let backward = rel.target_id == from_id;
            let matches = match direction {
                Direction::Outgoing => forward,
                Direction::Incoming => backward,
                Direction::Either => forward || backward,
            };
            if !matches {
                continue;
            }
            let other = if forward { rel.target_id } else { rel.source_id };
            out.push((rel.clone(), other));
        }
        out
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn get_entity(&self, id: i64) -> Result<Option<GraphEntity>, StoreError> {
        Ok(self.entities.get(&id).map(|e| e.clone()))
    }

    async fn get_entity_by_name(&self, name: &str, entity_type: Option<&str>) -> Result<Option<GraphEntity>, StoreError> {
        Ok(self.find_by_name(name, entity_type))
    }

    async fn search_entities(&self, term: &str, entity_type: Option<&str>, limit: usize) -> Result<Vec<GraphEntity>, StoreError> {
        let term_lower = term.to_lowercase();
        let mut out: Vec<GraphEntity> = self
            .entities
            .iter()
            .filter(|e| e.name.to_lowercase().contains(&term_lower))
            .filter(|e| entity_type.map(|t| t == e.entity_type).unwrap_or(true))
            .map(|e| e.clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out.truncate(limit);
        Ok(out)
    }

    async fn neighbors(
        &self,
        entity_name: &str,
        hops: u32,
        direction: Direction,
        relationship_type: Option<&str>,
        property_filter: Option<(&str, &Value)>,
    ) -> Result<Vec<Neighbor>, StoreError> {
        let origin = self
            .find_by_name(entity_name, None)
            .ok_or_else(|| StoreError::NotFound(entity_name.to_string()))?;

        let mut visited = BTreeMap::new();
        visited.insert(origin.id, 0u32);
        let mut queue = VecDeque::new();
        queue.push_back((origin.id, 0u32));
        let mut out = Vec::new();

        while let Some((current, dist)) = queue.pop_front() {
            if dist >= hops {
                continue;
            }
            for (rel, other_id) in self.adjacent(current, direction, relationship_type) {
                if visited.contains_key(&other_id) {
                    continue;
                }
                let next_dist = dist + 1;
                visited.insert(other_id, next_dist);
                let Some(entity) = self.entities.get(&other_id).map(|e| e.clone()) else { continue };
                if let Some((key, expected)) = property_filter {
                    if entity.property(key) != Some(expected) {
                        queue.push_back((other_id, next_dist));
                        continue;
                    }
                }
                out.push(Neighbor { entity: entity.clone(), relationship: rel, distance: next_dist });
                queue.push_back((other_id, next_dist));
            }
        }
        Ok(out)
    }

    async fn shortest_path(&self, from_name: &str, to_name: &str, max_depth: u32) -> Result<Option<Vec<GraphEntity>>, StoreError> {
        let from = self
            .find_by_name(from_name, None)
            .ok_or_else(|| StoreError::NotFound(from_name.to_string()))?;
        let to = self
            .find_by_name(to_name, None)
            .ok_or_else(|| StoreError::NotFound(to_name.to_string()))?;

        if from.id == to.id {
            return Ok(Some(vec![from]));
        }

        let mut visited = BTreeMap::new();
        visited.insert(from.id, None::<i64>);
        let mut queue = VecDeque::new();
        queue.push_back((from.id, 0u32));

        while let Some((current, dist)) = queue.pop_front() {
            if dist >= max_depth {
                continue;
            }
            for (_, other_id) in self.adjacent(current, Direction::Either, None) {
                if visited.contains_key(&other_id) {
                    continue;
                }
                visited.insert(other_id, Some(current));
                if other_id == to.id {
                    let mut path_ids = vec![other_id];
                    let mut cur = current;
                    path_ids.push(cur);
                    while let Some(Some(prev)) = visited.get(&cur) {
                        cur = *prev;
                        path_ids.push(cur);
                    }
                    path_ids.reverse();
                    let entities: Vec<GraphEntity> = path_ids
                        .into_iter()
                        .filter_map(|id| self.entities.get(&id).map(|e| e.clone()))
                        .collect();
                    return Ok(Some(entities));
                }
                queue.push_back((other_id, dist + 1));
            }
        }
        Ok(None)
    }

    async fn update_entity_properties(&self, id: i64, merge_patch: BTreeMap<String, Value>) -> Result<GraphEntity, StoreError> {
        let mut entry = self.entities.get_mut(&id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        for (k, v) in merge_patch {
            entry.properties.insert(k, v);
        }
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn run_in_transaction(&self, mutations: Vec<(i64, BTreeMap<String, Value>)>) -> Result<Vec<GraphEntity>, StoreError> {
        let mut updated = Vec::with_capacity(mutations.len());
        for (id, patch) in mutations {
            updated.push(self.update_entity_properties(id, patch).await?);
        }
        Ok(updated)
    }

    async fn query_for_clause(&self, for_clause: &ForClause, bindings: &Bindings) -> Result<Vec<GraphEntity>, StoreError> {
        let evaluator = Evaluator::new();
        let store = self.as_dyn_store();
        let mut out = Vec::new();
        for entry in self.entities.iter() {
            if entry.entity_type != for_clause.entity_type {
                continue;
            }
            let entity = entry.clone();
            let Some(condition) = &for_clause.condition else {
                out.push(entity);
                continue;
            };
            let mut loop_bindings = bindings.clone();
            loop_bindings.insert(for_clause.variable.clone(), BoundVar { entity_type: entity.entity_type.clone(), entity_id: entity.id });
            let mut variables = BTreeMap::new();
            variables.insert(for_clause.variable.clone(), entity_to_value(&entity));
            let ctx = EvalContext::for_entity(entity_to_value(&entity), loop_bindings)
                .with_variables(variables)
                .with_store(store.clone());
            if evaluator
                .evaluate_bool(condition, &ctx)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?
            {
                out.push(entity);
            }
        }
        Ok(out)
    }

    /// Mirrors `SqlTranslator::translate_pattern_inner`: every variable in
    /// the pattern — root and each edge's `target_var` — must already be
    /// bound. A pattern never introduces a new binding; it only verifies
    /// that a relationship of the right type connects two already-known
    /// entities (e.g. "does `po` have an edge to `this`").
    async fn exists_pattern(&self, pattern: &Pattern, bindings: &Bindings) -> Result<bool, StoreError> {
        let Some(root) = bindings.get(&pattern.root_var) else {
            return Ok(false);
        };
        let mut current_id = root.entity_id;
        for edge in &pattern.edges {
            let Some(target) = bindings.get(&edge.target_var) else {
                return Ok(false);
            };
            let connected = self.adjacent_for_pattern(current_id, edge).into_iter().any(|(_, other_id)| other_id == target.entity_id);
            if !connected {
                return Ok(false);
            }
            current_id = target.entity_id;
        }

        let Some(condition) = &pattern.condition else {
            return Ok(true);
        };

        let evaluator = Evaluator::new();
        let store = self.as_dyn_store();
        let mut variables = BTreeMap::new();
        for (name, bound) in bindings {
            if name == "this" || name == "e" {
                continue;
            }
            if let Some(e) = self.entities.get(&bound.entity_id) {
                variables.insert(name.clone(), entity_to_value(&e));
            }
        }
        let ctx = EvalContext::for_entity(Value::Null, bindings.clone()).with_variables(variables).with_store(store.clone());
        evaluator.evaluate_bool(condition, &ctx).await.map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn execute_parameterized_sql(&self, _sql: &str, _params: &[Value]) -> Result<Vec<Row>, StoreError> {
        Err(StoreError::Backend("in-memory store has no SQL engine".to_string()))
    }
}

impl InMemoryGraphStore {
    fn adjacent_for_pattern(&self, from_id: i64, edge: &PatternEdge) -> Vec<(GraphRelationship, i64)> {
        let direction = match edge.direction {
            gre_ast::EdgeDirection::Forward => Direction::Outgoing,
            gre_ast::EdgeDirection::Backward => Direction::Incoming,
            gre_ast::EdgeDirection::Either => Direction::Either,
        };
        self.adjacent(from_id, direction, Some(&edge.relationship_type))
    }
}

impl std::fmt::Debug for InMemoryGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryGraphStore")
            .field("entities", &self.entities.len())
            .field("relationships", &self.relationships.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn entity(name: &str, entity_type: &str, props: Vec<(&str, Value)>) -> GraphEntity {
        let mut properties = BTreeMap::new();
        for (k, v) in props {
            properties.insert(k.to_string(), v);
        }
        GraphEntity {
            id: 0,
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            is_instance: true,
            properties,
            uri: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn update_entity_properties_merges_and_errors_on_missing() {
        let store = InMemoryGraphStore::new();
        let id = store.insert_entity(entity("Acme", "Supplier", vec![("status", Value::String("Active".into()))]));

        let mut patch = BTreeMap::new();
        patch.insert("status".to_string(), Value::String("Blacklisted".into()));
        let updated = store.update_entity_properties(id, patch).await.unwrap();
        assert_eq!(updated.property("status"), Some(&Value::String("Blacklisted".into())));

        let err = store.update_entity_properties(999, BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn run_in_transaction_applies_every_mutation() {
        let store = InMemoryGraphStore::new();
        let acme = store.insert_entity(entity("Acme", "Supplier", vec![("status", Value::String("Active".into()))]));
        let globex = store.insert_entity(entity("Globex", "Supplier", vec![("status", Value::String("Active".into()))]));

        let mut acme_patch = BTreeMap::new();
        acme_patch.insert("status".to_string(), Value::String("Expired".into()));
        let mut globex_patch = BTreeMap::new();
        globex_patch.insert("status".to_string(), Value::String("Blacklisted".into()));

        let updated = store.run_in_transaction(vec![(acme, acme_patch), (globex, globex_patch)]).await.unwrap();
        assert_eq!(updated.len(), 2);

        let acme_after = store.get_entity(acme).await.unwrap().unwrap();
        let globex_after = store.get_entity(globex).await.unwrap().unwrap();
        assert_eq!(acme_after.property("status"), Some(&Value::String("Expired".into())));
        assert_eq!(globex_after.property("status"), Some(&Value::String("Blacklisted".into())));
    }

    #[tokio::test]
    async fn query_for_clause_filters_by_condition() {
        let store = InMemoryGraphStore::new();
        store.insert_entity(entity("Acme", "Supplier", vec![("status", Value::String("Active".into()))]));
        store.insert_entity(entity("Globex", "Supplier", vec![("status", Value::String("Blacklisted".into()))]));

        let for_clause = ForClause {
            variable: "s".to_string(),
            entity_type: "Supplier".to_string(),
            condition: Some(gre_ast::Expr::Compare {
                op: gre_ast::CompareOp::Eq,
                left: Box::new(gre_ast::Expr::path(&["s", "status"])),
                right: Box::new(gre_ast::Expr::Literal(Value::String("Blacklisted".into()))),
            }),
            statements: vec![],
        };
        let matched = store.query_for_clause(&for_clause, &Bindings::new()).await.unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "Globex");
    }

    #[tokio::test]
    async fn exists_pattern_follows_relationship_chain() {
        let store = InMemoryGraphStore::new();
        let po_id = store.insert_entity(entity("PO-1", "PurchaseOrder", vec![]));
        let supplier_id = store.insert_entity(entity("Globex", "Supplier", vec![("status", Value::String("Blacklisted".into()))]));
        store.insert_relationship(GraphRelationship {
            id: 0,
            source_id: po_id,
            target_id: supplier_id,
            relationship_type: "orderedFrom".to_string(),
            properties: BTreeMap::new(),
            created_at: Utc::now(),
        });

        let mut bindings = Bindings::new();
        bindings.insert("po".to_string(), BoundVar { entity_type: "PurchaseOrder".to_string(), entity_id: po_id });

        let pattern = Pattern {
            root_var: "po".to_string(),
            edges: vec![PatternEdge { relationship_type: "orderedFrom".to_string(), direction: gre_ast::EdgeDirection::Forward, target_var: "s".to_string() }],
            condition: Some(Box::new(gre_ast::Expr::Compare {
                op: gre_ast::CompareOp::Eq,
                left: Box::new(gre_ast::Expr::path(&["s", "status"])),
                right: Box::new(gre_ast::Expr::Literal(Value::String("Blacklisted".into()))),
            })),
        };
        assert!(store.exists_pattern(&pattern, &bindings).await.unwrap());
    }
}
