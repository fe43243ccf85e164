//! Persistent graph data model (§3): entities, relationships, and the schema
//! layer that external loaders use to validate admissible types. The rule
//! engine itself only reads `SchemaClass`/`SchemaRelationship` to resolve
//! type checks; it never writes them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphEntity {
    pub id: i64,
    pub name: String,
    pub entity_type: String,
    pub is_instance: bool,
    pub properties: BTreeMap<String, Value>,
    pub uri: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GraphEntity {
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphRelationship {
    pub id: i64,
    pub source_id: i64,
    pub target_id: i64,
    pub relationship_type: String,
    pub properties: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    String,
    Int,
    Float,
    Boolean,
    Date,
    Datetime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaClass {
    pub id: i64,
    pub name: String,
    pub label: String,
    pub data_properties: BTreeMap<String, PropertyType>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaRelationship {
    pub id: i64,
    pub source_class_id: i64,
    pub target_class_id: i64,
    pub relationship_type: String,
}

/// One hop of a `neighbors` traversal result: the reached entity, the edge
/// that reached it, and its distance from the origin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Neighbor {
    pub entity: GraphEntity,
    pub relationship: GraphRelationship,
    pub distance: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
    Either,
}
