//! Diesel schema (hand-written, mirroring `diesel print-schema`). Tables
//! per §6.2:
//! - `graph_entities` / `graph_relationships`: the property graph itself.
//! - `schema_classes` / `schema_relationships`: the admissible-type layer
//!   loaders validate against.
//! - `action_definitions`: uploaded action DSL bodies, keyed by
//!   `(entity_type, action_name)`.
//! - `rules`: uploaded rule DSL text, one row per rule name (§4.10).

diesel::table! {
    graph_entities (id) {
        id -> BigInt,
        name -> Text,
        entity_type -> Text,
        is_instance -> Bool,
        properties -> Jsonb,
        uri -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    graph_relationships (id) {
        id -> BigInt,
        source_id -> BigInt,
        target_id -> BigInt,
        relationship_type -> Text,
        properties -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    schema_classes (id) {
        id -> BigInt,
        name -> Text,
        label -> Text,
        data_properties -> Jsonb,
    }
}

diesel::table! {
    schema_relationships (id) {
        id -> BigInt,
        source_class_id -> BigInt,
        target_class_id -> BigInt,
        relationship_type -> Text,
    }
}

diesel::table! {
    action_definitions (entity_type, action_name) {
        entity_type -> Text,
        action_name -> Text,
        dsl_text -> Text,
        definition_hash -> Text,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    rules (name) {
        name -> Text,
        dsl_text -> Text,
        definition_hash -> Text,
        enabled -> Bool,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(graph_entities, graph_relationships, schema_classes, schema_relationships, action_definitions, rules,);
