//! Recursive-CTE SQL text builders for multi-hop neighbor and shortest-path
//! queries (§4.2, §4.5 "Neighbor and path queries"). These are plain text +
//! bind-order builders, not trait methods — a backend with a SQL engine
//! behind it (`gre-persistence::pg::PgGraphStore`) runs them through
//! `GraphStore::execute_parameterized_sql`; the in-memory store answers the
//! same queries with a plain BFS instead, since it has no SQL engine to
//! delegate to. Grounded in `pg_graph_storage.py`'s hand-written recursive
//! CTEs (`_get_multi_hop_neighbors`, `find_path_between_instances`).

use gre_ast::{Direction, Value};

/// Walks up to `hops` edges out from the instance named by bind `$1`, bind
/// `$2` is the hop limit. Returns one row per entity reached with columns
/// `id, name, entity_type, properties, rel_type, depth`; `rel_type` is the
/// relationship type of the edge that most recently reached that row (the
/// same "last hop only" approximation the original makes).
pub fn neighbors_sql(direction: Direction) -> (String, Vec<Value>) {
    let direction_clause = match direction {
        Direction::Outgoing => "r.source_id = ns.id",
        Direction::Incoming => "r.target_id = ns.id",
        Direction::Either => "(r.source_id = ns.id OR r.target_id = ns.id)",
    };
    let sql = format!(
        "WITH RECURSIVE neighbor_search AS (\
            SELECT e.id, e.name, e.entity_type, e.properties, 1 AS depth, ARRAY[e.id] AS path_ids, NULL::text AS rel_type \
            FROM graph_entities e WHERE e.name = $1 AND e.is_instance = true \
            UNION ALL \
            SELECT CASE WHEN r.source_id = ns.id THEN r.target_id ELSE r.source_id END, \
                   CASE WHEN r.source_id = ns.id THEN t.name ELSE s.name END, \
                   CASE WHEN r.source_id = ns.id THEN t.entity_type ELSE s.entity_type END, \
                   CASE WHEN r.source_id = ns.id THEN t.properties ELSE s.properties END, \
                   ns.depth + 1, \
                   ns.path_ids || (CASE WHEN r.source_id = ns.id THEN r.target_id ELSE r.source_id END), \
                   r.relationship_type \
            FROM neighbor_search ns \
            JOIN graph_relationships r ON {direction_clause} \
            JOIN graph_entities s ON r.source_id = s.id \
            JOIN graph_entities t ON r.target_id = t.id \
            WHERE ns.depth < $2 \
              AND NOT (CASE WHEN r.source_id = ns.id THEN r.target_id ELSE r.source_id END = ANY(ns.path_ids)) \
        ) \
        SELECT DISTINCT id, name, entity_type, properties, rel_type, depth \
        FROM neighbor_search WHERE depth > 1 ORDER BY depth LIMIT 200"
    );
    (sql, Vec::new())
}

/// Bind order: `$1` start entity id, `$2` end entity id, `$3` max depth.
/// Returns at most one row: a JSON array of entity ids along the shortest
/// path, in order, or no rows if unreachable within `max_depth`.
pub fn shortest_path_sql() -> (String, Vec<Value>) {
    let sql = "WITH RECURSIVE shortest_path AS (\
            SELECT s.id AS current_id, ARRAY[s.id] AS path_ids, 0 AS depth \
            FROM graph_entities s WHERE s.id = $1 \
            UNION ALL \
            SELECT CASE WHEN r.source_id = sp.current_id THEN r.target_id ELSE r.source_id END, \
                   sp.path_ids || (CASE WHEN r.source_id = sp.current_id THEN r.target_id ELSE r.source_id END), \
                   sp.depth + 1 \
            FROM shortest_path sp \
            JOIN graph_relationships r ON (r.source_id = sp.current_id OR r.target_id = sp.current_id) \
            WHERE sp.depth < $3 \
              AND NOT (CASE WHEN r.source_id = sp.current_id THEN r.target_id ELSE r.source_id END = ANY(sp.path_ids)) \
        ) \
        SELECT path_ids FROM shortest_path WHERE current_id = $2 ORDER BY depth ASC LIMIT 1"
        .to_string();
    (sql, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbors_sql_binds_direction_into_the_join_not_as_a_parameter() {
        let (sql, _) = neighbors_sql(Direction::Outgoing);
        assert!(sql.contains("r.source_id = ns.id"));
        assert!(sql.contains("$1"));
        assert!(sql.contains("$2"));
    }

    #[test]
    fn shortest_path_sql_selects_a_single_path_ids_row() {
        let (sql, _) = shortest_path_sql();
        assert!(sql.contains("path_ids"));
        assert!(sql.to_uppercase().contains("LIMIT 1"));
    }
}
