//! `GraphStore` over Neo4j.
//!
//! Labels and relationship types come from closed enums and are spliced into
//! the Cypher text. Ids and property values always travel as parameters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loadmatch_common::{
    status, CandidateTuple, GeoPoint, DEFAULT_CARRIER_PERFORMANCE, DEFAULT_DRIVER_RATING,
    METERS_PER_MILE,
};
use neo4rs::{query, Query, Row};
use tracing::warn;

use crate::error::GraphError;
use crate::mutation::{GraphMutation, PropValue, Props};
use crate::store::{CandidateQuery, GraphStore, LoadNode, CANDIDATE_LIMIT};
use crate::GraphClient;

pub struct Neo4jGraph {
    client: GraphClient,
}

impl Neo4jGraph {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GraphStore for Neo4jGraph {
    async fn apply(&self, mutation: &GraphMutation) -> Result<(), GraphError> {
        self.client.graph.run(to_query(mutation)).await?;
        Ok(())
    }

    async fn load(&self, load_id: &str) -> Result<Option<LoadNode>, GraphError> {
        let q = query(
            "MATCH (l:Load {id: $id})
             RETURN l.id AS id, l.status AS status,
                    l.pickup_lat AS pickup_lat, l.pickup_lng AS pickup_lng,
                    l.delivery_lat AS delivery_lat, l.delivery_lng AS delivery_lng,
                    l.weight AS weight, l.volume AS volume",
        )
        .param("id", load_id);

        let mut stream = self.client.graph.execute(q).await?;
        let Some(row) = stream.next().await? else {
            return Ok(None);
        };

        Ok(Some(LoadNode {
            id: row.get("id").unwrap_or_else(|_| load_id.to_string()),
            status: row.get("status").ok(),
            pickup: point(&row, "pickup_lat", "pickup_lng"),
            delivery: point(&row, "delivery_lat", "delivery_lng"),
            weight: number(&row, "weight"),
            volume: number(&row, "volume"),
        }))
    }

    async fn find_candidates(&self, q: &CandidateQuery) -> Result<Vec<CandidateTuple>, GraphError> {
        let cypher = format!(
            "MATCH (d:Driver)-[:DRIVES]->(v:Vehicle)-[:OWNED_BY]->(c:Carrier)
             WHERE d.status = $available AND v.status = $available
               AND d.latitude IS NOT NULL AND d.longitude IS NOT NULL
             WITH d, v, c,
                  point.distance(
                      point({{latitude: d.latitude, longitude: d.longitude}}),
                      point({{latitude: $lat, longitude: $lng}})
                  ) / {METERS_PER_MILE} AS distance_miles
             WHERE distance_miles <= $max_distance
               AND COALESCE(v.capacity_weight, 0.0) >= $weight
               AND COALESCE(v.capacity_volume, 0.0) >= $volume
             RETURN d.id AS driver_id, v.id AS vehicle_id, c.id AS carrier_id,
                    distance_miles,
                    COALESCE(v.capacity_weight, 0.0) AS capacity_weight,
                    COALESCE(v.capacity_volume, 0.0) AS capacity_volume,
                    d.hours_remaining AS hours_remaining,
                    COALESCE(d.rating, {DEFAULT_DRIVER_RATING:.1}) AS driver_rating,
                    COALESCE(c.on_time_percentage, {DEFAULT_CARRIER_PERFORMANCE:.1}) AS carrier_performance
             ORDER BY distance_miles ASC
             LIMIT {CANDIDATE_LIMIT}"
        );

        let cq = query(&cypher)
            .param("available", status::AVAILABLE)
            .param("lat", q.pickup.lat)
            .param("lng", q.pickup.lng)
            .param("max_distance", q.max_distance_miles)
            .param("weight", q.weight_required)
            .param("volume", q.volume_required);

        let mut out = Vec::new();
        let mut stream = self.client.graph.execute(cq).await?;
        while let Some(row) = stream.next().await? {
            match row_to_candidate(&row) {
                Ok(c) => out.push(c),
                Err(e) => warn!(error = %e, "Skipping malformed candidate row"),
            }
        }
        Ok(out)
    }
}

fn row_to_candidate(row: &Row) -> Result<CandidateTuple, GraphError> {
    let id = |key: &str| -> Result<String, GraphError> {
        row.get::<String>(key)
            .map_err(|_| GraphError::Decode(format!("candidate row missing {key}")))
    };

    Ok(CandidateTuple {
        driver_id: id("driver_id")?,
        vehicle_id: id("vehicle_id")?,
        carrier_id: id("carrier_id")?,
        distance_miles: number(row, "distance_miles")
            .ok_or_else(|| GraphError::Decode("candidate row missing distance_miles".into()))?,
        capacity_weight: number(row, "capacity_weight").unwrap_or(0.0),
        capacity_volume: number(row, "capacity_volume").unwrap_or(0.0),
        hours_remaining: number(row, "hours_remaining"),
        driver_rating: number(row, "driver_rating").unwrap_or(DEFAULT_DRIVER_RATING),
        carrier_performance: number(row, "carrier_performance")
            .unwrap_or(DEFAULT_CARRIER_PERFORMANCE),
    })
}

/// Numeric column that may have been written as an integer.
fn number(row: &Row, key: &str) -> Option<f64> {
    row.get::<f64>(key)
        .ok()
        .or_else(|| row.get::<i64>(key).ok().map(|i| i as f64))
}

fn point(row: &Row, lat: &str, lng: &str) -> Option<GeoPoint> {
    Some(GeoPoint::new(number(row, lat)?, number(row, lng)?))
}

// ---------------------------------------------------------------------------
// Mutation -> Cypher
// ---------------------------------------------------------------------------

pub(crate) fn to_query(mutation: &GraphMutation) -> Query {
    match mutation {
        GraphMutation::MergeNode { label, id, props } => {
            let cypher = format!("MERGE (n:{} {{id: $id}}){}", label.as_str(), set_clause("n", props));
            bind_props(query(&cypher).param("id", id.as_str()), props)
        }
        GraphMutation::SetProps { label, id, props } => {
            let cypher = format!("MATCH (n:{} {{id: $id}}){}", label.as_str(), set_clause("n", props));
            bind_props(query(&cypher).param("id", id.as_str()), props)
        }
        GraphMutation::MergeEdge { rel, from, to, props } => {
            let (a, b) = rel.endpoints();
            let cypher = format!(
                "MATCH (a:{} {{id: $from}}) MATCH (b:{} {{id: $to}}) MERGE (a)-[r:{}]->(b){}",
                a.as_str(),
                b.as_str(),
                rel.as_str(),
                set_clause("r", props)
            );
            bind_props(
                query(&cypher)
                    .param("from", from.as_str())
                    .param("to", to.as_str()),
                props,
            )
        }
        GraphMutation::RemoveEdgesTo { rel, to } => {
            let (a, b) = rel.endpoints();
            let cypher = format!(
                "MATCH (:{})-[r:{}]->(:{} {{id: $to}}) DELETE r",
                a.as_str(),
                rel.as_str(),
                b.as_str()
            );
            query(&cypher).param("to", to.as_str())
        }
    }
}

fn set_clause(var: &str, props: &Props) -> String {
    if props.is_empty() {
        return String::new();
    }
    let assignments: Vec<String> = props
        .iter()
        .map(|(key, value)| match value {
            PropValue::Timestamp(_) => format!("{var}.{key} = datetime($p_{key})"),
            _ => format!("{var}.{key} = $p_{key}"),
        })
        .collect();
    format!(" SET {}", assignments.join(", "))
}

fn bind_props(mut q: Query, props: &Props) -> Query {
    for (key, value) in props {
        let name = format!("p_{key}");
        q = match value {
            PropValue::Str(s) => q.param(&name, s.as_str()),
            PropValue::Float(f) => q.param(&name, *f),
            PropValue::Int(i) => q.param(&name, *i),
            PropValue::Bool(b) => q.param(&name, *b),
            PropValue::Timestamp(ts) => q.param(&name, format_dt(ts)),
        };
    }
    q
}

fn format_dt(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{NodeLabel, RelType};

    #[test]
    fn set_clause_wraps_timestamps_in_datetime() {
        let props: Props = vec![
            ("status", PropValue::from("AVAILABLE")),
            ("updated_at", PropValue::from(Utc::now())),
        ];
        assert_eq!(
            set_clause("n", &props),
            " SET n.status = $p_status, n.updated_at = datetime($p_updated_at)"
        );
    }

    #[test]
    fn bare_merge_has_no_set() {
        assert_eq!(set_clause("n", &Vec::new()), "");
    }

    #[test]
    fn edge_display_names_both_endpoint_labels() {
        let m = GraphMutation::merge_edge(RelType::OWNED_BY, "V1", "C1", Vec::new());
        assert_eq!(m.to_string(), "merge Vehicle(V1)-[OWNED_BY]->Carrier(C1)");
        let m = GraphMutation::RemoveEdgesTo { rel: RelType::TRANSPORTS, to: "L1".into() };
        assert_eq!(m.to_string(), "remove [TRANSPORTS]->Load(L1)");
        assert_eq!(
            GraphMutation::ensure_node(NodeLabel::Route, "R1").to_string(),
            "merge Route(R1)"
        );
    }
}
