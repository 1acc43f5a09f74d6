//! The relational system of record, as far as routing needs it.
//!
//! The schema (`loads`, `routes`, PostGIS geography columns) is owned by the
//! TMS API and only read or appended to here.

use async_trait::async_trait;
use loadmatch_common::{GeoPoint, LoadmatchError};
use sqlx::PgPool;

/// A load row with its coordinates extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRecord {
    pub id: String,
    pub pickup: GeoPoint,
    pub delivery: GeoPoint,
    pub weight: Option<f64>,
    pub status: Option<String>,
}

/// A route to insert with status PLANNED.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRoute {
    pub load_id: String,
    pub driver_id: Option<String>,
    pub vehicle_id: String,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    /// WKT `LINESTRING`.
    pub geometry: String,
    pub distance_miles: f64,
    pub duration_minutes: i64,
    pub optimization_score: f64,
}

#[async_trait]
pub trait LoadRepository: Send + Sync {
    async fn get_load(&self, load_id: &str) -> Result<Option<LoadRecord>, LoadmatchError>;

    /// Returns the new route's id.
    async fn save_route(&self, route: &NewRoute) -> Result<String, LoadmatchError>;
}

pub struct PgLoadRepository {
    pool: PgPool,
}

impl PgLoadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, LoadmatchError> {
        let pool = PgPool::connect(database_url).await.map_err(store)?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl LoadRepository for PgLoadRepository {
    async fn get_load(&self, load_id: &str) -> Result<Option<LoadRecord>, LoadmatchError> {
        let row = sqlx::query_as::<_, (String, f64, f64, f64, f64, Option<f64>, Option<String>)>(
            r#"
            SELECT id::text,
                   ST_Y(pickup_location::geometry),
                   ST_X(pickup_location::geometry),
                   ST_Y(delivery_location::geometry),
                   ST_X(delivery_location::geometry),
                   weight::float8,
                   status::text
            FROM loads
            WHERE id::text = $1
              AND pickup_location IS NOT NULL
              AND delivery_location IS NOT NULL
            "#,
        )
        .bind(load_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store)?;

        Ok(row.map(
            |(id, pickup_lat, pickup_lng, delivery_lat, delivery_lng, weight, status)| LoadRecord {
                id,
                pickup: GeoPoint::new(pickup_lat, pickup_lng),
                delivery: GeoPoint::new(delivery_lat, delivery_lng),
                weight,
                status,
            },
        ))
    }

    async fn save_route(&self, route: &NewRoute) -> Result<String, LoadmatchError> {
        let (id,) = sqlx::query_as::<_, (String,)>(
            r#"
            INSERT INTO routes (
                load_id, driver_id, vehicle_id, origin_location, destination_location,
                route_geometry, planned_distance_miles, planned_duration_minutes,
                optimization_score, status
            ) VALUES (
                $1::uuid, $2::uuid, $3::uuid,
                ST_SetSRID(ST_MakePoint($4, $5), 4326)::geography,
                ST_SetSRID(ST_MakePoint($6, $7), 4326)::geography,
                ST_GeogFromText($8),
                $9, $10, $11, 'PLANNED'
            )
            RETURNING id::text
            "#,
        )
        .bind(&route.load_id)
        .bind(&route.driver_id)
        .bind(&route.vehicle_id)
        .bind(route.origin.lng)
        .bind(route.origin.lat)
        .bind(route.destination.lng)
        .bind(route.destination.lat)
        .bind(&route.geometry)
        .bind(route.distance_miles)
        .bind(route.duration_minutes)
        .bind(route.optimization_score)
        .fetch_one(&self.pool)
        .await
        .map_err(store)?;

        Ok(id)
    }
}

fn store(err: sqlx::Error) -> LoadmatchError {
    LoadmatchError::Transport(format!("relational store: {err}"))
}
