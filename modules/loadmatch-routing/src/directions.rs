//! Google Directions API client.

use async_trait::async_trait;
use loadmatch_common::{round2, GeoPoint};
use serde::Deserialize;
use tracing::debug;

use crate::error::DirectionsError;
use crate::geometry::{traffic_score, DirectionsService, RouteGeometry, RouteStep};
use crate::polyline;

const BASE_URL: &str = "https://maps.googleapis.com/maps/api/directions/json";
const MILES_PER_METER: f64 = 0.000621371;

pub struct GoogleDirections {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleDirections {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl DirectionsService for GoogleDirections {
    async fn directions(&self, origin: GeoPoint, destination: GeoPoint) -> Result<RouteGeometry, DirectionsError> {
        if self.api_key.is_empty() {
            return Err(DirectionsError::MissingCredential);
        }

        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("origin", format!("{},{}", origin.lat, origin.lng)),
                ("destination", format!("{},{}", destination.lat, destination.lng)),
                ("mode", "driving".to_string()),
                ("departure_time", "now".to_string()),
                ("traffic_model", "best_guess".to_string()),
                ("alternatives", "false".to_string()),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DirectionsError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: DirectionsResponse = resp.json().await?;
        let route = route_from_response(body)?;
        debug!(
            distance_miles = route.distance_miles,
            duration_minutes = route.duration_minutes,
            steps = route.steps.len(),
            "Directions route computed"
        );
        Ok(route)
    }
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
pub struct DirectionsResponse {
    pub status: String,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
pub struct Route {
    pub legs: Vec<Leg>,
    pub overview_polyline: Polyline,
}

#[derive(Debug, Deserialize)]
pub struct Polyline {
    pub points: String,
}

#[derive(Debug, Deserialize)]
pub struct Leg {
    pub distance: TextValue,
    pub duration: TextValue,
    #[serde(default)]
    pub duration_in_traffic: Option<TextValue>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub html_instructions: String,
    pub distance: TextValue,
    pub duration: TextValue,
    #[serde(default)]
    pub maneuver: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TextValue {
    pub text: String,
    pub value: f64,
}

/// Turn a Directions response into a route, using the first leg of the first route.
pub fn route_from_response(body: DirectionsResponse) -> Result<RouteGeometry, DirectionsError> {
    match body.status.as_str() {
        "OK" => {}
        "ZERO_RESULTS" | "NOT_FOUND" => return Err(DirectionsError::NoRoute),
        other => {
            return Err(DirectionsError::Api {
                status: 200,
                message: match body.error_message {
                    Some(msg) => format!("{other}: {msg}"),
                    None => other.to_string(),
                },
            })
        }
    }

    let route = body.routes.into_iter().next().ok_or(DirectionsError::NoRoute)?;
    let leg = route.legs.into_iter().next().ok_or(DirectionsError::NoRoute)?;

    let points = polyline::decode(&route.overview_polyline.points)?;
    if points.len() < 2 {
        return Err(DirectionsError::Parse(format!(
            "overview polyline has {} point(s), a route needs at least 2",
            points.len()
        )));
    }
    let traffic_secs = leg
        .duration_in_traffic
        .as_ref()
        .map_or(leg.duration.value, |d| d.value);

    Ok(RouteGeometry {
        distance_miles: round2(leg.distance.value * MILES_PER_METER),
        duration_minutes: (leg.duration.value / 60.0).round() as i64,
        duration_in_traffic_minutes: (traffic_secs / 60.0).round() as i64,
        route_geometry: polyline::linestring(&points),
        encoded_polyline: Some(route.overview_polyline.points),
        optimization_score: traffic_score(leg.duration.value, traffic_secs),
        steps: leg.steps.into_iter().map(step).collect(),
        traffic_considered: true,
    })
}

fn step(s: Step) -> RouteStep {
    RouteStep {
        instruction: s.html_instructions.replace("<b>", "").replace("</b>", ""),
        distance: s.distance.text,
        duration: s.duration.text,
        maneuver: s.maneuver.unwrap_or_else(|| "straight".to_string()),
    }
}
