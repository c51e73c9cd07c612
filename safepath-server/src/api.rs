//! HTTP routes over a shared [`SafetyEngine`]

use std::{sync::Arc, time::Duration};

use axum::{
    BoxError, Json, Router,
    error_handling::HandleErrorLayer,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime};
use geo::Point;
use safepath_core::{
    Error, IncidentRecord, NodeId, RiskSnapshot, Route, RouteExplanation, SafetyEngine,
    TemporalContext, TravelMode, engine::RefreshSummary, explain, find_routes, query::NearbyIncident,
    query::edges_near,
    shuttle::{LineStatus, NearbyStop, TripShuttle},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::{ServiceBuilder, limit::ConcurrencyLimitLayer, timeout::TimeoutLayer};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    config::ServerSection,
    error::{ApiError, ApiJson},
};

pub struct AppState {
    pub engine: SafetyEngine,
    pub limits: ServerSection,
}

pub fn router(state: Arc<AppState>) -> Router {
    let timeout = Duration::from_secs(state.limits.request_timeout_secs);
    let concurrency = state.limits.concurrency_limit;

    Router::new()
        .route("/health", get(health))
        .route("/routes", post(plan_routes))
        .route("/explain", post(explain_route))
        .route("/incidents", post(publish_incidents))
        .route("/incidents/near", get(incidents_near))
        .route("/shuttles/near", get(shuttles_near))
        .route("/shuttles/trip", post(shuttle_trip))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .layer(TimeoutLayer::new(timeout))
                .layer(ConcurrencyLimitLayer::new(concurrency)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn handle_middleware_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(json!({ "error": "timeout", "message": "request took too long" })),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "internal", "message": err.to_string() })),
        )
    }
}

/// Runs CPU-bound engine work off the async workers
async fn blocking<T, F>(state: Arc<AppState>, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T, Error> + Send + 'static,
{
    tokio::task::spawn_blocking(move || work(state.as_ref()))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

// --- Request types ---

/// Time of travel; `datetime` wins over `hour`, `hour` over `band`, and the
/// current local time is used when none is given
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeRequest {
    pub hour: Option<f64>,
    pub datetime: Option<DateTime<FixedOffset>>,
    pub band: Option<String>,
}

impl TimeRequest {
    fn context(&self, engine: &SafetyEngine) -> Result<TemporalContext, Error> {
        if let Some(datetime) = self.datetime {
            return Ok(TemporalContext::at(datetime));
        }
        if let Some(hour) = self.hour {
            return TemporalContext::at_hour(hour);
        }
        if let Some(band) = &self.band {
            return TemporalContext::for_band(&engine.config().temporal, band);
        }
        Ok(TemporalContext::at(Local::now().fixed_offset()))
    }
}

/// Graph node id or a coordinate snapped to the nearest node
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum Location {
    Node(NodeId),
    Point { lat: f64, lon: f64 },
}

impl Location {
    fn resolve(self, engine: &SafetyEngine) -> Result<NodeId, Error> {
        match self {
            Location::Node(id) => Ok(id),
            Location::Point { lat, lon } => engine
                .nearest_node(Point::new(lon, lat))
                .map(|(id, _)| id)
                .ok_or_else(|| Error::InvalidData("graph has no nodes".to_string())),
        }
    }
}

fn default_mode() -> String {
    TravelMode::Walk.to_string()
}

#[derive(Debug, Deserialize)]
pub struct RoutesRequest {
    pub origin: Location,
    pub destination: Location,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(flatten)]
    pub time: TimeRequest,
    pub k: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    pub nodes: Vec<NodeId>,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(flatten)]
    pub time: TimeRequest,
}

#[derive(Debug, Deserialize)]
pub struct NearQuery {
    lat: f64,
    lon: f64,
    radius: Option<f64>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ShuttleQuery {
    lat: f64,
    lon: f64,
    radius: Option<f64>,
    limit: Option<usize>,
    /// Local time for line status, defaults to now
    at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    fn point(self) -> Result<Point<f64>, ApiError> {
        if self.lat.is_finite() && self.lon.is_finite() {
            Ok(Point::new(self.lon, self.lat))
        } else {
            Err(ApiError::BadRequest("lat and lon must be finite".to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TripRequest {
    pub origin: Coordinates,
    pub destination: Coordinates,
    pub at: Option<NaiveDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub incidents: Vec<IncidentRecord>,
    pub now: Option<NaiveDateTime>,
}

// --- Responses ---

#[derive(Debug, Serialize)]
pub struct ExplainedRoute {
    pub route: Route,
    pub explanation: RouteExplanation,
    pub summary: Vec<String>,
    /// `GeoJSON` feature of the route line
    pub geometry: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct RoutesResponse {
    pub snapshot_version: u64,
    pub origin: NodeId,
    pub destination: NodeId,
    pub routes: Vec<ExplainedRoute>,
}

#[derive(Debug, Serialize)]
pub struct NearResponse {
    pub count: usize,
    pub incidents: Vec<NearbyIncident>,
}

#[derive(Debug, Serialize)]
pub struct ShuttlesNearResponse {
    pub count: usize,
    pub stops: Vec<NearbyStop>,
    pub lines: Vec<LineStatus>,
}

#[derive(Debug, Serialize)]
pub struct TripResponse {
    /// `null` when either end has no stop within walking distance
    pub shuttle: Option<TripShuttle>,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    #[serde(flatten)]
    pub summary: RefreshSummary,
    /// Incidents that could not be attributed to a segment
    pub gaps: usize,
}

// --- Handlers ---

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let graph = state.engine.graph();
    let snapshot = state.engine.snapshot().ok();
    Json(json!({
        "status": "ok",
        "nodes": graph.node_count(),
        "segments": graph.segment_count(),
        "snapshot_version": snapshot.as_ref().map(|s| s.version()),
        "computed_at": snapshot.as_ref().map(|s| s.computed_at()),
    }))
}

fn explained(
    state: &AppState,
    route: Route,
    snapshot: &RiskSnapshot,
) -> Result<ExplainedRoute, Error> {
    let engine = &state.engine;
    let explanation = explain(&route, engine.graph(), snapshot, engine.config())?;
    let geometry = serde_json::to_value(route.to_geojson(engine.graph())?)?;
    Ok(ExplainedRoute {
        summary: explanation.summary(),
        route,
        explanation,
        geometry,
    })
}

async fn plan_routes(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RoutesRequest>,
) -> Result<Json<RoutesResponse>, ApiError> {
    let response = blocking(state, move |state| {
        let engine = &state.engine;
        let mode: TravelMode = request.mode.parse()?;
        let context = request.time.context(engine)?;
        let origin = request.origin.resolve(engine)?;
        let destination = request.destination.resolve(engine)?;

        let snapshot = engine.snapshot()?;
        let routes = find_routes(
            engine.graph(),
            &snapshot,
            origin,
            destination,
            mode,
            &context,
            request.k.unwrap_or(engine.config().routing.default_k),
            engine.config(),
        )?;
        let routes = routes
            .into_iter()
            .map(|route| explained(state, route, &snapshot))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RoutesResponse {
            snapshot_version: snapshot.version(),
            origin,
            destination,
            routes,
        })
    })
    .await?;
    Ok(Json(response))
}

async fn explain_route(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<ExplainRequest>,
) -> Result<Json<ExplainedRoute>, ApiError> {
    let response = blocking(state, move |state| {
        let engine = &state.engine;
        let mode: TravelMode = request.mode.parse()?;
        let context = request.time.context(engine)?;
        let snapshot = engine.snapshot()?;
        let route = Route::from_nodes(
            engine.graph(),
            &snapshot,
            engine.config(),
            &request.nodes,
            mode,
            &context,
        )?;
        explained(state, route, &snapshot)
    })
    .await?;
    Ok(Json(response))
}

fn search_radius(state: &AppState, radius: Option<f64>, default: f64) -> Result<f64, ApiError> {
    let radius = radius.unwrap_or(default);
    if !(radius.is_finite() && radius > 0.0) {
        return Err(ApiError::BadRequest("radius must be positive".to_string()));
    }
    Ok(radius.min(state.limits.max_radius_m))
}

async fn incidents_near(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NearQuery>,
) -> Result<Json<NearResponse>, ApiError> {
    let point = Coordinates {
        lat: params.lat,
        lon: params.lon,
    }
    .point()?;
    let radius = search_radius(&state, params.radius, 200.0)?;
    let limit = params.limit.unwrap_or(50).min(state.limits.max_incidents_returned);

    let snapshot = state.engine.snapshot()?;
    let mut incidents = edges_near(&snapshot, point, radius);
    incidents.truncate(limit);
    Ok(Json(NearResponse {
        count: incidents.len(),
        incidents,
    }))
}

async fn shuttles_near(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ShuttleQuery>,
) -> Result<Json<ShuttlesNearResponse>, ApiError> {
    let point = Coordinates {
        lat: params.lat,
        lon: params.lon,
    }
    .point()?;
    let radius = search_radius(&state, params.radius, 500.0)?;
    let limit = params.limit.unwrap_or(5).min(state.limits.max_incidents_returned);
    let at = params.at.unwrap_or_else(|| Local::now().naive_local());

    let shuttles = state.engine.shuttles();
    let stops = shuttles.stops_near(point, radius, limit);
    Ok(Json(ShuttlesNearResponse {
        count: stops.len(),
        stops,
        lines: shuttles.availability(at),
    }))
}

async fn shuttle_trip(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<TripRequest>,
) -> Result<Json<TripResponse>, ApiError> {
    let origin = request.origin.point()?;
    let destination = request.destination.point()?;
    let at = request.at.unwrap_or_else(|| Local::now().naive_local());
    Ok(Json(TripResponse {
        shuttle: state.engine.shuttles().plan_trip(origin, destination, at),
    }))
}

async fn publish_incidents(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<PublishRequest>,
) -> Result<Json<PublishResponse>, ApiError> {
    let now = request.now.unwrap_or_else(|| Local::now().naive_local());
    let summary = blocking(state, move |state| state.engine.refresh(request.incidents, now)).await?;
    info!(
        version = summary.version,
        attributed = summary.attributed,
        gaps = summary.unattributed,
        "Published incidents"
    );
    Ok(Json(PublishResponse {
        gaps: summary.unattributed,
        summary,
    }))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::Request,
    };
    use safepath_core::{EngineConfig, Node, SafetyGraph, Segment, shuttle::ShuttleData};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    /// A - B - C along the equator plus an isolated node 4
    fn state() -> Arc<AppState> {
        let graph = SafetyGraph::new(
            vec![
                Node::new(1, 0.0, 0.0),
                Node::new(2, 0.0, 0.0018),
                Node::new(3, 0.0, 0.0036),
                Node::new(4, 0.01, 0.01),
            ],
            vec![
                Segment::new(1, 2, 0, 200.0),
                Segment::new(2, 1, 0, 200.0),
                Segment::new(2, 3, 0, 200.0),
                Segment::new(3, 2, 0, 200.0),
            ],
        )
        .unwrap();
        let shuttles: ShuttleData = serde_json::from_value(json!({
            "stops": [
                {"id": 10, "name": "West Gate", "lat": 0.0, "lon": 0.0002},
                {"id": 11, "name": "East Gate", "lat": 0.0, "lon": 0.0036}
            ],
            "lines": [{
                "name": "Campus Loop",
                "frequency_min": 10,
                "eligibility": "Valid campus ID",
                "schedule": {"weekday": {"start": "07:00:00", "end": "22:00:00"}}
            }]
        }))
        .unwrap();
        let engine = SafetyEngine::new(graph, EngineConfig::default())
            .unwrap()
            .with_shuttles(shuttles)
            .unwrap();
        Arc::new(AppState {
            engine,
            limits: ServerSection::default(),
        })
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(Arc::clone(state)).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn publish(state: &Arc<AppState>) {
        let body = json!({
            "now": "2025-06-15T12:00:00",
            "incidents": [
                {"id": 1, "occurred_at": "2025-06-14T23:00:00", "lat": 0.0, "lon": 0.0027,
                 "severity": 0.8, "description": "Robbery"},
                {"id": 2, "occurred_at": "2025-06-14T23:30:00", "lat": 0.5, "lon": 0.5}
            ]
        });
        let (status, value) = send(state, post_json("/incidents", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["version"], 1);
        assert_eq!(value["gaps"], 1);
    }

    #[tokio::test]
    async fn health_reports_missing_snapshot() {
        let state = state();
        let (status, value) = send(&state, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["nodes"], 4);
        assert!(value["snapshot_version"].is_null());
    }

    #[tokio::test]
    async fn routes_are_unavailable_before_publishing() {
        let state = state();
        let (status, value) = send(
            &state,
            post_json("/routes", json!({"origin": 1, "destination": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(value["error"], "stale_aggregates");
    }

    #[tokio::test]
    async fn plans_and_explains_routes() {
        let state = state();
        publish(&state).await;

        let request = json!({
            "origin": {"lat": 0.0, "lon": 0.0001},
            "destination": 3,
            "mode": "walk",
            "band": "night",
            "k": 2
        });
        let (status, value) = send(&state, post_json("/routes", request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["origin"], 1);
        assert_eq!(value["routes"][0]["route"]["label"], "safest");
        assert_eq!(value["routes"][0]["route"]["nodes"], json!([1, 2, 3]));
        assert_eq!(value["routes"][0]["explanation"]["crime"]["total"], 1);
        assert_eq!(value["routes"][0]["geometry"]["type"], "Feature");

        let (status, value) = send(
            &state,
            post_json("/explain", json!({"nodes": [1, 2, 3], "hour": 13.0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["explanation"]["band"], "daytime");
        assert!(value["summary"].as_array().unwrap().len() >= 2);
    }

    #[tokio::test]
    async fn engine_errors_become_status_codes() {
        let state = state();
        publish(&state).await;

        let cases = [
            (json!({"origin": 1, "destination": 99}), StatusCode::NOT_FOUND),
            (json!({"origin": 1, "destination": 4}), StatusCode::UNPROCESSABLE_ENTITY),
            (
                json!({"origin": 1, "destination": 3, "mode": "hovercraft"}),
                StatusCode::BAD_REQUEST,
            ),
            (
                json!({"origin": 1, "destination": 3, "hour": 25.0}),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (body, expected) in cases {
            let (status, value) = send(&state, post_json("/routes", body)).await;
            assert_eq!(status, expected);
            assert!(value["message"].is_string());
        }

        let (status, value) =
            send(&state, post_json("/explain", json!({"nodes": [1, 3]}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["error"], "invalid_route");
    }

    #[tokio::test]
    async fn lists_incidents_near_a_point() {
        let state = state();
        publish(&state).await;

        let (status, value) =
            send(&state, get("/incidents/near?lat=0.0&lon=0.0027&radius=50")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["count"], 1);
        assert_eq!(value["incidents"][0]["incident"]["id"], 1);

        let (status, _) = send(&state, get("/incidents/near?lat=0.0&lon=0.0&radius=-1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_bodies_are_reported_as_json() {
        let state = state();
        let request = Request::builder()
            .method("POST")
            .uri("/routes")
            .header("content-type", "application/json")
            .body(Body::from("{\"origin\": 1,"))
            .unwrap();
        let (status, value) = send(&state, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["error"], "invalid_body");
        assert!(value["message"].is_string());

        let (status, value) = send(&state, post_json("/explain", json!({"nodes": "1,2"}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(value["error"], "invalid_body");
    }

    #[tokio::test]
    async fn lists_shuttle_stops_and_service() {
        let state = state();

        // 2025-06-16 is a Monday
        let (status, value) = send(
            &state,
            get("/shuttles/near?lat=0.0&lon=0.0&radius=100&at=2025-06-16T08:00:00"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["count"], 1);
        assert_eq!(value["stops"][0]["stop"]["name"], "West Gate");
        assert_eq!(value["lines"][0]["status"], "running");

        let (_, value) = send(
            &state,
            get("/shuttles/near?lat=0.0&lon=0.0&at=2025-06-15T08:00:00"),
        )
        .await;
        assert_eq!(value["count"], 2);
        assert_eq!(value["lines"][0]["status"], "no_service_today");
        assert_eq!(value["lines"][0]["next_start"], "2025-06-16T07:00:00");

        let trip = json!({
            "origin": {"lat": 0.0, "lon": 0.0},
            "destination": {"lat": 0.0, "lon": 0.0036},
            "at": "2025-06-16T23:00:00"
        });
        let (status, value) = send(&state, post_json("/shuttles/trip", trip)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["shuttle"]["available"], false);
        assert_eq!(value["shuttle"]["destination_stop"]["stop"]["id"], 11);
        assert_eq!(value["shuttle"]["next_service"], "2025-06-17T07:00:00");

        let far = json!({
            "origin": {"lat": 0.0, "lon": 0.0},
            "destination": {"lat": 0.01, "lon": 0.01}
        });
        let (_, value) = send(&state, post_json("/shuttles/trip", far)).await;
        assert!(value["shuttle"].is_null());
    }
}
