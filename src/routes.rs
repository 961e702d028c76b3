use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    ai::{Insight, InsightSource},
    dashboard::{DashboardService, LoadedWeather},
    forecast::{
        geocode_cache_key,
        openweather::UpstreamError,
        reverse_geocode_cache_key,
        types::{CurrentConditions, ForecastPoint, GeocodeResponse, Units, WeatherPayload},
        GeocodeCache,
    },
    store::{HistoryItem, Preferences, Theme},
    utils::{validate_coordinates, ErrorResponse},
};

const DEFAULT_GEOCODE_LIMIT: u32 = 5;
const MAX_GEOCODE_LIMIT: u32 = 10;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub dashboard: Arc<DashboardService>,
    pub geocode_cache: GeocodeCache,
    /// Name of the weather source in use, reported by `/health`.
    pub weather_source: &'static str,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Upstream(UpstreamError),
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::InvalidCoordinates => ApiError::BadRequest(err.to_string()),
            other => ApiError::Upstream(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(&msg, "bad_request"),
            ),
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new(&msg, "not_found"),
            ),
            ApiError::Upstream(err) => {
                tracing::error!("Upstream request failed: {}", err);
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse::new(&err.to_string(), "upstream_error"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

// Request/Response types
#[derive(Debug, Deserialize, IntoParams)]
pub struct GeocodeQuery {
    /// Free-text place name for direct geocoding.
    pub q: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Defaults to 5, capped at 10.
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct WeatherQuery {
    pub lat: f64,
    pub lon: f64,
    /// `metric` or `imperial`; the stored preference when omitted.
    pub units: Option<String>,
    /// Display name shown instead of the provider's station name.
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CityWeatherQuery {
    pub units: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct InsightQuery {
    pub lat: f64,
    pub lon: f64,
    pub units: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordHistoryRequest {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub country: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    #[schema(value_type = String, format = DateTime)]
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
    pub weather_source: String,
}

fn parse_units(raw: Option<&str>) -> Result<Option<Units>, ApiError> {
    raw.map(|value| value.parse::<Units>())
        .transpose()
        .map_err(ApiError::BadRequest)
}

fn check_coordinates(lat: f64, lon: f64) -> Result<(), ApiError> {
    validate_coordinates(lat, lon).map_err(ApiError::BadRequest)
}

/// Direct geocoding through the shared 24h cache.
async fn lookup_places(
    state: &AppState,
    query: &str,
    limit: u32,
) -> Result<Vec<GeocodeResponse>, ApiError> {
    let key = geocode_cache_key(query, limit);
    if let Some(hit) = state.geocode_cache.get(&key).await {
        tracing::debug!("Geocode cache hit: {}", key);
        return Ok(hit);
    }

    let results = state
        .dashboard
        .source()
        .geocode_direct(query.trim(), limit)
        .await?;
    state.geocode_cache.insert(key, results.clone()).await;
    Ok(results)
}

// Route handlers
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        weather_source: state.weather_source.to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/geocode",
    tag = "location",
    params(GeocodeQuery),
    responses(
        (status = 200, description = "Matching places", body = Vec<GeocodeResponse>),
        (status = 400, description = "Neither q nor lat/lon given", body = ErrorResponse),
        (status = 502, description = "Geocoding provider failed", body = ErrorResponse)
    )
)]
pub async fn geocode(
    State(state): State<AppState>,
    Query(params): Query<GeocodeQuery>,
) -> Result<Json<Vec<GeocodeResponse>>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_GEOCODE_LIMIT)
        .clamp(1, MAX_GEOCODE_LIMIT);

    // Reverse geocoding when coordinates are given, direct otherwise
    if let (Some(lat), Some(lon)) = (params.lat, params.lon) {
        check_coordinates(lat, lon)?;

        let key = reverse_geocode_cache_key(lat, lon, limit);
        if let Some(hit) = state.geocode_cache.get(&key).await {
            tracing::debug!("Geocode cache hit: {}", key);
            return Ok(Json(hit));
        }

        let results = state
            .dashboard
            .source()
            .geocode_reverse(lat, lon, limit)
            .await?;
        state.geocode_cache.insert(key, results.clone()).await;
        Ok(Json(results))
    } else if let Some(query) = params.q.filter(|q| !q.trim().is_empty()) {
        Ok(Json(lookup_places(&state, &query, limit).await?))
    } else {
        Err(ApiError::BadRequest(
            "Provide either q or both lat and lon".to_string(),
        ))
    }
}

#[utoipa::path(
    get,
    path = "/weather",
    tag = "weather",
    params(WeatherQuery),
    responses(
        (status = 200, description = "Current conditions with hourly and daily forecast", body = LoadedWeather),
        (status = 400, description = "Invalid coordinates or units", body = ErrorResponse),
        (status = 502, description = "Weather provider failed", body = ErrorResponse)
    )
)]
pub async fn get_weather(
    State(state): State<AppState>,
    Query(params): Query<WeatherQuery>,
) -> Result<Json<LoadedWeather>, ApiError> {
    check_coordinates(params.lat, params.lon)?;
    let requested = parse_units(params.units.as_deref())?;
    let units = state.dashboard.resolve_units(requested).await;

    let weather = state
        .dashboard
        .load_weather(params.lat, params.lon, units, params.name.as_deref())
        .await?;

    Ok(Json(weather))
}

#[utoipa::path(
    get,
    path = "/weather/{city}",
    tag = "weather",
    params(
        ("city" = String, Path, description = "Place name to geocode"),
        CityWeatherQuery
    ),
    responses(
        (status = 200, description = "Weather for the best geocoding match", body = LoadedWeather),
        (status = 400, description = "Invalid units", body = ErrorResponse),
        (status = 404, description = "City not found", body = ErrorResponse),
        (status = 502, description = "Weather provider failed", body = ErrorResponse)
    )
)]
pub async fn get_weather_by_city(
    State(state): State<AppState>,
    Path(city): Path<String>,
    Query(params): Query<CityWeatherQuery>,
) -> Result<Json<LoadedWeather>, ApiError> {
    let requested = parse_units(params.units.as_deref())?;

    let place = if city.trim().is_empty() {
        None
    } else {
        lookup_places(&state, &city, 1).await?.into_iter().next()
    };
    let Some(place) = place else {
        tracing::info!("No geocoding match for {:?}", city);
        return Err(ApiError::NotFound("City not found".to_string()));
    };

    let units = state.dashboard.resolve_units(requested).await;
    let weather = state
        .dashboard
        .load_weather(place.lat, place.lon, units, Some(place.name.as_str()))
        .await?;

    Ok(Json(weather))
}

#[utoipa::path(
    get,
    path = "/insight",
    tag = "weather",
    params(InsightQuery),
    responses(
        (status = 200, description = "Short weather insight", body = Insight),
        (status = 400, description = "Invalid coordinates or units", body = ErrorResponse),
        (status = 502, description = "Weather provider failed", body = ErrorResponse)
    )
)]
pub async fn get_insight(
    State(state): State<AppState>,
    Query(params): Query<InsightQuery>,
) -> Result<Json<Insight>, ApiError> {
    check_coordinates(params.lat, params.lon)?;
    let requested = parse_units(params.units.as_deref())?;
    let units = state.dashboard.resolve_units(requested).await;

    let insight = state
        .dashboard
        .load_insight(params.lat, params.lon, units)
        .await?;

    Ok(Json(insight))
}

#[utoipa::path(
    get,
    path = "/history",
    tag = "history",
    responses((status = 200, description = "Recent searches, newest first", body = Vec<HistoryItem>))
)]
pub async fn get_history(State(state): State<AppState>) -> Json<Vec<HistoryItem>> {
    Json(state.dashboard.store().history().await)
}

#[utoipa::path(
    post,
    path = "/history",
    tag = "history",
    request_body = RecordHistoryRequest,
    responses(
        (status = 200, description = "Updated history", body = Vec<HistoryItem>),
        (status = 400, description = "Invalid entry", body = ErrorResponse)
    )
)]
pub async fn record_history(
    State(state): State<AppState>,
    Json(request): Json<RecordHistoryRequest>,
) -> Result<Json<Vec<HistoryItem>>, ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    check_coordinates(request.lat, request.lon)?;

    let history = state
        .dashboard
        .store()
        .record_history(
            request.name.trim(),
            request.lat,
            request.lon,
            request.country.as_deref(),
            request.state.as_deref(),
        )
        .await;

    Ok(Json(history))
}

#[utoipa::path(
    delete,
    path = "/history",
    tag = "history",
    responses((status = 204, description = "History cleared"))
)]
pub async fn clear_history(State(state): State<AppState>) -> StatusCode {
    state.dashboard.store().clear_history().await;
    StatusCode::NO_CONTENT
}

#[utoipa::path(
    get,
    path = "/preferences",
    tag = "preferences",
    responses((status = 200, description = "Stored preferences", body = Preferences))
)]
pub async fn get_preferences(State(state): State<AppState>) -> Json<Preferences> {
    Json(state.dashboard.store().get_preferences().await)
}

#[utoipa::path(
    put,
    path = "/preferences",
    tag = "preferences",
    request_body = Preferences,
    responses((status = 200, description = "Preferences saved", body = Preferences))
)]
pub async fn update_preferences(
    State(state): State<AppState>,
    Json(prefs): Json<Preferences>,
) -> Json<Preferences> {
    state.dashboard.store().set_preferences(prefs).await;
    Json(prefs)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        geocode,
        get_weather,
        get_weather_by_city,
        get_insight,
        get_history,
        record_history,
        clear_history,
        get_preferences,
        update_preferences
    ),
    components(schemas(
        HealthResponse,
        ErrorResponse,
        GeocodeResponse,
        LoadedWeather,
        WeatherPayload,
        CurrentConditions,
        ForecastPoint,
        Units,
        Insight,
        InsightSource,
        HistoryItem,
        RecordHistoryRequest,
        Preferences,
        Theme
    )),
    tags(
        (name = "weather", description = "Current conditions, forecasts and insights"),
        (name = "location", description = "Geocoding"),
        (name = "history", description = "Recent location searches"),
        (name = "preferences", description = "Unit system and theme")
    )
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/geocode", get(geocode))
        .route("/weather", get(get_weather))
        .route("/weather/:city", get(get_weather_by_city))
        .route("/insight", get(get_insight))
        .route(
            "/history",
            get(get_history).post(record_history).delete(clear_history),
        )
        .route("/preferences", get(get_preferences).put(update_preferences))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
}
