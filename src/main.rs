use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod ai;
mod config;
mod dashboard;
mod database;
mod forecast;
mod routes;
mod storage;
mod store;
mod utils;

use ai::AiClient;
use config::Config;
use dashboard::DashboardService;
use database::Database;
use forecast::{init_geocode_cache, mock::DemoWeatherSource, openweather::OpenWeatherClient, WeatherSource};
use routes::{create_router, AppState};
use storage::{KeyValueStorage, MemoryStorage};
use store::WeatherStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skycast_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let storage: Arc<dyn KeyValueStorage> = if config.uses_memory_storage() {
        tracing::warn!("DATABASE_URL=memory, cache, history and preferences will not persist");
        Arc::new(MemoryStorage::new())
    } else {
        // Initialize database
        let pool = sqlx::SqlitePool::connect(&config.database_url).await?;
        let database = Database::new(pool);
        database.init_tables().await?;
        Arc::new(database)
    };
    let store = Arc::new(WeatherStore::new(storage));

    let (source, source_name): (Arc<dyn WeatherSource>, &'static str) =
        if config.openweather_api_key.is_some() {
            (Arc::new(OpenWeatherClient::new(config.clone())?), "openweather")
        } else {
            tracing::warn!("OPENWEATHER_API_KEY not set, serving demo weather data");
            (Arc::new(DemoWeatherSource::new()), "demo")
        };

    if config.openrouter_api_key.is_none() {
        tracing::warn!("OPENROUTER_API_KEY not set, insights will use the built-in rules");
    }
    let ai_client = Arc::new(AiClient::new(config.clone())?);

    let dashboard = DashboardService::new(source, ai_client, store, config.timezone());

    let state = AppState {
        dashboard: Arc::new(dashboard),
        geocode_cache: init_geocode_cache(),
        weather_source: source_name,
    };

    let app = create_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server starting on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
