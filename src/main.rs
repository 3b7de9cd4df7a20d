use std::sync::Arc;

use pizza_recommender::{
    api::{create_router, AppState},
    config::Config,
    db::{create_pool, create_redis_client, run_migrations, Cache},
    ml::ForestConfig,
    models::MenuCatalog,
    services::{
        providers::{OpenMeteoWeather, PgDietaryProfile, PgOrderHistory},
        FallbackPolicy, KeywordRules, ModelStore, RecommendationService, TrainingConfig,
        TrainingPipeline,
    },
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pizza_recommender=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(host = %config.host, port = config.port, "Configuration loaded");

    let menu = Arc::new(MenuCatalog::load_from_file(&config.menu_path)?);

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_handle) = Cache::new(redis_client).await;

    let weather = OpenMeteoWeather::new(
        config.weather_api_url.clone(),
        config.weather_latitude,
        config.weather_longitude,
        config.cold_threshold_celsius,
    )
    .with_cache(cache);

    let rules = Arc::new(KeywordRules::default());
    let trainer = TrainingPipeline::new(
        TrainingConfig {
            min_samples: config.min_training_samples,
            forest: ForestConfig {
                n_estimators: config.forest_trees,
                seed: config.random_seed,
                ..ForestConfig::default()
            },
            ..TrainingConfig::default()
        },
        rules.clone(),
        ModelStore::new(&config.model_path),
    );

    let recommender = RecommendationService::new(
        menu,
        rules,
        Arc::new(PgOrderHistory::new(pool.clone())),
        Arc::new(weather),
        Arc::new(PgDietaryProfile::new(pool)),
        trainer,
        FallbackPolicy::default(),
    );

    let status = recommender.initialize().await;
    tracing::info!(loaded = status.loaded, classes = status.classes.len(), "Model initialized");

    let app = create_router(AppState::new(recommender));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cache_handle.shutdown().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
