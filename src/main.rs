use std::sync::Arc;
use std::time::Duration;

use moderation_service::{
    cache::RedisDecisionCache,
    classifiers::{HttpMediaClassifier, HttpTextClassifier, KeywordClassifier},
    config::Config,
    db::PgDecisionStore,
    notifier::WebhookNotifier,
    queue::LocalJobQueue,
    services::{EngineSettings, ModerationEngine},
    workers,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Starting Moderation Service...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        "Configuration loaded"
    );

    // Initialize database pool
    let pool = Arc::new(
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.database_url)
            .await?,
    );
    tracing::info!("Database pool initialized");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&*pool).await?;
    tracing::info!("Migrations completed successfully");

    // Connect Redis for the decision cache
    let redis_client = redis::Client::open(config.redis_url.clone())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    tracing::info!("Redis connection established");

    // Classifier adapters and keyword fallback
    let text_classifier = Arc::new(HttpTextClassifier::new(
        config.text_classifier_url.clone(),
        Duration::from_secs(config.text_timeout_secs),
    ));
    let media_classifier = Arc::new(HttpMediaClassifier::new(
        config.media_classifier_url.clone(),
        Duration::from_secs(config.media_timeout_secs),
    ));
    let keyword_fallback = KeywordClassifier::new(&config.banned_terms_path)?;
    tracing::info!(
        terms_path = %config.banned_terms_path,
        "Keyword fallback classifier loaded"
    );

    // Wire the engine
    let cache = Arc::new(RedisDecisionCache::new(redis_conn));
    let store = Arc::new(PgDecisionStore::new(pool));
    let queue = Arc::new(LocalJobQueue::new());
    let notifier = Arc::new(WebhookNotifier::new(config.review_webhook_url.clone()));

    let engine = Arc::new(ModerationEngine::new(
        text_classifier,
        media_classifier,
        keyword_fallback,
        cache,
        store,
        queue.clone(),
        EngineSettings {
            reject_threshold: config.reject_threshold,
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
        },
    ));

    // Register job handlers with their concurrency ceilings
    workers::register_workers(
        &queue,
        engine,
        notifier,
        config.moderation_concurrency,
        config.review_concurrency,
        config.batch_concurrency,
    )
    .await;

    tracing::info!(
        moderation_concurrency = config.moderation_concurrency,
        review_concurrency = config.review_concurrency,
        batch_concurrency = config.batch_concurrency,
        "Moderation Service is running"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping");

    Ok(())
}
