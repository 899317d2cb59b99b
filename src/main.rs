//! Pitchflow server entrypoint.
//!
//! Wires the durable store, cache, queue, scripted responders, and the turn
//! pipeline, then serves the HTTP API and the background replay worker.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use pitchflow::adapters::http::{app_routes, AppState};
use pitchflow::adapters::{
    scripted_registry, PostgresSessionStore, RedisCache, RedisQueue, ScriptedLeadScorer,
};
use pitchflow::application::{ContextAssembler, ProcessTurnHandler, TurnPersister, WriteReplayer};
use pitchflow::config::AppConfig;
use pitchflow::domain::funnel::StageRouter;
use pitchflow::ports::{Cache, Queue, SessionStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    tracing::info!(
        environment = ?config.server.environment,
        "starting pitchflow"
    );

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("database migrations applied");
    }

    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    let redis_conn = redis_client.get_multiplexed_tokio_connection().await?;

    let store: Arc<dyn SessionStore> = Arc::new(PostgresSessionStore::new(pool));
    let cache: Arc<dyn Cache> = Arc::new(RedisCache::new(redis_conn.clone()));
    let queue: Arc<dyn Queue> = Arc::new(RedisQueue::new(redis_conn));

    let assembler = Arc::new(ContextAssembler::with_threshold(
        Arc::clone(&store),
        config.persistence.rejection_threshold,
    ));
    let persister = Arc::new(TurnPersister::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        Arc::clone(&queue),
        config.persistence.budget(),
    ));
    let process = Arc::new(ProcessTurnHandler::new(
        Arc::clone(&assembler),
        StageRouter::new(ScriptedLeadScorer),
        Arc::new(scripted_registry()),
        persister,
    ));

    let replayer = WriteReplayer::new(Arc::clone(&store), Arc::clone(&queue));
    let replay_poll = config.persistence.replay_poll();
    tokio::spawn(async move {
        replayer.run(replay_poll).await;
    });

    let state = AppState {
        process,
        assembler,
        store,
    };
    let app = app_routes(state);

    let addr = config.server.socket_addr()?;
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
