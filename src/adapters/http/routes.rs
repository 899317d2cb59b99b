//! HTTP routes for the conversation endpoints.

use std::time::Duration;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::domain::funnel::LeadScorer;

use super::handlers::{
    delete_session, get_session, health, ingest_frame, process_turn, AppState,
};

/// Hard ceiling for any request, well above the persistence deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates the full application router.
pub fn app_routes<S: LeadScorer + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sessions/:id", get(get_session::<S>))
        .route("/api/sessions/:id", delete(delete_session::<S>))
        .route("/api/sessions/:id/turns", post(process_turn::<S>))
        .route("/api/sessions/:id/frames", post(ingest_frame::<S>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::adapters::{
        scripted_registry, InMemoryCache, InMemoryQueue, InMemorySessionStore, ScriptedLeadScorer,
    };
    use crate::application::{ContextAssembler, PersistenceBudget, ProcessTurnHandler, TurnPersister};
    use crate::domain::funnel::StageRouter;
    use crate::ports::SessionStore;

    #[tokio::test]
    async fn router_assembles_with_all_layers() {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let assembler = Arc::new(ContextAssembler::new(Arc::clone(&store)));
        let persister = Arc::new(TurnPersister::new(
            Arc::clone(&store),
            Arc::new(InMemoryCache::new()),
            Arc::new(InMemoryQueue::new()),
            PersistenceBudget::default(),
        ));
        let process = Arc::new(ProcessTurnHandler::new(
            Arc::clone(&assembler),
            StageRouter::new(ScriptedLeadScorer),
            Arc::new(scripted_registry()),
            persister,
        ));

        let _ = app_routes(AppState {
            process,
            assembler,
            store,
        });
    }
}
