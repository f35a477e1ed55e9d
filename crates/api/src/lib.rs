//! HTTP API server for the library saga services.
//!
//! Exposes the saga trigger and query endpoints, outbox delivery
//! counters, health and Prometheus metrics, and wires up the background
//! tasks: one outbox relay per service plus the saga staleness sweeper.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use catalog::{
    BookCatalogView, CreateBookInvoker, InMemoryAuthorService, InMemoryBookService,
    InMemoryGenreService, create_book,
};
use metrics_exporter_prometheus::PrometheusHandle;
use outbox::{
    DedupingConsumer, EventConsumer, InMemoryEventBus, InMemoryOutboxStore, OutboxRelay,
    RelayConfig,
};
use saga::{InMemorySagaStore, SagaOrchestrator, StalenessSweeper};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// The orchestrator type of the default wiring.
pub type CatalogOrchestrator = SagaOrchestrator<
    InMemorySagaStore,
    CreateBookInvoker<InMemoryGenreService, InMemoryAuthorService, InMemoryBookService>,
>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orchestrator: CatalogOrchestrator,
    pub saga_store: InMemorySagaStore,
    pub genres: InMemoryGenreService,
    pub authors: InMemoryAuthorService,
    pub books: InMemoryBookService,
    pub bus: InMemoryEventBus,
    pub view: DedupingConsumer<BookCatalogView>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/sagas/create-book", post(routes::sagas::create_book))
        .route("/sagas/{id}", get(routes::sagas::get))
        .route("/outbox/stats", get(routes::outbox_stats::get))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state: in-memory stores, catalog
/// services with their own outboxes, and the CreateBook saga registered.
pub fn create_default_state() -> Arc<AppState> {
    let saga_store = InMemorySagaStore::new();
    let genres = InMemoryGenreService::new(InMemoryOutboxStore::new());
    let authors = InMemoryAuthorService::new(InMemoryOutboxStore::new());
    let books = InMemoryBookService::new(InMemoryOutboxStore::new());

    let invoker = CreateBookInvoker::new(genres.clone(), authors.clone(), books.clone());
    let mut orchestrator = SagaOrchestrator::new(saga_store.clone(), invoker);
    orchestrator.register(create_book::definition());

    Arc::new(AppState {
        orchestrator,
        saga_store,
        genres,
        authors,
        books,
        bus: InMemoryEventBus::new(),
        view: DedupingConsumer::new(BookCatalogView::new()),
    })
}

/// Starts the background tasks: one outbox relay per service, the bus
/// consumer feeding the read model, and the saga staleness sweeper.
///
/// Returns the shutdown handle and the spawned tasks; flip the watch to
/// `true` to stop them.
pub fn spawn_background(
    state: &Arc<AppState>,
    config: &Config,
) -> (watch::Sender<bool>, Vec<JoinHandle<()>>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    let relay_config = RelayConfig {
        poll_interval: config.outbox_poll_interval,
        ..RelayConfig::default()
    };

    for (service, store) in [
        ("genre-service", state.genres.outbox().clone()),
        ("author-service", state.authors.outbox().clone()),
        ("book-service", state.books.outbox().clone()),
    ] {
        let relay = OutboxRelay::new(service, store, state.bus.clone())
            .with_config(relay_config.clone());
        handles.push(tokio::spawn(relay.run(shutdown_rx.clone())));
    }

    // Read-model projector: consumes the bus, dedupes on event id.
    let view = state.view.clone();
    let mut bus_rx = state.bus.subscribe();
    let mut projector_shutdown = shutdown_rx.clone();
    handles.push(tokio::spawn(async move {
        loop {
            tokio::select! {
                received = bus_rx.recv() => match received {
                    Ok(envelope) => {
                        if let Err(e) = view.handle(&envelope).await {
                            tracing::warn!(error = %e, "read-model projection failed");
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "read-model projector lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
                changed = projector_shutdown.changed() => {
                    if changed.is_err() || *projector_shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }));

    let sweeper = StalenessSweeper::new(state.saga_store.clone(), config.saga_stale_threshold)
        .with_interval(config.saga_sweep_interval);
    handles.push(tokio::spawn(sweeper.run(shutdown_rx)));

    (shutdown_tx, handles)
}
