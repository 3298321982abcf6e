#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the complaint heatmap engine.
//!
//! Serves global and profile heatmaps (JSON and `GeoJSON`), the category
//! catalog, and the invalidation hook the intake service calls after
//! persisting a report. Reports and the administrative hierarchy are read
//! from `PostgreSQL` when `DATABASE_URL` is set.

mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use complaint_map_database::ComplaintStore;
use complaint_map_database::db;
use complaint_map_database::memory::InMemoryComplaintStore;
use complaint_map_database::postgres::PostgresComplaintStore;
use complaint_map_geography::HierarchyDirectory;
use complaint_map_geography::memory::InMemoryHierarchy;
use complaint_map_geography::queries::PostgresHierarchy;
use complaint_map_heatmap::clock::SystemClock;
use complaint_map_heatmap::config::HeatmapConfig;
use complaint_map_heatmap::service::HeatmapService;
use switchy_database::Database;

/// Shared application state.
pub struct AppState {
    /// Heatmap engine.
    pub heatmap: Arc<HeatmapService>,
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/categories", web::get().to(handlers::categories))
            .route("/heatmap/global", web::get().to(handlers::global_heatmap))
            .route(
                "/heatmap/global.geojson",
                web::get().to(handlers::global_geojson),
            )
            .route("/heatmap/profile", web::get().to(handlers::missing_profile))
            .route("/heatmap/profile/", web::get().to(handlers::missing_profile))
            .route(
                "/heatmap/profile/{entity_id}",
                web::get().to(handlers::profile_heatmap),
            )
            .route(
                "/heatmap/profile/{entity_id}/geojson",
                web::get().to(handlers::profile_geojson),
            )
            .route(
                "/complaints/persisted",
                web::post().to(handlers::complaint_persisted),
            ),
    );
}

type Backends = (Arc<dyn ComplaintStore>, Arc<dyn HierarchyDirectory>);

/// Opens the report store and hierarchy named by `DATABASE_URL`, or empty
/// in-memory ones when it is unset.
async fn open_backends(config: &HeatmapConfig) -> std::io::Result<Backends> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        log::warn!("DATABASE_URL is not set, serving from an empty in-memory store");
        return Ok((
            Arc::new(InMemoryComplaintStore::new()),
            Arc::new(InMemoryHierarchy::new()),
        ));
    };

    log::info!("Connecting to database...");
    let db: Arc<dyn Database> = Arc::from(
        db::connect(&url, config.query_timeout)
            .await
            .map_err(|e| std::io::Error::other(format!("Failed to connect to database: {e}")))?,
    );

    Ok((
        Arc::new(PostgresComplaintStore::new(Arc::clone(&db))),
        Arc::new(PostgresHierarchy::new(db)),
    ))
}

/// Starts the heatmap API server.
///
/// Reads [`HeatmapConfig`] from the environment, opens the backends, starts
/// the cache sweeper, and serves until shutdown. The caller provides the
/// async runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the database connection fails or
/// the HTTP server fails to bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = HeatmapConfig::from_env();
    log::info!("Heatmap configuration: {config:?}");

    let (store, directory) = open_backends(&config).await?;
    let heatmap = Arc::new(HeatmapService::new(
        config.clone(),
        store,
        directory,
        Arc::new(SystemClock),
    ));

    let _sweeper = config
        .sweep_interval
        .map(|interval| heatmap.cache().spawn_sweeper(interval));

    let state = web::Data::new(AppState { heatmap });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
