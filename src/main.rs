use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};

use attendance_engine::{
    config::{Config, StorageBackend},
    db::init_db,
    docs::ApiDoc,
    engine::AttendanceEngine,
    routes,
    store::{memory::MemoryStore, mysql::MySqlStore},
    utils::{clock::SystemClock, dashboard_cache::DashboardCache},
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::rolling;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Attendance engine is running"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    info!(
        backend = %config.storage_backend,
        addr = %config.server_addr,
        "Server starting..."
    );

    let clock = Arc::new(SystemClock);
    let cache = DashboardCache::new(config.dashboard_cache_capacity, config.dashboard_cache_ttl);
    let engine = match config.storage_backend {
        StorageBackend::Mysql => {
            let pool = init_db(&config).await?;
            AttendanceEngine::with_backend(
                MySqlStore::new(pool),
                clock,
                cache,
                config.attendance.clone(),
            )
        }
        StorageBackend::Memory => {
            warn!("In-memory storage selected, data is lost on restart");
            AttendanceEngine::with_backend(
                MemoryStore::new(),
                clock,
                cache,
                config.attendance.clone(),
            )
        }
    };

    let limits = routes::rate_limit(config.rate_per_min)?;
    let server_addr = config.server_addr.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(engine.clone()))
            .service(index)
            .configure(|cfg| routes::configure(cfg, &config, &limits))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
