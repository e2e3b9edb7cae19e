use actix_web::{middleware, web, App, HttpServer};

use mailrelay::bootstrap;
use mailrelay::config;
use mailrelay::db;
use mailrelay::routes;
use mailrelay::worker;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Load configuration
    let config = config::Config::from_env().map_err(|e| {
        log::error!("Configuration error: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    log::info!(
        "Starting Mailrelay server on {}:{}",
        config.host,
        config.port
    );

    // Create database pool
    let db_pool = db::create_pool(&config.database).await.map_err(|e| {
        log::error!("Database pool error: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    // Run migrations
    db::run_migrations(&db_pool).await.map_err(|e| {
        log::error!("Migration error: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    // Assemble the dispatch pipeline
    let services = bootstrap::build_services(&config, db_pool.clone()).map_err(|e| {
        log::error!("Bootstrap error: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    // Spawn the queue consumer
    tokio::spawn(worker::run_queue_worker(
        services.orchestrator.clone(),
        services.queue.clone(),
        config.worker_poll_interval,
    ));

    let orchestrator = web::Data::from(services.orchestrator.clone());
    let report = web::Data::from(services.report.clone());
    let queue = web::Data::from(services.queue.clone());

    // Clone values for the closure
    let host = config.host.clone();
    let port = config.port;

    let server = HttpServer::new(move || {
        App::new()
            // Share database pool and services with all handlers
            .app_data(web::Data::new(db_pool.clone()))
            .app_data(orchestrator.clone())
            .app_data(report.clone())
            .app_data(queue.clone())
            // Middleware
            .wrap(middleware::Logger::default())
            // Health check routes
            .service(
                web::scope("/health")
                    .route("", web::get().to(routes::health::liveness))
                    .route("/ready", web::get().to(routes::health::readiness)),
            )
            // API routes
            .configure(routes::email::configure)
            .configure(routes::meeting::configure)
            .configure(routes::report::configure)
    })
    .bind((host.as_str(), port))?
    .shutdown_timeout(30)
    .run();

    // Spawn graceful shutdown handler
    let server_handle = server.handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        log::info!("Shutdown signal received, stopping server...");
        server_handle.stop(true).await;
    });

    server.await
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                log::error!("Failed to install Ctrl+C handler: {}", e);
                // Wait forever if signal handler fails
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
