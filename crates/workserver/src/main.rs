use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use tracing::info;
use tracing_subscriber::EnvFilter;
use workruntime::RuntimeConfig;
use workserver::{build_runtime, configure, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting work item engine server");

    let config = RuntimeConfig::from_env();
    let runtime = build_runtime(config).await?;

    info!(
        "Runtime initialized with {} handlers and {} processes",
        runtime.registry().len(),
        runtime.definitions().await.len()
    );

    let app_state = web::Data::new(AppState {
        runtime: runtime.clone(),
    });

    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    info!("Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .configure(configure)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    info!("Server stopped, settling in-flight work items");
    runtime.engine().shutdown().await;

    Ok(())
}
