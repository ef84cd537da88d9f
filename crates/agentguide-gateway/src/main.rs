use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agentguide_gateway::admin::{self, AdminState};
use agentguide_gateway::config::GatewayConfig;
use agentguide_gateway::metrics::register_metrics;
use agentguide_gateway::registry::{
    FileSource, PolicyContext, ReloadSource, ResourceRegistry, StaticSource,
};
use agentguide_gateway::routes;
use agentguide_gateway::state::AppState;
use agentguide_x402::{Facilitator, HttpFacilitator};

const SHUTDOWN_GRACE_SECS: u64 = 30;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Optional positional argument: config file path
    let config_path = std::env::args().nth(1);
    let config = match GatewayConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting resource gateway"
    );

    // Build the resource registry from the configured source
    let context = PolicyContext::from_facilitator(&config.facilitator);
    let source: Box<dyn ReloadSource> = match &config.resources_file {
        Some(path) => {
            tracing::info!(path = %path, "resource registry backed by file");
            Box::new(FileSource::new(path))
        }
        None => Box::new(StaticSource::new(config.endpoints.clone())),
    };
    let registry = Arc::new(ResourceRegistry::new(source, context));
    if let Err(e) = registry.reload() {
        tracing::warn!(error = %e, "failed to load resources on startup, will retry on first request");
    }

    // Facilitator client
    let facilitator_http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .expect("failed to create facilitator HTTP client");
    let facilitator: Arc<dyn Facilitator> = Arc::new(HttpFacilitator::new(
        facilitator_http,
        config.facilitator.url.clone(),
    ));
    tracing::info!(url = %config.facilitator.url, "facilitator initialized");

    let config = Arc::new(config);
    let state = match AppState::new(config.clone(), registry, facilitator.clone()) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize gateway state");
            std::process::exit(1);
        }
    };

    register_metrics();

    // Gateway listener
    let state_data = web::Data::new(state);
    let gateway_server = {
        let state_data = state_data.clone();
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_header()
                .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"]);

            App::new()
                .app_data(state_data.clone())
                .wrap(Logger::default())
                .wrap(cors)
                .configure(routes::configure)
                .default_service(web::to(routes::resources::resource_request))
        })
        .keep_alive(config.gateway_server.idle_timeout())
        .client_request_timeout(config.gateway_server.read_timeout())
        .shutdown_timeout(SHUTDOWN_GRACE_SECS)
        .bind(config.gateway_server.addr())?
    };
    tracing::info!(
        host = %config.gateway_server.host,
        port = config.gateway_server.port,
        "starting gateway HTTP server"
    );

    // Admin listener
    let admin_state = web::Data::new(AdminState {
        config: config.clone(),
        facilitator: Some(facilitator),
    });
    let admin_server = HttpServer::new(move || {
        App::new()
            .app_data(admin_state.clone())
            .wrap(Logger::default())
            .configure(admin::configure)
    })
    .keep_alive(config.admin_server.idle_timeout())
    .client_request_timeout(config.admin_server.read_timeout())
    .shutdown_timeout(SHUTDOWN_GRACE_SECS)
    .bind(config.admin_server.addr())?;
    tracing::info!(
        host = %config.admin_server.host,
        port = config.admin_server.port,
        "starting admin HTTP server"
    );

    tokio::try_join!(gateway_server.run(), admin_server.run())?;

    tracing::info!("shutdown completed successfully");
    Ok(())
}

/// Configure the global tracing subscriber from the admin server's
/// log_level/log_format settings. `RUST_LOG` takes precedence when set.
fn init_tracing(config: &GatewayConfig) {
    let level = match config.admin_server.log_level.as_str() {
        // zerolog-style levels above error collapse to error
        "fatal" | "panic" => "error",
        other => other,
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("{level},actix_web=info")));

    let registry = tracing_subscriber::registry().with(filter);
    if config.admin_server.log_format == "console" {
        registry.with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    }
}
