use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

mod ai;
mod config;
mod controllers;
mod db;
mod gateway;
mod hive;
mod intelligence;
mod models;
mod schedule;
mod tools;
mod workspace;

#[cfg(test)]
mod testing;

use ai::{GatewayReasoner, OpenAIClient, ReasoningService};
use config::Config;
use db::Database;
use gateway::{Dispatcher, GatewayClient};
use hive::{ExchangeTracker, HiveManager};
use tools::ToolRegistry;

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub hive: HiveManager,
    pub tool_registry: Arc<ToolRegistry>,
}

fn build_reasoning(config: &Config, dispatcher: Arc<dyn Dispatcher>) -> Arc<dyn ReasoningService> {
    match &config.reasoning_endpoint {
        Some(endpoint) => match OpenAIClient::new(
            &config.reasoning_api_key,
            Some(endpoint.as_str()),
            config.reasoning_model.as_deref(),
        ) {
            Ok(client) => {
                log::info!("Planning via OpenAI-compatible endpoint {}", endpoint);
                return Arc::new(client);
            }
            Err(e) => log::error!("Failed to create reasoning client, falling back to gateway: {}", e),
        },
        None => log::info!("Planning via gateway agent runs"),
    }
    Arc::new(GatewayReasoner::new(dispatcher))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let port = config.port;

    log::info!("Initializing database at {}", config.database_url);
    let db = Database::new(&config.database_url).expect("Failed to initialize database");
    let db = Arc::new(db);

    log::info!("Connecting dispatcher to {}", config.gateway_url);
    let gateway = GatewayClient::new(&config.gateway_url, config.gateway_token.as_deref())
        .expect("Failed to create gateway client");
    let dispatcher: Arc<dyn Dispatcher> = Arc::new(gateway);

    let reasoning = build_reasoning(&config, dispatcher.clone());
    let tracker = Arc::new(ExchangeTracker::new());
    let hive = HiveManager::new(reasoning, dispatcher, db.clone(), tracker)
        .with_workspace_root(config.workspace_root.clone());

    let tool_registry = Arc::new(tools::create_default_registry());
    log::info!("Registered {} tools", tool_registry.len());

    log::info!(
        "Ping-pong turn budget: {} (HIVE_MAX_PING_PONG_TURNS)",
        config::max_ping_pong_turns()
    );
    log::info!("Starting hive backend on port {}", port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                db: Arc::clone(&db),
                config: config.clone(),
                hive: hive.clone(),
                tool_registry: Arc::clone(&tool_registry),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::rpc::config)
            .configure(controllers::tools::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
