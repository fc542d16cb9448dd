use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use gateway::client::DetectionClient;
use gateway::config::GatewayConfig;
use gateway::routes::configure_routes;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            return Err(std::io::Error::other(e.to_string()));
        }
    };

    let client = match DetectionClient::new(config.backend_url.clone(), config.relay_timeout) {
        Ok(client) => client,
        Err(e) => {
            log::error!("Failed to build HTTP client: {}", e);
            return Err(std::io::Error::other(e.to_string()));
        }
    };

    log::info!(
        "Relaying to {} (public address {})",
        config.backend_url,
        config.backend_public_url
    );

    let bind_address = config.bind_address();
    log::info!("Starting gateway on {}", bind_address);

    let client = web::Data::new(client);
    let config = web::Data::new(config);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(client.clone())
            .app_data(config.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
