use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use backend::config::BackendConfig;
use backend::pipeline::DetectionPipeline;
use backend::routes::{configure_routes, cors};
use backend::store::ResultStore;
use backend::vision::{self, Annotator};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = match BackendConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            return Err(std::io::Error::other(e.to_string()));
        }
    };

    let detector = match vision::load_detector(&config) {
        Ok(detector) => detector,
        Err(e) => {
            log::error!("Failed to load detection model at startup: {}", e);
            return Err(std::io::Error::other(format!("Model loading failed: {}", e)));
        }
    };

    let annotator = Arc::new(Annotator::from_font_path(config.font_path.as_deref()));
    let pipeline = web::Data::new(DetectionPipeline::new(detector, annotator));
    let store = web::Data::new(ResultStore::new());

    let origins = config.cors_origins.clone();
    log::info!("CORS origins: {:?}", origins);

    let bind_address = config.bind_address();
    log::info!("Starting detection service on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(cors(&origins))
            .wrap(Logger::default())
            .app_data(store.clone())
            .app_data(pipeline.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
