pub mod config;
pub mod export;
pub mod pipeline;
pub mod routes;
pub mod store;
pub mod vision;
