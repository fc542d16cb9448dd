pub mod client;
pub mod config;
pub mod pages;
pub mod routes;
