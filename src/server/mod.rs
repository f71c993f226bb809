pub mod config;
mod http_layers;
mod pages;
#[allow(clippy::module_inception)]
pub mod server;
pub mod session;
pub mod state;
pub mod websocket;

pub use config::ServerConfig;
pub use http_layers::*;
#[allow(unused_imports)] // Used by main.rs
pub use server::run_server;
