mod client;
mod server;

pub use client::{ClientConfig, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use server::ServerConfig;
