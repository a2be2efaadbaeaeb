use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Days until a playground created without a session expires. `None`
    /// leaves anonymous playgrounds without an expiry.
    pub anonymous_ttl_days: Option<u32>,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("playvault.db")
    }

    #[must_use]
    pub fn anonymous_ttl(&self) -> Option<Duration> {
        self.anonymous_ttl_days
            .map(|days| Duration::days(i64::from(days)))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            anonymous_ttl_days: Some(30),
        }
    }
}
