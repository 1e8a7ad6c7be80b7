pub mod client;
pub mod codec;
pub mod commands;
pub mod connection;
pub mod frame;
pub mod server;
pub mod store;

/// Default port a server listens on and a client connects to.
pub const DEFAULT_PORT: u16 = 6379;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;
