pub mod config;
pub mod relay;
pub mod transport;

pub use config::RelayConfig;
pub use relay::RelayClient;
pub use transport::RelayTransport;
