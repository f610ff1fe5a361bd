// wayvpn-api: HTTP transport for subscription endpoints

pub mod client;
pub mod error;
pub mod transport;

pub use client::SubscriptionClient;
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};
