#![doc = include_str!("../README.md")]

mod error;
pub use error::{EcuroMcpError, ErrorData};

pub mod config;
pub mod directory;
pub mod handler;
pub mod model;
pub mod server;
pub mod tools;
pub mod transport;
pub mod upstream;

pub use handler::server::ServerHandler;
pub use server::{EcuroServer, Shared};
pub use upstream::{UpstreamClient, UpstreamConfig, UpstreamError};

// re-export
pub use schemars;
pub use serde;
pub use serde_json;
