//! Domain-level building blocks for the delay echo service.
//!
//! The API binary only wires HTTP on top of these pieces: configuration
//! loading, the service clock, the interruptible wait, the report sink and
//! the delay responder that ties them together.

pub mod config;
pub mod model;
pub mod services;

pub use config::{
    BalancerConfig, BalancingStrategy, ConfigError, PortSource, ProxyConfig, ServerConfig,
};
pub use model::{current_worker_name, TimingReport};
pub use services::*;
