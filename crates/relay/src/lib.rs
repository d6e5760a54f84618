//! TCP front ends for the delay servers: a load balancer over a fixed pool of
//! upstreams and a proxy that journals both directions of every session.

pub mod balancer;
pub mod pool;
pub mod proxy;

use delay_echo_domain::{config::ConfigError, services::telemetry::TelemetryError};
use thiserror::Error;

pub use balancer::LoadBalancer;
pub use pool::{BackendPool, Lease, UpstreamPool};
pub use proxy::{LoggingProxy, TrafficLog};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("upstream pool needs at least one upstream")]
    EmptyPool,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
