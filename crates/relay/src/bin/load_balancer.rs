//! TCP load balancer spreading clients over a fixed pool of delay servers.

use std::{env, io, sync::Arc};

use delay_echo_domain::config::BalancerConfig;
use delay_echo_domain::services::telemetry::{init_telemetry, TelemetryConfig};
use delay_echo_relay::{BackendPool, LoadBalancer, RelayError};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = bootstrap().await {
        eprintln!("[load-balancer] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap() -> Result<(), RelayError> {
    // 1. Strategy, listen port and upstreams: argv first, properties file otherwise.
    let config = BalancerConfig::load(env::args().skip(1))?;

    // 2. Logging goes to stderr, same knobs as the delay server.
    let telemetry_config = TelemetryConfig::from_env("DELAY_ECHO");
    init_telemetry(&telemetry_config)?;

    // 3. One pool slot per upstream port.
    let pool = Arc::new(BackendPool::new(config.strategy(), config.upstream_ports())?);

    // 4. Bind and serve until Ctrl-C.
    let listener = TcpListener::bind(config.listen_address()).await?;
    let balancer = LoadBalancer::new(listener, pool, config.upstream_host());
    let strategy = config.strategy();
    info!(
        address = %balancer.local_addr()?,
        strategy = strategy.as_ref(),
        upstreams = ?config.upstream_ports(),
        "load balancer listening"
    );

    tokio::select! {
        _ = balancer.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("shutdown requested");
        }
    }

    Ok(())
}
