//! TCP proxy in front of one delay server that journals requests and
//! responses to separate files.

use std::io;

use delay_echo_domain::config::ProxyConfig;
use delay_echo_domain::services::telemetry::{init_telemetry, TelemetryConfig};
use delay_echo_relay::{LoggingProxy, RelayError, TrafficLog};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = bootstrap().await {
        eprintln!("[logging-proxy] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap() -> Result<(), RelayError> {
    // 1. Ports and journal paths come from the properties file only.
    let config = ProxyConfig::load()?;

    // 2. Logging goes to stderr, same knobs as the delay server.
    let telemetry_config = TelemetryConfig::from_env("DELAY_ECHO");
    init_telemetry(&telemetry_config)?;

    // 3. Journals are opened in append mode so restarts keep history.
    let log = TrafficLog::open(config.request_log(), config.response_log()).await?;

    // 4. Bind and serve until Ctrl-C.
    let listener = TcpListener::bind(config.listen_address()).await?;
    let proxy = LoggingProxy::new(listener, config.backend_address(), log);
    info!(
        address = %proxy.local_addr()?,
        backend = ?config.backend_address(),
        request_log = %config.request_log().display(),
        response_log = %config.response_log().display(),
        "logging proxy listening"
    );

    tokio::select! {
        _ = proxy.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("shutdown requested");
        }
    }

    Ok(())
}
