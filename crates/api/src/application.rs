use std::{env, sync::Arc};

use actix_web::{middleware::Logger, rt, web, App, HttpServer};
use delay_echo_domain::config::{ConfigError, ServerConfig};
use delay_echo_domain::services::{
    clock::ServiceClock,
    delay::DelayResponder,
    interrupt::InterruptSignal,
    sink::StdoutSink,
    telemetry::{init_telemetry, TelemetryConfig, TelemetryError},
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{handlers, state::AppState};

/// Boots the delay echo server and blocks until it shuts down.
pub async fn run() -> Result<(), BootstrapError> {
    // 1. Start the clock first; elapsed time in every report is measured from here.
    let clock = ServiceClock::start();

    // 2. Load configuration: port from argv[1] or `server_port` in the properties file.
    let config = ServerConfig::load(env::args().skip(1))?;

    // 3. Initialize telemetry. Logs go to stderr so stdout carries only timing lines.
    let telemetry_config = TelemetryConfig::from_env("DELAY_ECHO");
    init_telemetry(&telemetry_config)?;

    // 4. Build the responder. The interrupt is shared with the shutdown watcher below.
    let interrupt = InterruptSignal::new();
    let sink = Arc::new(StdoutSink::stdout());
    let responder = DelayResponder::new(clock, interrupt.clone(), sink);
    let state = AppState::new(responder);

    // 5. Configure the HTTP server. Signal handling is ours (step 7) so blocked
    //    delays are interrupted before workers are asked to stop.
    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Logger::default())
            .configure(handlers::configure)
    })
    .disable_signals()
    .shutdown_timeout(config.shutdown_timeout_secs());

    // Worker count defaults to actix's per-core setting unless overridden.
    if let Some(workers) = config.workers() {
        server = server.workers(workers);
    }

    // 6. Bind and start serving.
    let server = server.bind(config.bind_address())?.run();

    let port_source = config.port_source();
    info!(
        host = config.bind_host(),
        port = config.port(),
        port_source = port_source.as_ref(),
        started_at = %clock.started_at(),
        "delay echo listening"
    );

    // 7. On Ctrl-C, wake every blocked delay with an error, then stop gracefully.
    let handle = server.handle();
    rt::spawn(async move {
        if let Err(err) = rt::signal::ctrl_c().await {
            warn!(?err, "failed to listen for shutdown signal");
            return;
        }
        info!("shutdown requested, interrupting blocked delays");
        interrupt.interrupt();
        handle.stop(true).await;
    });

    // 8. Run until stopped; in-flight responses get `shutdown_timeout` to drain.
    server.await?;
    Ok(())
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
