//! HTTP binary serving `GET /delay/{millis}`.

// Module layout:
// `application`: bootstrap (config, telemetry, server wiring, shutdown).
// `handlers`: routing, path validation and the delay handler.
// `state`: shared application state handed to every worker.
mod application;
mod handlers;
mod state;


use std::io;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Any bootstrap failure is printed to stderr and turned into a non-zero exit.
    if let Err(err) = application::run().await {
        eprintln!("[api] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}
