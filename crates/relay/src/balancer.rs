use std::{io, net::SocketAddr, sync::Arc, time::Instant};

use metrics::counter;
use tokio::{
    io::copy_bidirectional,
    net::{TcpListener, TcpStream},
};
use tracing::{debug, warn};

use crate::pool::UpstreamPool;

/// Accepts client connections and splices each one onto an upstream chosen
/// by the pool.
pub struct LoadBalancer<P> {
    listener: TcpListener,
    pool: Arc<P>,
    upstream_host: String,
}

impl<P> LoadBalancer<P>
where
    P: UpstreamPool + 'static,
{
    pub fn new(listener: TcpListener, pool: Arc<P>, upstream_host: impl Into<String>) -> Self {
        Self {
            listener,
            pool,
            upstream_host: upstream_host.into(),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until the task is dropped. Accept failures are logged and the
    /// loop keeps going.
    pub async fn run(self) {
        loop {
            let (client, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    counter!("relay_accept_errors_total", "role" => "balancer").increment(1);
                    warn!(?err, "accept failed");
                    continue;
                }
            };

            let pool = self.pool.clone();
            let host = self.upstream_host.clone();
            tokio::spawn(async move {
                let lease = pool.acquire();
                let started = Instant::now();
                let outcome = splice(client, &host, lease.port()).await;
                pool.release(lease, started.elapsed());

                match outcome {
                    Ok((to_upstream, to_client)) => {
                        counter!("relay_sessions_total", "role" => "balancer", "outcome" => "ok")
                            .increment(1);
                        debug!(%peer, upstream = lease.port(), to_upstream, to_client, "session closed");
                    }
                    Err(err) => {
                        counter!("relay_sessions_total", "role" => "balancer", "outcome" => "error")
                            .increment(1);
                        warn!(%peer, upstream = lease.port(), ?err, "session failed");
                    }
                }
            });
        }
    }
}

async fn splice(mut client: TcpStream, host: &str, port: u16) -> io::Result<(u64, u64)> {
    let mut upstream = TcpStream::connect((host, port)).await?;
    copy_bidirectional(&mut client, &mut upstream).await
}
