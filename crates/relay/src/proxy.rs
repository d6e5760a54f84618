use std::{io, net::SocketAddr, path::Path, sync::Arc};

use chrono::{Local, NaiveTime};
use metrics::counter;
use strum_macros::IntoStaticStr;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::Mutex,
};
use tracing::{debug, info, warn};

const BUFFER_SIZE: usize = 8 * 1024;
const SESSION_REPORT_EVERY: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    /// Client to backend.
    Request,
    /// Backend to client.
    Response,
}

/// Append-only journals for the two directions of proxied traffic.
#[derive(Debug)]
pub struct TrafficLog {
    requests: Mutex<File>,
    responses: Mutex<File>,
}

impl TrafficLog {
    pub async fn open(request_log: &Path, response_log: &Path) -> io::Result<Self> {
        Ok(Self {
            requests: Mutex::new(append(request_log).await?),
            responses: Mutex::new(append(response_log).await?),
        })
    }

    pub async fn record(&self, direction: Direction, chunk: &[u8]) -> io::Result<()> {
        let entry = format_entry(Local::now().time(), chunk);
        let file = match direction {
            Direction::Request => &self.requests,
            Direction::Response => &self.responses,
        };
        let mut file = file.lock().await;
        file.write_all(entry.as_bytes()).await?;
        file.flush().await
    }
}

async fn append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path).await
}

/// One journal entry: a timestamped separator line followed by the chunk,
/// decoded lossily so binary payloads never fail the write.
pub fn format_entry(at: NaiveTime, chunk: &[u8]) -> String {
    format!(
        "\n--------------------{}----------------------\n{}",
        at.format("%H:%M:%S%.3f"),
        String::from_utf8_lossy(chunk)
    )
}

/// Forwards every connection to a single backend and journals the bytes that
/// pass in each direction.
pub struct LoggingProxy {
    listener: TcpListener,
    backend: (String, u16),
    log: Arc<TrafficLog>,
}

impl LoggingProxy {
    pub fn new(listener: TcpListener, backend: (String, u16), log: TrafficLog) -> Self {
        Self {
            listener,
            backend,
            log: Arc::new(log),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until the task is dropped.
    pub async fn run(self) {
        let mut sessions: u64 = 0;
        loop {
            let (client, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    counter!("relay_accept_errors_total", "role" => "proxy").increment(1);
                    warn!(?err, "accept failed");
                    continue;
                }
            };

            sessions += 1;
            if sessions % SESSION_REPORT_EVERY == 0 {
                info!(sessions, "proxy sessions accepted");
            }

            let backend = self.backend.clone();
            let log = self.log.clone();
            tokio::spawn(async move {
                match proxy_session(client, &backend, &log).await {
                    Ok((requested, responded)) => {
                        counter!("relay_sessions_total", "role" => "proxy", "outcome" => "ok")
                            .increment(1);
                        debug!(%peer, requested, responded, "session closed");
                    }
                    Err(err) => {
                        counter!("relay_sessions_total", "role" => "proxy", "outcome" => "error")
                            .increment(1);
                        warn!(%peer, ?err, "session failed");
                    }
                }
            });
        }
    }
}

async fn proxy_session(
    mut client: TcpStream,
    backend: &(String, u16),
    log: &TrafficLog,
) -> io::Result<(u64, u64)> {
    let mut upstream = TcpStream::connect((backend.0.as_str(), backend.1)).await?;
    let (client_read, client_write) = client.split();
    let (upstream_read, upstream_write) = upstream.split();

    tokio::try_join!(
        pump(client_read, upstream_write, log, Direction::Request),
        pump(upstream_read, client_write, log, Direction::Response),
    )
}

/// Copies one direction until EOF, journaling each chunk before it is
/// forwarded, then half-closes the peer.
async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    log: &TrafficLog,
    direction: Direction,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let read = reader.read(&mut buf).await?;
        if read == 0 {
            writer.shutdown().await.ok();
            return Ok(total);
        }

        if let Err(err) = log.record(direction, &buf[..read]).await {
            let label: &'static str = direction.into();
            warn!(?err, direction = label, "failed to journal traffic");
        }
        writer.write_all(&buf[..read]).await?;
        total += read as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn log_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "delay-echo-proxy-{}-{}.log",
            std::process::id(),
            name
        ));
        std::fs::remove_file(&path).ok();
        path
    }

    /// Backend that reads a five byte request, answers `world` and closes.
    async fn backend() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 5];
            socket.read_exact(&mut request).await.unwrap();
            socket.write_all(b"world").await.unwrap();
        });
        port
    }

    #[test]
    fn entry_has_separator_and_millisecond_timestamp() {
        let at = NaiveTime::from_hms_milli_opt(9, 5, 7, 42).unwrap();
        assert_eq!(
            format_entry(at, b"GET /delay/10"),
            "\n--------------------09:05:07.042----------------------\nGET /delay/10"
        );
    }

    #[test]
    fn entry_tolerates_binary_payloads() {
        let at = NaiveTime::from_hms_milli_opt(0, 0, 0, 0).unwrap();
        assert!(format_entry(at, &[0xff, b'o', b'k']).ends_with("\u{fffd}ok"));
    }

    #[tokio::test]
    async fn relays_and_journals_both_directions() {
        let request_log = log_path("requests");
        let response_log = log_path("responses");
        let backend_port = backend().await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let log = TrafficLog::open(&request_log, &response_log).await.unwrap();
        let proxy = LoggingProxy::new(listener, ("127.0.0.1".to_string(), backend_port), log);
        let addr = proxy.local_addr().unwrap();
        tokio::spawn(proxy.run());

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"hello").await.unwrap();
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"world");

        let requests = std::fs::read_to_string(&request_log).unwrap();
        let responses = std::fs::read_to_string(&response_log).unwrap();
        assert!(requests.starts_with("\n--------------------"));
        assert!(requests.ends_with("\nhello"));
        assert!(responses.ends_with("\nworld"));
        assert!(!responses.contains("hello"));

        std::fs::remove_file(request_log).ok();
        std::fs::remove_file(response_log).ok();
    }

    #[tokio::test]
    async fn journals_append_across_opens() {
        let request_log = log_path("append-req");
        let response_log = log_path("append-resp");

        for chunk in [b"first".as_slice(), b"second".as_slice()] {
            let log = TrafficLog::open(&request_log, &response_log).await.unwrap();
            log.record(Direction::Request, chunk).await.unwrap();
        }

        let requests = std::fs::read_to_string(&request_log).unwrap();
        assert!(requests.contains("\nfirst"));
        assert!(requests.ends_with("\nsecond"));
        assert_eq!(std::fs::read_to_string(&response_log).unwrap(), "");

        std::fs::remove_file(request_log).ok();
        std::fs::remove_file(response_log).ok();
    }
}
