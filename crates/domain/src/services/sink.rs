use std::{
    io::{self, Write},
    sync::{Arc, Mutex, PoisonError},
};

use tracing::warn;

/// Destination for timing lines, shared by every worker. Lines from
/// concurrent workers may interleave, but a single line is written whole.
pub trait ReportSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Writes each line to the wrapped writer and flushes it. The writer sits
/// behind a mutex so a line is never split across workers.
#[derive(Debug, Default)]
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

/// Sink used by the server binary.
pub type StdoutSink = WriterSink<io::Stdout>;

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl WriterSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W> ReportSink for WriterSink<W>
where
    W: Write + Send,
{
    fn emit(&self, line: &str) {
        let mut out = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = out.write_all(line.as_bytes()).and_then(|_| out.flush()) {
            warn!(?err, "failed to write timing line");
        }
    }
}

/// Keeps emitted lines in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ReportSink for MemorySink {
    fn emit(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}
