use super::line_reader::{read_line, ReadError};
use crate::config::Config;
use crate::record::{Ack, Batch, Record};
use crate::registry::{OffsetStore, RegistryError};
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{error, info, warn};

const READER_CAPACITY: usize = 16 * 1024;

#[derive(Debug, Error)]
pub enum TailerError {
    #[error("could not open file: {0}")]
    Open(std::io::Error),

    #[error("could not stat file: {0}")]
    Stat(std::io::Error),
}

/// Tunables for one tailing worker. Split out from [`Config`] so tests
/// can run with near-zero intervals.
#[derive(Debug, Clone)]
pub struct TailerSettings {
    pub dead_file_threshold: Duration,
    pub dispatch_interval: Duration,
    pub read_timeout: Duration,
    pub poll_interval: Duration,
    pub max_batch_size: usize,
}

impl From<&Config> for TailerSettings {
    fn from(config: &Config) -> Self {
        Self {
            dead_file_threshold: config.dead_file_threshold,
            dispatch_interval: config.dispatch_interval,
            read_timeout: config.read_timeout,
            poll_interval: Duration::from_secs(1),
            max_batch_size: config.max_batch_size,
        }
    }
}

/// One independent tailing worker per watched file.
///
/// Owns the file handle and read position, produces batches of parsed
/// records, and blocks until each batch is acknowledged before advancing
/// its durable offset. Detects truncation and dead files. Never has more
/// than one batch in flight.
pub struct FileTailer {
    path: PathBuf,
    source: String,
    settings: TailerSettings,
    registry: Arc<dyn OffsetStore>,

    reader: Option<BufReader<File>>,
    pending_bytes: Vec<u8>,
    records: Batch,
    offset: u64,
    line: u64,
    last_read: Instant,
    last_dispatch: Instant,
}

impl FileTailer {
    pub fn new(path: PathBuf, settings: TailerSettings, registry: Arc<dyn OffsetStore>) -> Self {
        let source = path.to_string_lossy().into_owned();
        Self {
            path,
            source,
            settings,
            registry,
            reader: None,
            pending_bytes: Vec::new(),
            records: Vec::new(),
            offset: 0,
            line: 0,
            last_read: Instant::now(),
            last_dispatch: Instant::now(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Open the file and seek to the stored offset, if any. A missing or
    /// unreadable registry entry means "start from zero".
    async fn open(&mut self) -> Result<(), TailerError> {
        let mut file = File::open(&self.path).map_err(TailerError::Open)?;
        file.metadata().map_err(TailerError::Stat)?;

        self.offset = match self.registry.get_offset(&self.source).await {
            Ok(offset) => offset,
            Err(RegistryError::NotFound(_)) => 0,
            Err(e) => {
                warn!(source = %self.source, error = %e, "could not read stored offset, starting from zero");
                0
            }
        };

        if self.offset > 0 {
            info!(source = %self.source, offset = self.offset, "resuming from stored offset");
            file.seek(SeekFrom::Start(self.offset))
                .map_err(TailerError::Open)?;
        }

        self.reader = Some(BufReader::with_capacity(READER_CAPACITY, file));
        self.last_read = Instant::now();
        self.last_dispatch = self.last_read;
        Ok(())
    }

    /// Tailing loop. Runs until a stop signal, a dead file, or a fatal
    /// read error. A stop signal only takes effect at the top of the
    /// loop; it does not interrupt an in-flight read or ack wait.
    pub async fn run(
        mut self,
        queue: mpsc::Sender<Batch>,
        mut ack_rx: mpsc::Receiver<Ack>,
        stop: watch::Receiver<bool>,
    ) {
        if let Err(e) = self.open().await {
            error!(source = %self.source, error = %e, "could not start tailer");
            return;
        }

        loop {
            if !self.records.is_empty() && self.interval_elapsed() {
                self.dispatch(&queue, &mut ack_rx).await;
            }
            if *stop.borrow() {
                break;
            }

            let reader = self.reader.as_mut().unwrap();
            match read_line(
                reader,
                &mut self.pending_bytes,
                self.settings.read_timeout,
                self.settings.poll_interval,
            )
            .await
            {
                Ok((text, consumed)) => {
                    self.last_read = Instant::now();
                    self.line += 1;
                    self.records
                        .push(Record::new(&self.source, self.line, self.offset, &text));
                    self.offset += consumed as u64;

                    if self.records.len() >= self.settings.max_batch_size
                        || self.interval_elapsed()
                    {
                        self.dispatch(&queue, &mut ack_rx).await;
                    }
                }
                Err(ReadError::Timeout(_)) => {
                    if self.is_file_dead() {
                        info!(source = %self.source, "stopped watching dead file");
                        break;
                    }
                    if self.is_truncated() {
                        info!(source = %self.source, "file truncated, seeking from start");
                        self.reset_to_start();
                    }
                }
                Err(e) => {
                    error!(source = %self.source, error = %e, "unexpected state reading file");
                    break;
                }
            }
        }

        info!(source = %self.source, "terminated tailer");
    }

    /// Hand the pending batch to the router and wait for its ack. The
    /// queue push blocks when the queue is full; that is the system's
    /// backpressure. The ack wait is unbounded.
    async fn dispatch(&mut self, queue: &mpsc::Sender<Batch>, ack_rx: &mut mpsc::Receiver<Ack>) {
        if queue.send(self.records.clone()).await.is_err() {
            warn!(source = %self.source, "output queue closed, batch not delivered");
            self.last_dispatch = Instant::now();
            return;
        }

        match ack_rx.recv().await {
            None => {
                // Shutdown race: reported but non-fatal, batch retained.
                warn!(source = %self.source, "ack subscription closed");
            }
            Some(ack) if ack.has_error => {
                warn!(
                    source = %self.source,
                    offset = ack.record.offset,
                    "batch not indexed, durable offset left unchanged"
                );
                self.records.clear();
            }
            Some(ack) => {
                let next = ack.record.next_offset();
                if let Err(e) = self.registry.update_offset(&self.source, next).await {
                    warn!(
                        source = %self.source,
                        offset = next,
                        error = %e,
                        "could not persist offset, registry is stale"
                    );
                }
                self.records.clear();
            }
        }
        self.last_dispatch = Instant::now();
    }

    fn interval_elapsed(&self) -> bool {
        self.last_dispatch.elapsed() >= self.settings.dispatch_interval
    }

    fn is_file_dead(&self) -> bool {
        self.last_read.elapsed() >= self.settings.dead_file_threshold
    }

    fn is_truncated(&self) -> bool {
        match self.reader.as_ref() {
            Some(reader) => match reader.get_ref().metadata() {
                Ok(meta) => meta.len() < self.offset,
                Err(_) => false,
            },
            None => false,
        }
    }

    /// Seek back to the start of a truncated file, dropping any partial
    /// line and resetting the line counter.
    fn reset_to_start(&mut self) {
        if let Some(reader) = self.reader.as_mut() {
            if let Err(e) = reader.seek(SeekFrom::Start(0)) {
                error!(source = %self.source, error = %e, "could not seek to start");
            }
        }
        self.pending_bytes.clear();
        self.offset = 0;
        self.line = 0;
    }
}
