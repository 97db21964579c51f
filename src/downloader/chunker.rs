//! Writes chunks from many concurrent writers into one file.
//!
//! Writers are registered through a [`ChunkerHandle`] and push [`DataChunk`]s
//! into a shared queue. [`Chunker::save`] is the single consumer: it seeks to
//! each chunk's offset and writes it, in arrival order. The queue closes once
//! every writer has finished and every handle has been dropped, at which point
//! the file is flushed and closed.

use std::future::Future;
use std::io::SeekFrom;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ranges::ByteRange;
use super::stream::DataChunk;
use crate::error::{Error, Result};

pub const DEFAULT_BATCH_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub struct ChunkerOptions {
    /// Delay before each drain iteration. `None` wakes as soon as a chunk is pushed.
    pub pause: Option<Duration>,
    /// Maximum number of chunks written per drain iteration.
    pub batch_size: usize,
    /// Abort the whole save on the first failed writer.
    pub fail_fast: bool,
}

impl Default for ChunkerOptions {
    fn default() -> Self {
        Self {
            pause: None,
            batch_size: DEFAULT_BATCH_SIZE,
            fail_fast: false,
        }
    }
}

#[derive(Debug)]
pub struct TaskFailure {
    pub range: ByteRange,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct SaveReport {
    pub bytes_written: u64,
    pub chunks_written: u64,
    pub failures: Vec<TaskFailure>,
}

struct Shared {
    active: AtomicUsize,
    failures: Mutex<Vec<TaskFailure>>,
    cancel: CancellationToken,
    fail_fast: bool,
}

/// Decrements the active writer count exactly once, however the writer ends.
struct ActiveGuard(Arc<Shared>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Given to each writer to queue chunks for the drain loop.
#[derive(Clone)]
pub struct Pusher {
    tx: mpsc::UnboundedSender<DataChunk>,
}

impl Pusher {
    /// Queues `chunk`. Chunks pushed after the drain loop has stopped are discarded.
    pub fn push(&self, chunk: DataChunk) {
        if self.tx.send(chunk).is_err() {
            log::debug!("Chunker closed, discarding chunk");
        }
    }
}

/// Registers writers with a [`Chunker`]. While any handle is alive the drain
/// loop keeps waiting for more writers.
#[derive(Clone)]
pub struct ChunkerHandle {
    tx: mpsc::UnboundedSender<DataChunk>,
    shared: Arc<Shared>,
}

impl ChunkerHandle {
    /// Spawns `writer` with a [`Pusher`] for `range`.
    ///
    /// A failing writer is logged and recorded in the [`SaveReport`]; with
    /// `fail_fast` it also cancels every other writer and fails the save.
    pub fn add_writer<F, Fut>(&self, range: ByteRange, writer: F) -> JoinHandle<()>
    where
        F: FnOnce(Pusher) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.shared.active.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveGuard(Arc::clone(&self.shared));
        let pusher = Pusher {
            tx: self.tx.clone(),
        };
        let shared = Arc::clone(&self.shared);

        tokio::spawn(async move {
            let _guard = guard;
            // Holds the queue open until the outcome below has been recorded.
            let _open = pusher.clone();
            let run = AssertUnwindSafe(writer(pusher)).catch_unwind();

            let outcome = tokio::select! {
                _ = shared.cancel.cancelled() => Err(Error::Cancelled),
                result = run => result.unwrap_or(Err(Error::Panicked)),
            };

            match outcome {
                Ok(()) => {}
                Err(Error::Cancelled) => log::debug!("Writer for range {} cancelled", range),
                Err(error) => {
                    log::warn!("Writer for range {} failed: {}", range, error);
                    shared
                        .failures
                        .lock()
                        .await
                        .push(TaskFailure { range, error });
                    // Recorded before cancelling so save() always finds the cause.
                    if shared.fail_fast {
                        shared.cancel.cancel();
                    }
                }
            }
        })
    }

    pub fn active_writers(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }
}

pub struct Chunker {
    file: File,
    options: ChunkerOptions,
    rx: mpsc::UnboundedReceiver<DataChunk>,
    handle: ChunkerHandle,
}

impl Chunker {
    pub fn new(file: File, options: ChunkerOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            active: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            fail_fast: options.fail_fast,
        });

        Self {
            file,
            options,
            rx,
            handle: ChunkerHandle { tx, shared },
        }
    }

    pub fn handle(&self) -> ChunkerHandle {
        self.handle.clone()
    }

    pub fn add_writer<F, Fut>(&self, range: ByteRange, writer: F) -> JoinHandle<()>
    where
        F: FnOnce(Pusher) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.handle.add_writer(range, writer)
    }

    /// Drains the queue into the file until every writer has finished and every
    /// handle is gone, then flushes and closes the file.
    ///
    /// A write failure cancels all writers still running and is returned.
    pub async fn save(self) -> Result<SaveReport> {
        let Chunker {
            mut file,
            options,
            mut rx,
            handle,
        } = self;
        let shared = Arc::clone(&handle.shared);
        drop(handle);

        let batch_size = options.batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size);
        let mut report = SaveReport::default();

        loop {
            if let Some(pause) = options.pause {
                tokio::time::sleep(pause).await;
            }

            let received = tokio::select! {
                biased;
                _ = shared.cancel.cancelled() => break,
                received = rx.recv_many(&mut batch, batch_size) => received,
            };
            if received == 0 {
                break;
            }

            if let Err(err) = write_batch(&mut file, &mut batch, &mut report).await {
                log::error!("Failed to write to output file: {}", err);
                shared.cancel.cancel();
                return Err(Error::Write(err));
            }
        }

        // Chunks pushed from here on are discarded.
        rx.close();

        file.flush().await.map_err(Error::Write)?;
        file.sync_all().await.map_err(Error::Write)?;
        drop(file);

        let mut failures = std::mem::take(&mut *shared.failures.lock().await);
        if shared.fail_fast && shared.cancel.is_cancelled() && !failures.is_empty() {
            let first = failures.remove(0);
            return Err(Error::TaskFailed {
                range: first.range,
                source: Box::new(first.error),
            });
        }

        log::debug!(
            "Wrote {} bytes in {} chunks, {} writers failed",
            report.bytes_written,
            report.chunks_written,
            failures.len()
        );
        report.failures = failures;
        Ok(report)
    }
}

async fn write_batch(
    file: &mut File,
    batch: &mut Vec<DataChunk>,
    report: &mut SaveReport,
) -> std::io::Result<()> {
    for chunk in batch.drain(..) {
        file.seek(SeekFrom::Start(chunk.offset)).await?;
        file.write_all(&chunk.data).await?;
        report.bytes_written += chunk.data.len() as u64;
        report.chunks_written += 1;
    }
    // Surfaces errors from writes still in flight on the blocking pool.
    file.flush().await
}
