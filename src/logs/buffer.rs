//! Write buffer for the syslog drain
//!
//! Records accumulate in memory and are written to storage in one batch,
//! either when the queue reaches its capacity or on a periodic timer.

use super::database::LogDb;
use super::model::Log;
use super::LogError;
use crate::metrics;
use crate::signals::ShutdownSignal;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub struct DrainBuffer {
    db: Arc<LogDb>,
    queue: Mutex<Vec<Log>>,
    max_queue_size: usize,
}

impl DrainBuffer {
    pub fn new(db: Arc<LogDb>, max_queue_size: usize) -> Self {
        Self {
            db,
            queue: Mutex::new(Vec::with_capacity(max_queue_size)),
            max_queue_size: max_queue_size.max(1),
        }
    }

    /// Number of records waiting to be flushed
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a record, writing the whole queue once it is full
    ///
    /// A failed capacity-triggered write drops the batch and is reported to
    /// the caller.
    pub async fn enqueue(&self, log: Log) -> Result<(), LogError> {
        let batch = {
            let mut queue = self.lock();
            queue.push(log);
            metrics::record_buffer_size(queue.len());
            if queue.len() < self.max_queue_size {
                return Ok(());
            }
            mem::take(&mut *queue)
        };

        self.write(batch).await.map(|_| ())
    }

    /// Write every queued record in one batch
    ///
    /// The queue is emptied before the write starts, so records enqueued
    /// meanwhile land in the next batch. On failure the taken batch is lost.
    pub async fn flush(&self) -> Result<usize, LogError> {
        let batch = mem::take(&mut *self.lock());
        self.write(batch).await
    }

    async fn write(&self, batch: Vec<Log>) -> Result<usize, LogError> {
        metrics::record_buffer_size(self.len());
        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.len();
        let start = Instant::now();
        match self.db.add_all(&batch).await {
            Ok(()) => {
                let elapsed = start.elapsed();
                metrics::record_flush(count, elapsed);
                tracing::debug!(
                    count = count,
                    duration_ms = elapsed.as_millis() as u64,
                    "Flushed log batch"
                );
                Ok(count)
            }
            Err(e) => {
                metrics::record_flush_error();
                tracing::error!(
                    error = %e,
                    count = count,
                    "Failed to flush log batch, records dropped"
                );
                Err(e)
            }
        }
    }

    /// Spawn the periodic flush task
    ///
    /// The task stops when a shutdown signal arrives; the final flush is
    /// left to the caller once the server has stopped accepting requests.
    pub fn spawn_flush_task(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<ShutdownSignal>,
    ) -> JoinHandle<()> {
        let buffer = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // errors are already logged by `write`
                        let _ = buffer.flush().await;
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("Flush task stopping");
                        break;
                    }
                }
            }
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Log>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
