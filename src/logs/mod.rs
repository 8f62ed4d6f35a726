//! Log aggregation.
//!
//! Any number of producers push formatted lines into one channel; a single
//! consumer reads them in arrival order. Lines from one producer keep their
//! order, lines from different producers interleave as they arrive.
//!
//! [`LogAggregator::shutdown`] raises the stop signal, joins every producer
//! and only then drops the last sender, so the consumer sees the end of the
//! stream after the final line of the slowest producer.

mod tail;

pub use tail::{follow_file, POLL_INTERVAL};

use std::future::Future;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::service::Service;

/// Default capacity of the aggregation channel.
pub const LINE_BUFFER: usize = 1024;

/// Handle given to each producer to emit lines and observe the stop signal.
#[derive(Debug, Clone)]
pub struct LineSink {
    tx: mpsc::Sender<String>,
    stop: watch::Receiver<bool>,
}

impl LineSink {
    /// Sends a line to the consumer.
    ///
    /// Returns false when the producer should exit, either because a stop was
    /// requested or the consumer is gone.
    pub async fn send(&mut self, line: String) -> bool {
        if self.is_stopped() {
            return false;
        }
        tokio::select! {
            sent = self.tx.send(line) => sent.is_ok(),
            _ = wait_for_stop(&mut self.stop) => false,
        }
    }

    /// Returns true once a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Resolves when a stop is requested.
    pub async fn stopped(&mut self) {
        wait_for_stop(&mut self.stop).await;
    }

    /// Sleeps for `duration` unless stopped first. Returns true if stopped.
    pub async fn idle(&mut self, duration: std::time::Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = wait_for_stop(&mut self.stop) => true,
        }
    }
}

async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    loop {
        let stopped = *stop.borrow_and_update();
        if stopped {
            return;
        }
        // A dropped sender means nobody can stop us any more; treat as stop.
        if stop.changed().await.is_err() {
            return;
        }
    }
}

/// Multiplexes many line producers into one ordered stream.
pub struct LogAggregator {
    tx: mpsc::Sender<String>,
    stop: watch::Sender<bool>,
    producers: JoinSet<()>,
}

impl LogAggregator {
    /// Creates an aggregator and the receiving end of its stream.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let (stop, _) = watch::channel(false);
        (
            Self {
                tx,
                stop,
                producers: JoinSet::new(),
            },
            rx,
        )
    }

    /// Starts a producer.
    pub fn spawn<F, Fut>(&mut self, producer: F)
    where
        F: FnOnce(LineSink) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let sink = LineSink {
            tx: self.tx.clone(),
            stop: self.stop.subscribe(),
        };
        self.producers.spawn(producer(sink));
    }

    /// Starts following a service's log file from its current end.
    ///
    /// Each line is prefixed with the colored service name padded to `width`.
    pub fn tail(&mut self, service: &Service, width: usize) {
        let path = service.log_file_path.clone();
        let prefix = format!("{}|  ", service.label(width + 2));
        debug!(service = %service.name, path = %path.display(), "Tailing log file");

        self.spawn(move |sink| follow_file(path, sink, move |line| format!("{}{}", prefix, line)));
    }

    /// Returns the number of producers still running.
    pub fn producers(&self) -> usize {
        self.producers.len()
    }

    /// Stops every producer, waits for all of them to exit, then closes the
    /// stream.
    pub async fn shutdown(mut self) {
        self.stop.send_replace(true);
        while let Some(joined) = self.producers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Log producer failed");
            }
        }
        debug!("All log producers joined");
        drop(self.tx);
    }
}
