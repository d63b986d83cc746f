use crate::config::Config;
use crate::measurements::{Throughput, TestResult};
use crate::reporter::{IntervalReport, IntervalReporter};
use crate::signal::{Completion, CompletionListener};
use crate::transmitter::SentLog;
use crate::transport::{Route, Transport};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

const READ_BUF_LEN: usize = 16 * 1024;

/// Bytes received by one receiver, in arrival order.
pub type ReceivedLog = Vec<u8>;

/// Everything the receive loop gathered before it stopped.
#[derive(Debug, Clone)]
pub struct Reception {
    pub log: ReceivedLog,
    /// Time of the last read that returned data, or the loop start if none did
    pub idle_since: Instant,
    /// False if the loop was cancelled or hit a read error
    pub completed: bool,
}

/// Drains one RX endpoint until the link has gone quiet after transmission.
#[derive(Debug)]
pub struct Receiver {
    route: Route,
    config: Config,
    reporter: Option<IntervalReporter>,
}

impl Receiver {
    pub fn new(route: Route, config: &Config) -> Self {
        Self {
            route,
            config: config.clone(),
            reporter: None,
        }
    }

    /// Sends periodic throughput reports to `reporter` while receiving.
    pub fn with_reporter(mut self, reporter: IntervalReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Runs the receive loop on the calling thread.
    ///
    /// The loop keeps going while any of these hold:
    /// - less than `rx_timeout` has passed since the last byte arrived
    /// - nothing has been received yet
    /// - `tx_done` has not been raised
    ///
    /// It also stops when `cancel` fires or a read fails. `rx_done` is raised
    /// on every exit path.
    pub fn run<T: Transport + ?Sized>(
        self,
        transport: &mut T,
        start: Instant,
        mut tx_done: CompletionListener<Arc<SentLog>>,
        rx_done: Completion<()>,
        cancel: &CancellationToken,
    ) -> Reception {
        let rx = self.route.rx;
        let mut log = ReceivedLog::new();
        let mut buf = vec![0u8; READ_BUF_LEN];
        let mut idle_since = Instant::now();
        let mut tx_finished = false;
        let mut completed = true;

        let mut interval_mark = start.elapsed();
        let mut interval_bytes = 0u64;

        info!("{} receiving data...", rx);

        loop {
            if cancel.is_cancelled() {
                warn!("{} reception cancelled after {} bytes", rx, log.len());
                completed = false;
                break;
            }

            match transport.read(&mut buf, self.config.poll_interval) {
                Ok(0) => {}
                Ok(n) => {
                    idle_since = Instant::now();
                    log.extend_from_slice(&buf[..n]);
                    interval_bytes += n as u64;
                }
                Err(e) => {
                    error!("{} read failed after {} bytes: {}", rx, log.len(), e);
                    completed = false;
                    break;
                }
            }

            if !tx_finished && tx_done.try_take().is_some() {
                debug!("{} transmission finished, waiting for the line to go idle", rx);
                tx_finished = true;
            }

            if let Some(reporter) = &self.reporter {
                let now = start.elapsed();
                if now.saturating_sub(interval_mark) >= self.config.interval {
                    reporter.report(IntervalReport {
                        route: self.route,
                        interval_start: interval_mark,
                        interval_end: now,
                        bytes: interval_bytes,
                        bits_per_second: Throughput::new(interval_bytes, now - interval_mark)
                            .bits_per_second,
                    });
                    interval_mark = now;
                    interval_bytes = 0;
                }
            }

            let idle = idle_since.elapsed() >= self.config.rx_timeout;
            if idle && !log.is_empty() && tx_finished {
                break;
            }
        }

        if completed {
            info!("{} all data received! Received {} bytes", rx, log.len());
        }
        rx_done.raise(());

        Reception {
            log,
            idle_since,
            completed,
        }
    }
}

impl Reception {
    /// Computes throughput and checks the received bytes against `sent`.
    ///
    /// Elapsed time runs from `start` to the last received byte. The first
    /// mismatch, if any, is logged with its surrounding bytes.
    pub fn verify(&self, route: Route, sent: &[u8], start: Instant, config: &Config) -> TestResult {
        let elapsed = self.idle_since.saturating_duration_since(start);
        let mut result = TestResult::evaluate(
            route,
            sent,
            &self.log,
            elapsed,
            config.chunk_len,
            config.line_bytes_per_sec(),
        );
        result.completed = self.completed;

        log_verdict(&result);
        result
    }
}

fn log_verdict(result: &TestResult) {
    let rx = result.route.rx;

    if !result.matched {
        error!("{} data received does not match data sent!", rx);
        match &result.mismatch {
            Some(m) => {
                error!(
                    "{} RX mismatch at index: {} (packet {:#x}), val: {:#04x}",
                    rx, m.index, m.chunk, m.received
                );
                error!("{} tx[{}..]: {}", rx, m.index, hex_bytes(&m.sent_context));
                error!("{} rx[{}..]: {}", rx, m.index, hex_bytes(&m.received_context));
            }
            None => error!(
                "{} length differs: sent {} bytes, received {} bytes",
                rx, result.bytes_sent, result.bytes_received
            ),
        }
    }

    info!(
        "{} RX total time: {:.1} Throughput: {:.2} Bps ({:.2} bps)",
        rx,
        result.elapsed.as_secs_f64(),
        result.throughput.bytes_per_second,
        result.throughput.bits_per_second
    );
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:#04x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
