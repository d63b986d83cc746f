use crate::config::Config;
use crate::measurements::TestResult;
use crate::receiver::Receiver;
use crate::reporter::{run_reporter_task, IntervalReporter};
use crate::signal::completion;
use crate::transmitter::{SentLog, Transmitter};
use crate::transport::{Device, Route, TransportPair};
use crate::{Error, Result};
use log::{error, info};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{self, JoinHandle};
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Progress event types reported while a session runs.
///
/// # Examples
///
/// ```no_run
/// use uartperf::simulator::SimulatedDevice;
/// use uartperf::transport::Direction;
/// use uartperf::{Config, ProgressEvent, TestSession};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default();
/// let device = SimulatedDevice::crossed(config.line_bytes_per_sec());
///
/// let result = TestSession::open(&device, Direction::PrimaryToHci.route(), config)?
///     .with_callback(|event: ProgressEvent| match event {
///         ProgressEvent::IntervalUpdate { bits_per_second, .. } => {
///             println!("{:.2} Mbps", bits_per_second / 1_000_000.0);
///         }
///         ProgressEvent::TestCompleted { matched, .. } => println!("matched: {}", matched),
///         _ => {}
///     })
///     .run()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The receiver has been started and the transmitter is about to send.
    TestStarted { route: Route },
    /// RX throughput over the last reporting interval.
    IntervalUpdate {
        route: Route,
        interval_start: Duration,
        interval_end: Duration,
        bytes: u64,
        bits_per_second: f64,
    },
    /// The transmitter stopped sending.
    TransmitFinished { route: Route, bytes: u64, chunks: u64 },
    /// The receiver did not finish within the completion timeout.
    ReceptionTimeout { route: Route, waited: Duration },
    /// The session produced a result.
    TestCompleted {
        route: Route,
        bytes_received: u64,
        duration: Duration,
        bits_per_second: f64,
        matched: bool,
    },
    /// The session failed without a result.
    Error(String),
}

/// Callback trait for progress updates during a session.
///
/// Implemented for any `Fn(ProgressEvent) + Send + Sync` closure.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

impl<F> ProgressCallback for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        self(event)
    }
}

pub(crate) type CallbackRef = Arc<dyn ProgressCallback>;

/// One direction of a throughput and integrity test.
///
/// A session clears the RX endpoint, starts the receiver on a blocking
/// thread, runs the transmitter on another for the configured duration, and
/// then waits a bounded time for the receiver to see the line go quiet. A
/// receiver that does not finish in time is cancelled and joined, and the
/// result is computed from whatever it collected.
pub struct TestSession {
    route: Route,
    pair: TransportPair,
    config: Config,
    callback: Option<CallbackRef>,
    cancellation_token: CancellationToken,
}

impl TestSession {
    pub fn new(route: Route, pair: TransportPair, config: Config) -> Self {
        Self {
            route,
            pair,
            config,
            callback: None,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Opens the transport pair for `route` on `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot provide either endpoint.
    pub fn open<D: Device + ?Sized>(device: &D, route: Route, config: Config) -> Result<Self> {
        Ok(Self::new(route, device.transport_pair(route)?, config))
    }

    /// Attaches a progress callback.
    pub fn with_callback<C: ProgressCallback + 'static>(mut self, callback: C) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub(crate) fn with_callback_ref(mut self, callback: Option<CallbackRef>) -> Self {
        self.callback = callback;
        self
    }

    /// Replaces the session's cancellation token, e.g. with a child of a
    /// coordinator-wide token.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Cancelling this token stops the transmitter and the receiver early.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    pub fn route(&self) -> Route {
        self.route
    }

    /// Runs the session to completion or timeout.
    ///
    /// Data mismatches and reception timeouts are reported in the returned
    /// [`TestResult`], not as errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, if the RX queue
    /// cannot be cleared, if a send fails, or if a worker thread panics.
    pub async fn run(self) -> Result<TestResult> {
        let TestSession {
            route,
            pair: TransportPair { mut tx, mut rx },
            config,
            callback,
            cancellation_token,
        } = self;

        config.validate()?;

        if route.is_loopback() {
            info!("Running loopback test on {}", route.tx);
        } else {
            info!("Sending data from {} to {}", route.tx, route.rx);
        }

        rx.clear_rx_queue()?;

        let (tx_done, tx_listener) = completion::<Arc<SentLog>>();
        let (rx_done, rx_listener) = completion::<()>();
        let rx_cancel = cancellation_token.child_token();

        let (reporter, report_receiver) = IntervalReporter::new();
        let reporter_task = tokio::spawn(run_reporter_task(
            report_receiver,
            config.json,
            callback.clone(),
        ));

        let start = Instant::now();

        let receiver = Receiver::new(route, &config).with_reporter(reporter.clone());
        let rx_token = rx_cancel.clone();
        let rx_handle = task::spawn_blocking(move || {
            receiver.run(&mut *rx, start, tx_listener, rx_done, &rx_token)
        });

        notify(&callback, ProgressEvent::TestStarted { route });

        let transmitter = Transmitter::new(route, &config);
        let tx_token = cancellation_token.clone();
        let tx_outcome = task::spawn_blocking(move || {
            transmitter.run(&mut *tx, start, tx_done, &tx_token)
        })
        .await
        .map_err(|e| Error::Test(format!("Transmitter task failed: {}", e)))
        .and_then(|outcome| outcome);

        let transmission = match tx_outcome {
            Ok(transmission) => transmission,
            Err(e) => {
                rx_cancel.cancel();
                let _ = rx_handle.await;
                finish_reporter(&reporter, reporter_task).await;
                notify(&callback, ProgressEvent::Error(e.to_string()));
                return Err(e);
            }
        };

        notify(
            &callback,
            ProgressEvent::TransmitFinished {
                route,
                bytes: transmission.log.len() as u64,
                chunks: transmission.chunks,
            },
        );

        let wait = config.completion_timeout();
        if time::timeout(wait, rx_listener.wait()).await.is_err() {
            error!("{} timeout waiting for data to be received", route.tx);
            notify(&callback, ProgressEvent::ReceptionTimeout { route, waited: wait });
            rx_cancel.cancel();
        }

        let reception = rx_handle
            .await
            .map_err(|e| Error::Test(format!("Receiver task failed: {}", e)));
        finish_reporter(&reporter, reporter_task).await;
        let reception = reception?;

        let mut result = reception.verify(route, &transmission.log, start, &config);
        result.chunks_sent = transmission.chunks;

        notify(
            &callback,
            ProgressEvent::TestCompleted {
                route,
                bytes_received: result.bytes_received,
                duration: result.elapsed,
                bits_per_second: result.throughput.bits_per_second,
                matched: result.matched,
            },
        );

        Ok(result)
    }
}

impl std::fmt::Debug for TestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSession")
            .field("route", &self.route)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn notify(callback: &Option<CallbackRef>, event: ProgressEvent) {
    if let Some(cb) = callback {
        cb.on_progress(event);
    }
}

async fn finish_reporter(reporter: &IntervalReporter, task: JoinHandle<()>) {
    reporter.complete();
    let _ = task.await;
}
