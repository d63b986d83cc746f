use crate::config::Config;
use crate::measurements::TestResult;
use crate::session::{CallbackRef, ProgressCallback, TestSession};
use crate::transport::{Device, Direction, Endpoint, Route};
use crate::Result;
use log::{error, info};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Sequence of sessions run against a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suite {
    /// One endpoint with its TX jumpered to its RX
    Loopback(Endpoint),
    /// Each direction on its own, then both at once
    Bidirectional,
}

/// Outcome of one session within a suite.
#[derive(Debug)]
pub struct SessionOutcome {
    pub route: Route,
    /// True if the session ran alongside the opposite direction
    pub concurrent: bool,
    pub result: Result<TestResult>,
}

impl SessionOutcome {
    pub fn passed(&self) -> bool {
        matches!(&self.result, Ok(result) if result.passed())
    }
}

/// Runs test sessions against one device, alone or two at a time.
///
/// # Examples
///
/// ```no_run
/// use uartperf::simulator::SimulatedDevice;
/// use uartperf::{BidirectionalCoordinator, Config};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = Config::default();
/// let device = Arc::new(SimulatedDevice::crossed(config.line_bytes_per_sec()));
/// let coordinator = BidirectionalCoordinator::new(device, config);
///
/// let (primary_to_hci, hci_to_primary) = coordinator.run().await;
/// assert!(primary_to_hci.unwrap().matched);
/// assert!(hci_to_primary.unwrap().matched);
/// # }
/// ```
pub struct BidirectionalCoordinator {
    device: Arc<dyn Device>,
    config: Config,
    callback: Option<CallbackRef>,
    cancellation_token: CancellationToken,
}

impl BidirectionalCoordinator {
    pub fn new(device: Arc<dyn Device>, config: Config) -> Self {
        Self {
            device,
            config,
            callback: None,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Attaches a progress callback shared by every session.
    pub fn with_callback<C: ProgressCallback + 'static>(mut self, callback: C) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Cancelling this token stops every running session.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs a single session on `route`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoints cannot be opened or the session
    /// fails; see [`TestSession::run`].
    pub async fn run_route(&self, route: Route) -> Result<TestResult> {
        let session = TestSession::open(self.device.as_ref(), route, self.config.clone())?
            .with_callback_ref(self.callback.clone())
            .with_cancellation_token(self.cancellation_token.child_token());
        session.run().await
    }

    /// Runs both directions at the same time.
    ///
    /// Each direction has its own logs, signals, and timeout. A failure in one
    /// does not stop the other.
    pub async fn run(&self) -> (Result<TestResult>, Result<TestResult>) {
        info!("Running bidirectional throughput test...");
        tokio::join!(
            self.run_route(Direction::PrimaryToHci.route()),
            self.run_route(Direction::HciToPrimary.route())
        )
    }

    /// Runs every session of `suite` in order.
    pub async fn run_suite(&self, suite: Suite) -> Vec<SessionOutcome> {
        info!(
            "Running {:?} suite @{} baud on {}",
            suite,
            self.config.baud_rate,
            self.device.describe()
        );

        let mut outcomes = Vec::new();
        match suite {
            Suite::Loopback(endpoint) => {
                let route = Route::loopback(endpoint);
                outcomes.push(outcome(route, false, self.run_route(route).await));
            }
            Suite::Bidirectional => {
                for direction in Direction::BOTH {
                    let route = direction.route();
                    outcomes.push(outcome(route, false, self.run_route(route).await));
                }
                let (a, b) = self.run().await;
                outcomes.push(outcome(Direction::PrimaryToHci.route(), true, a));
                outcomes.push(outcome(Direction::HciToPrimary.route(), true, b));
            }
        }
        outcomes
    }
}

impl std::fmt::Debug for BidirectionalCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BidirectionalCoordinator")
            .field("device", &self.device.describe())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn outcome(route: Route, concurrent: bool, result: Result<TestResult>) -> SessionOutcome {
    if let Err(e) = &result {
        error!("{} session failed: {}", route, e);
    }
    SessionOutcome {
        route,
        concurrent,
        result,
    }
}
