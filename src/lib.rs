//! uartperf - UART link throughput and integrity tester
//!
//! This library measures how fast data moves across the UART links of a
//! dual-UART debug probe and checks that every byte arrives intact. One
//! direction is driven by a transmitter that streams generated chunks for a
//! fixed duration, while a receiver drains the other end until the line goes
//! quiet. The two logs are then compared byte for byte.
//!
//! # Features
//!
//! - Loopback and bidirectional test suites
//! - Both directions at once, each with its own logs and timeout
//! - First-mismatch reporting with surrounding bytes
//! - Periodic RX throughput reports and JSON output
//! - Hardware ports through `serialport`, or an in-process simulated device
//!
//! # Examples
//!
//! ```no_run
//! use uartperf::simulator::{Fault, SimulatedDevice};
//! use uartperf::transport::{Direction, Endpoint};
//! use uartperf::{Config, TestSession};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> uartperf::Result<()> {
//! let config = Config::new().with_duration(Duration::from_secs(2));
//! let device = SimulatedDevice::from_config(&config, uartperf::simulator::Wiring::Crossed)
//!     .with_fault(Endpoint::Hci, Fault::CorruptByte(1234));
//!
//! let result = TestSession::open(&device, Direction::PrimaryToHci.route(), config)?
//!     .run()
//!     .await?;
//! assert_eq!(result.mismatch.map(|m| m.index), Some(1234));
//! # Ok(())
//! # }
//! ```

pub mod chunk;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod measurements;
pub mod receiver;
pub mod reporter;
pub mod serial;
pub mod session;
pub mod signal;
pub mod simulator;
pub mod token_bucket;
pub mod transmitter;
pub mod transport;

pub use config::{Config, PayloadMode};
pub use coordinator::{BidirectionalCoordinator, SessionOutcome, Suite};
pub use error::{Error, Result};
pub use measurements::{Mismatch, TestResult, Throughput};
pub use session::{ProgressCallback, ProgressEvent, TestSession};
pub use transport::{Device, Direction, Endpoint, Route, Transport, TransportPair};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
