//! Endpoint and device abstractions consumed by the test harness.
//!
//! A [`Transport`] is one UART endpoint handle. A [`Device`] hands out
//! independent handles for each of its endpoints so that a transmitter and a
//! receiver can drive them from different threads, and so that two directions
//! can run at the same time.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::time::Duration;

/// Byte-level access to one UART endpoint.
///
/// Implementations must be usable from a dedicated blocking thread.
pub trait Transport: Send {
    /// Writes all of `bytes`, blocking until the endpoint has accepted them.
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Reads whatever is available into `buf`.
    ///
    /// Blocks for at most `wait` and returns `Ok(0)` if nothing arrived.
    fn read(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<usize>;

    /// Discards any received bytes that have not been read yet.
    fn clear_rx_queue(&mut self) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).send(bytes)
    }

    fn read(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<usize> {
        (**self).read(buf, wait)
    }

    fn clear_rx_queue(&mut self) -> io::Result<()> {
        (**self).clear_rx_queue()
    }
}

/// The two UART interfaces of the device under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    /// Peripheral UART
    Primary,
    /// Host controller interface UART
    Hci,
}

impl Endpoint {
    pub fn name(self) -> &'static str {
        match self {
            Endpoint::Primary => "P_UART",
            Endpoint::Hci => "HCI_UART",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Transmit and receive endpoints used by one test session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub tx: Endpoint,
    pub rx: Endpoint,
}

impl Route {
    pub fn new(tx: Endpoint, rx: Endpoint) -> Self {
        Self { tx, rx }
    }

    /// Route for a single endpoint whose TX is jumpered to its own RX.
    pub fn loopback(endpoint: Endpoint) -> Self {
        Self::new(endpoint, endpoint)
    }

    pub fn is_loopback(&self) -> bool {
        self.tx == self.rx
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.tx, self.rx)
    }
}

/// Direction of a session on a cross-wired two-UART fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    PrimaryToHci,
    HciToPrimary,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::PrimaryToHci, Direction::HciToPrimary];

    pub fn route(self) -> Route {
        match self {
            Direction::PrimaryToHci => Route::new(Endpoint::Primary, Endpoint::Hci),
            Direction::HciToPrimary => Route::new(Endpoint::Hci, Endpoint::Primary),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.route().fmt(f)
    }
}

/// The transmit handle and the receive handle for one session.
pub struct TransportPair {
    pub tx: Box<dyn Transport>,
    pub rx: Box<dyn Transport>,
}

impl fmt::Debug for TransportPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportPair").finish_non_exhaustive()
    }
}

/// A device under test exposing two independently usable UART endpoints.
pub trait Device: Send + Sync {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Opens a new handle on `endpoint`.
    ///
    /// Handles on the same endpoint share the underlying port: bytes sent on
    /// one are the bytes sent on the port, bytes read by one are gone for all.
    fn endpoint(&self, endpoint: Endpoint) -> Result<Box<dyn Transport>>;

    /// Opens the transmit and receive handles for `route`.
    fn transport_pair(&self, route: Route) -> Result<TransportPair> {
        Ok(TransportPair {
            tx: self.endpoint(route.tx)?,
            rx: self.endpoint(route.rx)?,
        })
    }
}
