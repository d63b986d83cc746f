//! In-memory stand-in for a dual-UART probe.
//!
//! Each simulated line carries bytes from one endpoint's TX to one endpoint's
//! RX. Sends are paced at the configured line rate, reads block on a condition
//! variable for at most the requested wait. Faults can be injected per line to
//! exercise the integrity checker.

use crate::config::Config;
use crate::token_bucket::TokenBucket;
use crate::transport::{Device, Endpoint, Transport};
use crate::Result;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Bytes moved per pacing step; keeps the RX side fed in small bursts the way
/// a USB bridge would instead of one chunk at a time.
const SEGMENT_LEN: usize = 4096;

/// How the TX pins are wired to the RX pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wiring {
    /// P_UART TX to HCI_UART RX and HCI_UART TX to P_UART RX
    Crossed,
    /// Every endpoint's TX jumpered to its own RX
    Loopback,
}

/// Damage applied to the bytes travelling over a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fault {
    #[default]
    None,
    /// Invert the byte at this offset, counted from the first byte ever
    /// written to the line
    CorruptByte(u64),
    /// Swallow everything, as if the wire were cut
    DropAll,
}

#[derive(Debug, Default)]
struct LineState {
    queue: VecDeque<u8>,
    written: u64,
    fault: Fault,
}

#[derive(Debug)]
struct Line {
    state: Mutex<LineState>,
    ready: Condvar,
    pacer: Mutex<TokenBucket>,
}

impl Line {
    fn new(bytes_per_sec: u64) -> Self {
        Self {
            state: Mutex::new(LineState::default()),
            ready: Condvar::new(),
            pacer: Mutex::new(TokenBucket::new(bytes_per_sec)),
        }
    }

    fn transmit(&self, bytes: &[u8]) {
        let mut pacer = self.pacer.lock();
        for segment in bytes.chunks(SEGMENT_LEN) {
            pacer.consume(segment.len());
            self.deliver(segment);
        }
    }

    fn deliver(&self, segment: &[u8]) {
        let mut state = self.state.lock();
        let fault = state.fault;
        for &byte in segment {
            let offset = state.written;
            state.written += 1;
            match fault {
                Fault::DropAll => {}
                Fault::CorruptByte(at) if at == offset => state.queue.push_back(!byte),
                _ => state.queue.push_back(byte),
            }
        }
        drop(state);
        self.ready.notify_all();
    }

    fn receive(&self, buf: &mut [u8], wait: Duration) -> usize {
        let deadline = Instant::now() + wait;
        let mut state = self.state.lock();
        while state.queue.is_empty() {
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }

        let n = buf.len().min(state.queue.len());
        for (slot, byte) in buf.iter_mut().zip(state.queue.drain(..n)) {
            *slot = byte;
        }
        n
    }

    fn clear(&self) {
        self.state.lock().queue.clear();
    }
}

/// Handle on one endpoint of a [`SimulatedDevice`].
#[derive(Debug)]
pub struct SimTransport {
    tx_line: Arc<Line>,
    rx_line: Arc<Line>,
}

impl Transport for SimTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.tx_line.transmit(bytes);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<usize> {
        Ok(self.rx_line.receive(buf, wait))
    }

    fn clear_rx_queue(&mut self) -> io::Result<()> {
        self.rx_line.clear();
        Ok(())
    }
}

/// Simulated two-UART device.
///
/// # Examples
///
/// ```
/// use uartperf::simulator::{Fault, SimulatedDevice};
/// use uartperf::transport::{Device, Direction, Endpoint, Transport};
/// use std::time::Duration;
///
/// let device = SimulatedDevice::crossed(1_000_000)
///     .with_fault(Endpoint::Hci, Fault::CorruptByte(2));
///
/// let mut pair = device.transport_pair(Direction::PrimaryToHci.route()).unwrap();
/// pair.tx.send(&[1, 2, 3, 4]).unwrap();
///
/// let mut buf = [0u8; 8];
/// let n = pair.rx.read(&mut buf, Duration::from_millis(100)).unwrap();
/// assert_eq!(&buf[..n], &[1, 2, !3, 4]);
/// ```
#[derive(Debug)]
pub struct SimulatedDevice {
    wiring: Wiring,
    primary_rx: Arc<Line>,
    hci_rx: Arc<Line>,
}

impl SimulatedDevice {
    pub fn new(wiring: Wiring, bytes_per_sec: u64) -> Self {
        Self {
            wiring,
            primary_rx: Arc::new(Line::new(bytes_per_sec)),
            hci_rx: Arc::new(Line::new(bytes_per_sec)),
        }
    }

    /// Two UARTs cross-wired to each other.
    pub fn crossed(bytes_per_sec: u64) -> Self {
        Self::new(Wiring::Crossed, bytes_per_sec)
    }

    /// Each UART looped back onto itself.
    pub fn loopback(bytes_per_sec: u64) -> Self {
        Self::new(Wiring::Loopback, bytes_per_sec)
    }

    /// Builds a device paced at the line rate described by `config`.
    pub fn from_config(config: &Config, wiring: Wiring) -> Self {
        Self::new(wiring, config.line_bytes_per_sec())
    }

    /// Injects `fault` on the line feeding `endpoint`'s RX.
    pub fn with_fault(self, endpoint: Endpoint, fault: Fault) -> Self {
        self.rx_line(endpoint).state.lock().fault = fault;
        self
    }

    pub fn wiring(&self) -> Wiring {
        self.wiring
    }

    fn rx_line(&self, endpoint: Endpoint) -> &Arc<Line> {
        match endpoint {
            Endpoint::Primary => &self.primary_rx,
            Endpoint::Hci => &self.hci_rx,
        }
    }

    fn tx_line(&self, endpoint: Endpoint) -> &Arc<Line> {
        let target = match (self.wiring, endpoint) {
            (Wiring::Loopback, e) => e,
            (Wiring::Crossed, Endpoint::Primary) => Endpoint::Hci,
            (Wiring::Crossed, Endpoint::Hci) => Endpoint::Primary,
        };
        self.rx_line(target)
    }
}

impl Device for SimulatedDevice {
    fn describe(&self) -> String {
        format!("simulated probe ({:?} wiring)", self.wiring)
    }

    fn endpoint(&self, endpoint: Endpoint) -> Result<Box<dyn Transport>> {
        Ok(Box::new(SimTransport {
            tx_line: Arc::clone(self.tx_line(endpoint)),
            rx_line: Arc::clone(self.rx_line(endpoint)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Direction, Route};

    const WAIT: Duration = Duration::from_millis(50);

    #[test]
    fn test_crossed_wiring_delivers_to_peer() {
        let device = SimulatedDevice::crossed(0);
        let mut primary = device.endpoint(Endpoint::Primary).unwrap();
        let mut hci = device.endpoint(Endpoint::Hci).unwrap();

        primary.send(b"ping").unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(primary.read(&mut buf, WAIT).unwrap(), 0);
        let n = hci.read(&mut buf, WAIT).unwrap();
        assert_eq!(&buf[..n], b"ping");
    }

    #[test]
    fn test_loopback_wiring_returns_to_sender() {
        let device = SimulatedDevice::loopback(0);
        let mut pair = device.transport_pair(Route::loopback(Endpoint::Primary)).unwrap();

        pair.tx.send(b"echo").unwrap();
        let mut buf = [0u8; 16];
        let n = pair.rx.read(&mut buf, WAIT).unwrap();
        assert_eq!(&buf[..n], b"echo");
    }

    #[test]
    fn test_read_times_out_empty() {
        let device = SimulatedDevice::crossed(0);
        let mut hci = device.endpoint(Endpoint::Hci).unwrap();
        let mut buf = [0u8; 4];
        let start = Instant::now();
        assert_eq!(hci.read(&mut buf, WAIT).unwrap(), 0);
        assert!(start.elapsed() >= WAIT);
    }

    #[test]
    fn test_partial_reads_preserve_order() {
        let device = SimulatedDevice::crossed(0);
        let mut pair = device.transport_pair(Direction::HciToPrimary.route()).unwrap();
        pair.tx.send(&[1, 2, 3, 4, 5]).unwrap();

        let mut buf = [0u8; 2];
        let mut out = Vec::new();
        loop {
            let n = pair.rx.read(&mut buf, WAIT).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_clear_discards_pending() {
        let device = SimulatedDevice::crossed(0);
        let mut pair = device.transport_pair(Direction::PrimaryToHci.route()).unwrap();
        pair.tx.send(b"stale").unwrap();
        pair.rx.clear_rx_queue().unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(pair.rx.read(&mut buf, WAIT).unwrap(), 0);
    }

    #[test]
    fn test_drop_all_fault() {
        let device = SimulatedDevice::crossed(0).with_fault(Endpoint::Primary, Fault::DropAll);
        let mut pair = device.transport_pair(Direction::HciToPrimary.route()).unwrap();
        pair.tx.send(&[9; 100]).unwrap();

        let mut buf = [0u8; 128];
        assert_eq!(pair.rx.read(&mut buf, WAIT).unwrap(), 0);
    }

    #[test]
    fn test_corrupt_offset_spans_sends() {
        let device = SimulatedDevice::crossed(0).with_fault(Endpoint::Hci, Fault::CorruptByte(5));
        let mut pair = device.transport_pair(Direction::PrimaryToHci.route()).unwrap();
        pair.tx.send(&[0, 1, 2, 3]).unwrap();
        pair.tx.send(&[4, 5, 6, 7]).unwrap();

        let mut buf = [0u8; 16];
        let n = pair.rx.read(&mut buf, WAIT).unwrap();
        assert_eq!(&buf[..n], &[0, 1, 2, 3, 4, !5, 6, 7]);
    }
}
