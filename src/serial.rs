//! Hardware backend built on the `serialport` crate.

use crate::transport::{Device, Endpoint, Transport};
use crate::{Error, Result};
use log::debug;
use parking_lot::Mutex;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

/// One handle on an open serial port.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl SerialTransport {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        let timeout = port.timeout();
        Self { port, timeout }
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn read(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<usize> {
        if wait != self.timeout {
            self.port.set_timeout(wait)?;
            self.timeout = wait;
        }
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn clear_rx_queue(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

/// A probe whose two UARTs show up as host serial ports.
pub struct SerialDevice {
    primary: Mutex<Box<dyn SerialPort>>,
    hci: Option<Mutex<Box<dyn SerialPort>>>,
    description: String,
}

impl SerialDevice {
    /// Opens the primary port and, if given, the HCI port at `baud_rate` 8N1.
    ///
    /// Hardware flow control is enabled; the test fixtures cross-wire RTS and
    /// CTS along with the data lines.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serial`] if either port cannot be opened.
    pub fn open(primary: &str, hci: Option<&str>, baud_rate: u32) -> Result<Self> {
        let description = match hci {
            Some(hci) => format!("{} (P_UART) + {} (HCI_UART) @{} baud", primary, hci, baud_rate),
            None => format!("{} (P_UART) @{} baud", primary, baud_rate),
        };

        let primary = Mutex::new(open_port(primary, baud_rate)?);
        let hci = match hci {
            Some(path) => Some(Mutex::new(open_port(path, baud_rate)?)),
            None => None,
        };

        Ok(Self {
            primary,
            hci,
            description,
        })
    }
}

fn open_port(path: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>> {
    debug!("Opening {} @{} baud", path, baud_rate);
    let port = serialport::new(path, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::Hardware)
        .timeout(Duration::from_millis(10))
        .open()?;
    Ok(port)
}

impl Device for SerialDevice {
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn endpoint(&self, endpoint: Endpoint) -> Result<Box<dyn Transport>> {
        let port = match endpoint {
            Endpoint::Primary => &self.primary,
            Endpoint::Hci => self
                .hci
                .as_ref()
                .ok_or_else(|| Error::Device("HCI_UART port was not configured".to_string()))?,
        };
        let handle = port.lock().try_clone()?;
        Ok(Box::new(SerialTransport::new(handle)))
    }
}

/// Lists serial ports present on the host, for diagnostics when opening fails.
pub fn available_port_names() -> Vec<String> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .unwrap_or_default()
}
