use crate::chunk::HEADER_LEN;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How chunk payloads are produced by the transmitter.
///
/// # Examples
///
/// ```
/// use uartperf::{Config, PayloadMode};
///
/// let config = Config::new().with_payload_mode(PayloadMode::Fresh);
/// assert_eq!(config.payload_mode, PayloadMode::Fresh);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadMode {
    /// Generate one random payload up front and only rewrite the header per chunk
    Reuse,
    /// Generate a new random payload for every chunk
    Fresh,
}

/// Configuration for a UART throughput and integrity test.
///
/// All timing and sizing knobs of a test session live here and are passed into
/// session construction. Use the builder methods to customize the defaults,
/// which match a 3 Mbaud 8N1 link tested for 10 seconds.
///
/// # Examples
///
/// ## Default run
///
/// ```
/// use uartperf::Config;
/// use std::time::Duration;
///
/// let config = Config::default();
/// assert_eq!(config.baud_rate, 3_000_000);
/// assert_eq!(config.duration, Duration::from_secs(10));
/// assert_eq!(config.chunk_len, 100_000);
/// ```
///
/// ## Short run for a bench check
///
/// ```
/// use uartperf::Config;
/// use std::time::Duration;
///
/// let config = Config::new()
///     .with_baud_rate(921_600)
///     .with_duration(Duration::from_secs(2))
///     .with_chunk_len(4096)
///     .with_rx_timeout(Duration::from_millis(250));
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.completion_timeout(), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// UART baud rate
    pub baud_rate: u32,

    /// Bits on the wire per payload byte (start + data + parity + stop)
    pub bits_per_byte: u32,

    /// How long the transmitter keeps sending
    pub duration: Duration,

    /// Length of each transmitted chunk in bytes, header included
    pub chunk_len: usize,

    /// Silence on the RX side after which reception is considered finished
    pub rx_timeout: Duration,

    /// Upper bound for a single blocking read on the RX endpoint
    pub poll_interval: Duration,

    /// Period of RX throughput interval reports
    pub interval: Duration,

    /// Bound on the session's wait for reception to finish.
    /// `None` means twice the test duration.
    pub completion_timeout: Option<Duration>,

    /// Payload generation strategy
    pub payload_mode: PayloadMode,

    /// Seed for the payload generator, random when unset
    pub seed: Option<u64>,

    /// Output results in JSON format
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            baud_rate: 3_000_000,
            bits_per_byte: 10,
            duration: Duration::from_secs(10),
            chunk_len: 100_000,
            rx_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
            interval: Duration::from_secs(1),
            completion_timeout: None,
            payload_mode: PayloadMode::Reuse,
            seed: None,
            json: false,
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the UART baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Sets the number of line bits per byte (10 for 8N1).
    pub fn with_bits_per_byte(mut self, bits_per_byte: u32) -> Self {
        self.bits_per_byte = bits_per_byte;
        self
    }

    /// Sets how long the transmitter sends data.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Sets the chunk length.
    ///
    /// Each chunk carries a 4-byte sequence header, so the length must be at
    /// least 4. This is checked by [`Config::validate`].
    pub fn with_chunk_len(mut self, chunk_len: usize) -> Self {
        self.chunk_len = chunk_len;
        self
    }

    /// Sets the RX inactivity timeout.
    pub fn with_rx_timeout(mut self, rx_timeout: Duration) -> Self {
        self.rx_timeout = rx_timeout;
        self
    }

    /// Sets the maximum time a single RX read may block.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Sets the period of RX throughput reports.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Overrides the bound on the wait for reception to finish.
    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = Some(timeout);
        self
    }

    /// Sets the payload generation strategy.
    pub fn with_payload_mode(mut self, mode: PayloadMode) -> Self {
        self.payload_mode = mode;
        self
    }

    /// Seeds the payload generator for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Enables or disables JSON output.
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Returns how long a session waits for the receiver before giving up.
    pub fn completion_timeout(&self) -> Duration {
        self.completion_timeout.unwrap_or(self.duration * 2)
    }

    /// Nominal payload rate of the link in bytes per second.
    ///
    /// ```
    /// use uartperf::Config;
    ///
    /// let config = Config::new().with_baud_rate(3_000_000);
    /// assert_eq!(config.line_bytes_per_sec(), 300_000);
    /// ```
    pub fn line_bytes_per_sec(&self) -> u64 {
        if self.bits_per_byte == 0 {
            return 0;
        }
        u64::from(self.baud_rate) / u64::from(self.bits_per_byte)
    }

    /// Checks that the configuration describes a runnable test.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a field is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(Error::Config("Baud rate must be non-zero".to_string()));
        }
        if self.bits_per_byte == 0 {
            return Err(Error::Config("Bits per byte must be non-zero".to_string()));
        }
        if self.chunk_len < HEADER_LEN {
            return Err(Error::Config(format!(
                "Chunk length must be at least {} bytes, got {}",
                HEADER_LEN, self.chunk_len
            )));
        }
        if self.duration.is_zero() {
            return Err(Error::Config("Test duration must be non-zero".to_string()));
        }
        if self.rx_timeout.is_zero() {
            return Err(Error::Config("RX timeout must be non-zero".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config("Poll interval must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_reference_fixture() {
        let config = Config::default();
        assert_eq!(config.baud_rate, 3_000_000);
        assert_eq!(config.bits_per_byte, 10);
        assert_eq!(config.rx_timeout, Duration::from_secs(1));
        assert_eq!(config.payload_mode, PayloadMode::Reuse);
        assert_eq!(config.completion_timeout(), Duration::from_secs(20));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_completion_timeout_override() {
        let config = Config::new().with_completion_timeout(Duration::from_millis(300));
        assert_eq!(config.completion_timeout(), Duration::from_millis(300));
    }

    #[test]
    fn test_rejects_short_chunk() {
        let config = Config::new().with_chunk_len(3);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_zero_timings() {
        assert!(Config::new().with_duration(Duration::ZERO).validate().is_err());
        assert!(Config::new().with_rx_timeout(Duration::ZERO).validate().is_err());
        assert!(Config::new().with_poll_interval(Duration::ZERO).validate().is_err());
        assert!(Config::new().with_baud_rate(0).validate().is_err());
    }

    #[test]
    fn test_line_rate_zero_bits() {
        let config = Config::new().with_bits_per_byte(0);
        assert_eq!(config.line_bytes_per_sec(), 0);
    }
}
