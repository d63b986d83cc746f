//! Token bucket pacing for the simulated UART line.
//!
//! A real UART drains its TX FIFO at `baud / bits_per_byte` bytes per second
//! and a blocking send returns only once the bytes are on their way. The
//! simulated line reproduces that by charging every send against a token
//! bucket refilled at the line rate and putting the sending thread to sleep
//! when the bucket runs dry.
//!
//! ## Algorithm
//!
//! Tokens (bytes) are added at a constant rate up to a burst capacity of
//! 100 ms of line time, which stands in for the UART and USB FIFOs. A send
//! consumes tokens; a deficit is slept off using a pre-computed
//! nanoseconds-per-byte figure so the hot path stays in integer arithmetic.

use std::thread;
use std::time::{Duration, Instant};

/// Blocking token bucket rate limiter.
///
/// # Examples
///
/// ```
/// use uartperf::token_bucket::TokenBucket;
///
/// // 3 Mbaud 8N1 moves 300,000 payload bytes per second
/// let mut bucket = TokenBucket::new(300_000);
///
/// // Well within the burst allowance, so this returns immediately
/// bucket.consume(1500);
/// ```
#[derive(Debug)]
pub struct TokenBucket {
    /// Target bytes per second
    pub bytes_per_sec: u64,
    /// Current number of available tokens (bytes)
    tokens: i64,
    /// Maximum burst size (tokens)
    capacity: i64,
    /// Last time tokens were refilled
    last_refill: Instant,
    /// Nanoseconds per byte
    nanos_per_byte: u64,
}

impl TokenBucket {
    /// Creates a bucket for the given line rate in bytes per second.
    ///
    /// A rate of zero disables pacing.
    pub fn new(bytes_per_sec: u64) -> Self {
        let capacity = i64::try_from((bytes_per_sec / 10).max(1024)).unwrap_or(i64::MAX);

        let nanos_per_byte = if bytes_per_sec > 0 {
            1_000_000_000 / bytes_per_sec
        } else {
            0
        };

        Self {
            bytes_per_sec,
            tokens: capacity,
            capacity,
            last_refill: Instant::now(),
            nanos_per_byte,
        }
    }

    /// Charges `bytes` against the bucket, sleeping the calling thread until
    /// the line would have had time to shift them out.
    pub fn consume(&mut self, bytes: usize) {
        if self.bytes_per_sec == 0 {
            return;
        }

        let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
        self.refill();

        if self.tokens < bytes {
            let deficit = u64::try_from(bytes - self.tokens).unwrap_or(0);
            let sleep_nanos = deficit.saturating_mul(self.nanos_per_byte);

            // Sleeps below 10 µs are not worth a context switch
            if sleep_nanos > 10_000 {
                thread::sleep(Duration::from_nanos(sleep_nanos));
                self.refill();
            }
        }

        self.tokens -= bytes;
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed_micros = u64::try_from(now.duration_since(self.last_refill).as_micros())
            .unwrap_or(u64::MAX);
        let tokens_to_add = elapsed_micros.saturating_mul(self.bytes_per_sec) / 1_000_000;

        if tokens_to_add > 0 {
            let added = i64::try_from(tokens_to_add).unwrap_or(i64::MAX);
            self.tokens = self.tokens.saturating_add(added).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Refills the bucket to capacity.
    pub fn reset(&mut self) {
        self.tokens = self.capacity;
        self.last_refill = Instant::now();
    }

    /// Bytes that can be sent right now without sleeping.
    pub fn available_tokens(&self) -> i64 {
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_100ms_of_line_time() {
        let bucket = TokenBucket::new(300_000);
        assert_eq!(bucket.capacity, 30_000);
        assert_eq!(bucket.tokens, bucket.capacity);

        let slow = TokenBucket::new(960);
        assert_eq!(slow.capacity, 1024);
    }

    #[test]
    fn test_nanos_per_byte() {
        let bucket = TokenBucket::new(1_000_000);
        assert_eq!(bucket.nanos_per_byte, 1000);
    }

    #[test]
    fn test_consume_within_burst() {
        let mut bucket = TokenBucket::new(1_000_000);
        let initial = bucket.available_tokens();
        bucket.consume(1500);
        assert!(bucket.available_tokens() <= initial - 1500 + 100);
    }

    #[test]
    fn test_consume_paces_beyond_burst() {
        // 100 KB/s with a 10 KB burst: 30 KB needs roughly 200 ms
        let mut bucket = TokenBucket::new(100_000);
        let start = Instant::now();
        for _ in 0..30 {
            bucket.consume(1000);
        }
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn test_zero_rate_never_blocks() {
        let mut bucket = TokenBucket::new(0);
        let start = Instant::now();
        bucket.consume(10_000_000);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_reset() {
        let mut bucket = TokenBucket::new(1_000_000);
        bucket.tokens = 0;
        bucket.reset();
        assert_eq!(bucket.available_tokens(), bucket.capacity);
    }
}
