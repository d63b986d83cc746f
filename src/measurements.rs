use crate::transport::Route;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of bytes after a mismatch shown from each log for context.
pub const CONTEXT_LEN: usize = 2;

/// Throughput over a measured span.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Throughput {
    pub bytes_per_second: f64,
    pub bits_per_second: f64,
}

impl Throughput {
    /// Computes throughput for `bytes` moved in `elapsed`.
    ///
    /// A zero span yields zero rather than infinity.
    ///
    /// # Examples
    ///
    /// ```
    /// use uartperf::measurements::Throughput;
    /// use std::time::Duration;
    ///
    /// let t = Throughput::new(300_000, Duration::from_secs(2));
    /// assert_eq!(t.bytes_per_second, 150_000.0);
    /// assert_eq!(t.bits_per_second, 1_200_000.0);
    ///
    /// let none = Throughput::new(10, Duration::ZERO);
    /// assert_eq!(none.bytes_per_second, 0.0);
    /// ```
    pub fn new(bytes: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let bytes_per_second = if secs > 0.0 {
            bytes as f64 / secs
        } else {
            0.0
        };
        Self {
            bytes_per_second,
            bits_per_second: bytes_per_second * 8.0,
        }
    }
}

/// First position where the received stream diverges from the sent stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Absolute byte offset into both logs
    pub index: usize,
    /// Chunk the offset falls in (`index / chunk_len`)
    pub chunk: usize,
    pub sent: u8,
    pub received: u8,
    /// Sent bytes starting at `index`, up to `CONTEXT_LEN` following bytes included
    pub sent_context: Vec<u8>,
    /// Received bytes starting at `index`, up to `CONTEXT_LEN` following bytes included
    pub received_context: Vec<u8>,
}

/// Finds the first differing byte over the common prefix of both logs.
///
/// Neither log is modified. Bytes past the shorter log are not compared, so a
/// truncated but otherwise correct stream returns `None`; the length check
/// belongs to [`TestResult`].
///
/// # Examples
///
/// ```
/// use uartperf::measurements::first_mismatch;
///
/// let sent = b"abcdefgh";
/// let received = b"abcXefgh";
/// let m = first_mismatch(sent, received, 4).unwrap();
/// assert_eq!(m.index, 3);
/// assert_eq!(m.chunk, 0);
/// assert_eq!(m.sent, b'd');
/// assert_eq!(m.received, b'X');
/// assert_eq!(m.sent_context, b"def".to_vec());
///
/// assert!(first_mismatch(b"abc", b"ab", 4).is_none());
/// ```
pub fn first_mismatch(sent: &[u8], received: &[u8], chunk_len: usize) -> Option<Mismatch> {
    let index = sent
        .iter()
        .zip(received.iter())
        .position(|(tx, rx)| tx != rx)?;

    let context = |log: &[u8]| log[index..log.len().min(index + CONTEXT_LEN + 1)].to_vec();

    Some(Mismatch {
        index,
        chunk: index / chunk_len.max(1),
        sent: sent[index],
        received: received[index],
        sent_context: context(sent),
        received_context: context(received),
    })
}

/// Final outcome of one test session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub route: Route,
    pub chunk_len: usize,
    pub chunks_sent: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// From session start to the last received byte
    pub elapsed: Duration,
    pub throughput: Throughput,
    /// Nominal line rate in bytes per second, for comparison
    pub line_bytes_per_second: u64,
    /// True if the receiver finished on its own rather than being cancelled
    pub completed: bool,
    /// True iff both logs are byte-for-byte identical
    pub matched: bool,
    pub mismatch: Option<Mismatch>,
}

impl TestResult {
    /// Evaluates the frozen logs of a session.
    pub fn evaluate(
        route: Route,
        sent: &[u8],
        received: &[u8],
        elapsed: Duration,
        chunk_len: usize,
        line_bytes_per_second: u64,
    ) -> Self {
        let mismatch = first_mismatch(sent, received, chunk_len);
        let matched = mismatch.is_none() && sent.len() == received.len();
        let bytes_received = received.len() as u64;

        Self {
            route,
            chunk_len,
            chunks_sent: sent.len().div_ceil(chunk_len.max(1)) as u64,
            bytes_sent: sent.len() as u64,
            bytes_received,
            elapsed,
            throughput: Throughput::new(bytes_received, elapsed),
            line_bytes_per_second,
            completed: true,
            matched,
            mismatch,
        }
    }

    /// Measured throughput as a percentage of the nominal line rate.
    pub fn efficiency_percent(&self) -> f64 {
        if self.line_bytes_per_second == 0 {
            return 0.0;
        }
        self.throughput.bytes_per_second / self.line_bytes_per_second as f64 * 100.0
    }

    /// True when the session finished on its own and the data matched.
    pub fn passed(&self) -> bool {
        self.completed && self.matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Direction, Endpoint};

    fn route() -> Route {
        Direction::PrimaryToHci.route()
    }

    #[test]
    fn test_identical_logs_match() {
        let data: Vec<u8> = (0..=255).collect();
        let result = TestResult::evaluate(route(), &data, &data, Duration::from_secs(1), 64, 256);
        assert!(result.matched);
        assert!(result.mismatch.is_none());
        assert_eq!(result.chunks_sent, 4);
        assert_eq!(result.throughput.bytes_per_second, 256.0);
        assert!((result.efficiency_percent() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mismatch_reports_index_and_chunk() {
        let sent = vec![b'a'; 200_000];
        let mut received = sent.clone();
        received[123_456] = b'b';

        let m = first_mismatch(&sent, &received, 100_000).unwrap();
        assert_eq!(m.index, 123_456);
        assert_eq!(m.chunk, 1);
        assert_eq!(m.sent, b'a');
        assert_eq!(m.received, b'b');
        assert_eq!(m.sent_context, vec![b'a'; 3]);
        assert_eq!(m.received_context, vec![b'b', b'a', b'a']);
    }

    #[test]
    fn test_context_clamped_at_end() {
        let m = first_mismatch(b"abc", b"abd", 10).unwrap();
        assert_eq!(m.index, 2);
        assert_eq!(m.sent_context, b"c".to_vec());
        assert_eq!(m.received_context, b"d".to_vec());
    }

    #[test]
    fn test_comparison_does_not_mutate() {
        let sent = b"0123456789".to_vec();
        let received = b"0123x56789".to_vec();
        let before = received.clone();
        let _ = first_mismatch(&sent, &received, 4);
        assert_eq!(received, before);
    }

    #[test]
    fn test_length_difference_fails_without_mismatch() {
        let sent = b"0123456789";
        let received = b"01234";
        let result = TestResult::evaluate(route(), sent, received, Duration::from_secs(1), 4, 0);
        assert!(!result.matched);
        assert!(result.mismatch.is_none());
        assert_eq!(result.bytes_sent, 10);
        assert_eq!(result.bytes_received, 5);
        assert_eq!(result.efficiency_percent(), 0.0);
    }

    #[test]
    fn test_nothing_received() {
        let route = Route::loopback(Endpoint::Primary);
        let result = TestResult::evaluate(route, b"abcd", b"", Duration::ZERO, 4, 300_000);
        assert!(!result.matched);
        assert_eq!(result.throughput.bytes_per_second, 0.0);
        assert!(result.throughput.bits_per_second.is_finite());
    }

    #[test]
    fn test_empty_logs_match() {
        let result = TestResult::evaluate(route(), b"", b"", Duration::ZERO, 4, 0);
        assert!(result.matched);
        assert_eq!(result.chunks_sent, 0);
    }
}
