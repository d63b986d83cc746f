// End-to-end session tests against the simulated probe
// Timings are shortened so each session finishes in well under a second

use std::time::{Duration, Instant};
use uartperf::simulator::{Fault, SimulatedDevice, Wiring};
use uartperf::{Config, Device, Direction, Endpoint, PayloadMode, Route, TestSession, Transport};

fn fast_config() -> Config {
    Config::new()
        .with_baud_rate(2_000_000)
        .with_duration(Duration::from_millis(200))
        .with_chunk_len(1000)
        .with_rx_timeout(Duration::from_millis(50))
        .with_poll_interval(Duration::from_millis(5))
        .with_interval(Duration::from_millis(100))
        .with_json(true)
}

/// Clean crossed link: everything sent arrives intact
#[tokio::test]
async fn test_clean_link_matches() {
    let config = fast_config();
    let device = SimulatedDevice::from_config(&config, Wiring::Crossed);

    let result = TestSession::open(&device, Direction::PrimaryToHci.route(), config)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(result.completed);
    assert!(result.matched);
    assert!(result.mismatch.is_none());
    assert!(result.bytes_sent > 0);
    assert_eq!(result.bytes_sent, result.bytes_received);
    assert_eq!(result.bytes_sent % 1000, 0);
    assert_eq!(result.chunks_sent, result.bytes_sent / 1000);
    assert!(result.throughput.bytes_per_second > 0.0);
    assert_eq!(
        result.throughput.bits_per_second,
        result.throughput.bytes_per_second * 8.0
    );
    assert!(result.passed());
}

/// One inverted byte is found at its exact index and chunk
#[tokio::test]
async fn test_corrupted_byte_is_located() {
    let config = fast_config();
    let device = SimulatedDevice::from_config(&config, Wiring::Crossed)
        .with_fault(Endpoint::Hci, Fault::CorruptByte(1234));

    let result = TestSession::open(&device, Direction::PrimaryToHci.route(), config)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(result.completed);
    assert!(!result.matched);
    assert!(!result.passed());
    assert_eq!(result.bytes_sent, result.bytes_received);

    let mismatch = result.mismatch.expect("corruption should be reported");
    assert_eq!(mismatch.index, 1234);
    assert_eq!(mismatch.chunk, 1);
    assert_eq!(mismatch.received, !mismatch.sent);
    assert_eq!(mismatch.sent_context.len(), 3);
    assert_eq!(mismatch.received_context[0], mismatch.received);
    assert_eq!(mismatch.sent_context[1..], mismatch.received_context[1..]);
}

/// Corruption in one direction leaves the other untouched
#[tokio::test]
async fn test_fault_only_affects_its_line() {
    let config = fast_config();
    let device = SimulatedDevice::from_config(&config, Wiring::Crossed)
        .with_fault(Endpoint::Hci, Fault::CorruptByte(10));

    let result = TestSession::open(&device, Direction::HciToPrimary.route(), config)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(result.passed());
}

/// A dead line ends in a bounded wait and a partial result
#[tokio::test]
async fn test_dead_line_times_out_with_partial_result() {
    let config = fast_config().with_completion_timeout(Duration::from_millis(300));
    let device = SimulatedDevice::from_config(&config, Wiring::Crossed)
        .with_fault(Endpoint::Hci, Fault::DropAll);

    let started = Instant::now();
    let result = TestSession::open(&device, Direction::PrimaryToHci.route(), config)
        .unwrap()
        .run()
        .await
        .unwrap();

    // duration + completion timeout, plus slack for joining the receiver
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!result.completed);
    assert!(!result.matched);
    assert!(result.bytes_sent > 0);
    assert_eq!(result.bytes_received, 0);
    assert!(result.mismatch.is_none());
}

/// Jumpered TX to RX on a single endpoint
#[tokio::test]
async fn test_loopback_route() {
    let config = fast_config().with_payload_mode(PayloadMode::Fresh).with_seed(7);
    let device = SimulatedDevice::from_config(&config, Wiring::Loopback);
    let route = Route::loopback(Endpoint::Primary);

    let session = TestSession::open(&device, route, config).unwrap();
    assert_eq!(session.route(), route);

    let result = session.run().await.unwrap();
    assert!(result.passed());
    assert_eq!(result.route.to_string(), "P_UART->P_UART");
}

/// Stale bytes in the RX queue are discarded before the run starts
#[tokio::test]
async fn test_stale_rx_bytes_are_cleared() {
    let config = fast_config();
    let device = SimulatedDevice::from_config(&config, Wiring::Crossed);

    let mut primary = device.endpoint(Endpoint::Primary).unwrap();
    primary.send(b"leftover from a previous run").unwrap();

    let result = TestSession::open(&device, Direction::PrimaryToHci.route(), config)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(result.passed());
}

/// Cancelling the session token stops both sides early
#[tokio::test]
async fn test_cancelled_session_stops_early() {
    let config = fast_config().with_duration(Duration::from_secs(30));
    let device = SimulatedDevice::from_config(&config, Wiring::Crossed);

    let session = TestSession::open(&device, Direction::PrimaryToHci.route(), config).unwrap();
    let token = session.cancellation_token().clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        token.cancel();
    });

    let started = Instant::now();
    let result = session.run().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!result.completed);
    assert!(result.bytes_sent > 0);
}

/// Invalid settings are rejected before anything is sent
#[tokio::test]
async fn test_invalid_config_rejected() {
    let config = fast_config().with_chunk_len(2);
    let device = SimulatedDevice::from_config(&config, Wiring::Crossed);

    let err = TestSession::open(&device, Direction::PrimaryToHci.route(), config)
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, uartperf::Error::Config(_)));
}
