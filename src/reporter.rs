//! Progress and result reporting.
//!
//! The receiver runs on a blocking thread and must not stall on terminal
//! output, so interval reports go through an unbounded channel to a separate
//! async task that formats them and forwards them to the progress callback.
//! Final summaries are printed by the caller once all sessions are done.

use crate::measurements::TestResult;
use crate::session::{ProgressCallback, ProgressEvent};
use crate::transport::Route;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// RX throughput over one reporting interval.
///
/// # Examples
///
/// ```
/// use uartperf::reporter::IntervalReport;
/// use uartperf::transport::Direction;
/// use std::time::Duration;
///
/// let report = IntervalReport {
///     route: Direction::PrimaryToHci.route(),
///     interval_start: Duration::from_secs(0),
///     interval_end: Duration::from_secs(1),
///     bytes: 300_000,
///     bits_per_second: 2_400_000.0,
/// };
///
/// assert_eq!(report.bytes, 300_000);
/// ```
#[derive(Debug, Clone)]
pub struct IntervalReport {
    pub route: Route,
    pub interval_start: Duration,
    pub interval_end: Duration,
    pub bytes: u64,
    pub bits_per_second: f64,
}

/// Message sent to the reporter task.
#[derive(Debug, Clone)]
pub enum IntervalMessage {
    Report(IntervalReport),
    Complete,
}

/// Handle for sending interval updates from any thread.
#[derive(Debug, Clone)]
pub struct IntervalReporter {
    sender: mpsc::UnboundedSender<IntervalMessage>,
}

impl IntervalReporter {
    /// Creates a reporter handle and the receiver to pass to
    /// [`run_reporter_task`].
    pub fn new() -> (Self, mpsc::UnboundedReceiver<IntervalMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn report(&self, report: IntervalReport) {
        let _ = self.sender.send(IntervalMessage::Report(report));
    }

    pub fn complete(&self) {
        let _ = self.sender.send(IntervalMessage::Complete);
    }
}

/// Drains interval reports until completion or until every handle is gone.
pub async fn run_reporter_task(
    mut receiver: mpsc::UnboundedReceiver<IntervalMessage>,
    json_mode: bool,
    callback: Option<Arc<dyn ProgressCallback>>,
) {
    while let Some(msg) = receiver.recv().await {
        match msg {
            IntervalMessage::Report(report) => {
                if let Some(ref cb) = callback {
                    cb.on_progress(ProgressEvent::IntervalUpdate {
                        route: report.route,
                        interval_start: report.interval_start,
                        interval_end: report.interval_end,
                        bytes: report.bytes,
                        bits_per_second: report.bits_per_second,
                    });
                }

                if !json_mode {
                    println!("{}", format_interval(&report));
                }
            }
            IntervalMessage::Complete => break,
        }
    }
}

/// Scales a byte count to KBytes or MBytes.
pub fn scale_bytes(bytes: u64) -> (f64, &'static str) {
    if bytes >= 1_000_000 {
        (bytes as f64 / 1_000_000.0, "MBytes")
    } else {
        (bytes as f64 / 1_000.0, "KBytes")
    }
}

/// Scales a bit rate to Kbits/sec or Mbits/sec.
pub fn scale_bitrate(bits_per_second: f64) -> (f64, &'static str) {
    if bits_per_second >= 1_000_000.0 {
        (bits_per_second / 1_000_000.0, "Mbits/sec")
    } else {
        (bits_per_second / 1_000.0, "Kbits/sec")
    }
}

fn format_interval(report: &IntervalReport) -> String {
    let (transfer_val, transfer_unit) = scale_bytes(report.bytes);
    let (bitrate_val, bitrate_unit) = scale_bitrate(report.bits_per_second);
    format!(
        "[{:>18}]  {:5.2}-{:5.2}  sec  {:6.2} {:>6}  {:6.2} {:>9}",
        report.route.to_string(),
        report.interval_start.as_secs_f64(),
        report.interval_end.as_secs_f64(),
        transfer_val,
        transfer_unit,
        bitrate_val,
        bitrate_unit
    )
}

/// Formats the final summary line block for one session.
pub fn format_summary(result: &TestResult) -> String {
    let (sent_val, sent_unit) = scale_bytes(result.bytes_sent);
    let (recv_val, recv_unit) = scale_bytes(result.bytes_received);
    let (bitrate_val, bitrate_unit) = scale_bitrate(result.throughput.bits_per_second);

    let verdict = match (&result.mismatch, result.matched, result.completed) {
        (_, true, true) => "OK".to_string(),
        (_, true, false) => "INCOMPLETE".to_string(),
        (Some(m), _, _) => format!("MISMATCH at byte {} (chunk {:#x})", m.index, m.chunk),
        (None, false, _) => "LENGTH MISMATCH".to_string(),
    };

    format!(
        "[{:>18}]  {:5.2} sec  sent {:6.2} {:>6}  received {:6.2} {:>6}  {:6.2} {:>9}  ({:.1}% of line rate)  {}",
        result.route.to_string(),
        result.elapsed.as_secs_f64(),
        sent_val,
        sent_unit,
        recv_val,
        recv_unit,
        bitrate_val,
        bitrate_unit,
        result.efficiency_percent(),
        verdict
    )
}

/// Prints the human-readable summary of a batch of sessions.
pub fn print_summary<'a>(results: impl IntoIterator<Item = &'a TestResult>) {
    println!("- - - - - - - - - - - - - - - - - - - - - - - - -");
    for result in results {
        println!("{}", format_summary(result));
    }
    println!();
}

/// Prints results as a pretty JSON array.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn print_json<'a>(results: impl IntoIterator<Item = &'a TestResult>) -> Result<()> {
    let results: Vec<&TestResult> = results.into_iter().collect();
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
