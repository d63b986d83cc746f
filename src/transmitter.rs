use crate::chunk::ChunkGenerator;
use crate::config::Config;
use crate::signal::Completion;
use crate::transport::{Route, Transport};
use crate::Result;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Bytes sent by one transmitter, in send order.
pub type SentLog = Vec<u8>;

/// What the transmitter hands back once it has stopped sending.
#[derive(Debug, Clone)]
pub struct Transmission {
    pub log: Arc<SentLog>,
    pub chunks: u64,
}

/// Sends generated chunks on one endpoint for the configured duration.
#[derive(Debug)]
pub struct Transmitter {
    route: Route,
    generator: ChunkGenerator,
    config: Config,
}

impl Transmitter {
    pub fn new(route: Route, config: &Config) -> Self {
        Self {
            route,
            generator: ChunkGenerator::new(config.chunk_len, config.payload_mode, config.seed),
            config: config.clone(),
        }
    }

    /// Runs the send loop on the calling thread.
    ///
    /// Sends until `duration` has elapsed since `start` or `cancel` fires,
    /// then freezes the sent log and raises `done` with it. A send error ends
    /// the run immediately; `done` is then dropped without being raised.
    ///
    /// # Errors
    ///
    /// Returns the transport error of the first failed send.
    pub fn run<T: Transport + ?Sized>(
        mut self,
        transport: &mut T,
        start: Instant,
        done: Completion<Arc<SentLog>>,
        cancel: &CancellationToken,
    ) -> Result<Transmission> {
        let chunk_len = self.generator.chunk_len();
        let expected = usize::try_from(self.config.line_bytes_per_sec())
            .unwrap_or(usize::MAX)
            .saturating_mul(self.config.duration.as_secs() as usize);
        let mut sent = SentLog::with_capacity(expected.saturating_add(chunk_len));
        let mut chunks = 0u64;

        info!(
            "{} start sending data for at least {:.1} seconds...",
            self.route.tx,
            self.config.duration.as_secs_f64()
        );

        while start.elapsed() < self.config.duration {
            if cancel.is_cancelled() {
                info!("{} transmission cancelled", self.route.tx);
                break;
            }

            let chunk = self.generator.next_chunk();
            if let Err(e) = transport.send(chunk.as_bytes()) {
                error!(
                    "{} send failed after {} bytes: {}",
                    self.route.tx,
                    sent.len(),
                    e
                );
                return Err(e.into());
            }
            sent.extend_from_slice(chunk.as_bytes());
            chunks += 1;
            debug!("{} sent chunk {:#x}", self.route.tx, chunk.sequence);
        }

        info!(
            "{} sent {} bytes, wait for data to be received...",
            self.route.tx,
            sent.len()
        );

        let log = Arc::new(sent);
        if !done.raise(Arc::clone(&log)) {
            debug!("{} receiver no longer listening", self.route.tx);
        }

        Ok(Transmission { log, chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::HEADER_LEN;
    use crate::config::PayloadMode;
    use crate::signal::completion;
    use crate::transport::Endpoint;
    use std::io;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        written: Vec<u8>,
        sends: usize,
        fail_after: Option<usize>,
    }

    impl Transport for Recorder {
        fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
            if self.fail_after == Some(self.sends) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
            }
            self.sends += 1;
            self.written.extend_from_slice(bytes);
            std::thread::sleep(Duration::from_millis(1));
            Ok(())
        }

        fn read(&mut self, _buf: &mut [u8], _wait: Duration) -> io::Result<usize> {
            Ok(0)
        }

        fn clear_rx_queue(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn config() -> Config {
        Config::new()
            .with_duration(Duration::from_millis(30))
            .with_chunk_len(16)
            .with_payload_mode(PayloadMode::Reuse)
            .with_seed(5)
    }

    #[test]
    fn test_log_matches_wire_and_signal() {
        let mut transport = Recorder::default();
        let (done, mut listener) = completion();
        let tx = Transmitter::new(Route::loopback(Endpoint::Primary), &config());

        let result = tx
            .run(&mut transport, Instant::now(), done, &CancellationToken::new())
            .unwrap();

        assert!(result.chunks > 0);
        assert_eq!(result.chunks as usize, transport.sends);
        assert_eq!(result.log.as_slice(), transport.written.as_slice());
        assert_eq!(result.log.len(), result.chunks as usize * 16);

        let signalled = listener.try_take().unwrap();
        assert!(Arc::ptr_eq(&signalled, &result.log));
    }

    #[test]
    fn test_headers_count_up() {
        let mut transport = Recorder::default();
        let (done, _listener) = completion();
        let tx = Transmitter::new(Route::loopback(Endpoint::Primary), &config());
        let result = tx
            .run(&mut transport, Instant::now(), done, &CancellationToken::new())
            .unwrap();

        for (i, chunk) in result.log.chunks(16).enumerate() {
            assert_eq!(&chunk[..HEADER_LEN], &(i as u32).to_le_bytes());
        }
    }

    #[test]
    fn test_send_error_is_fatal_and_unsignalled() {
        let mut transport = Recorder {
            fail_after: Some(3),
            ..Recorder::default()
        };
        let (done, mut listener) = completion();
        let tx = Transmitter::new(Route::loopback(Endpoint::Primary), &config());

        let result = tx.run(&mut transport, Instant::now(), done, &CancellationToken::new());
        assert!(result.is_err());
        assert_eq!(transport.sends, 3);
        assert!(listener.try_take().is_none());
        assert!(listener.is_abandoned());
    }

    #[test]
    fn test_cancel_stops_early_but_signals() {
        let mut transport = Recorder::default();
        let (done, mut listener) = completion();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let tx = Transmitter::new(Route::loopback(Endpoint::Primary), &config());
        let result = tx.run(&mut transport, Instant::now(), done, &cancel).unwrap();
        assert_eq!(result.chunks, 0);
        assert!(listener.try_take().unwrap().is_empty());
    }
}
