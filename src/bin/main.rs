use clap::{Args, Parser, Subcommand};
use log::{error, info};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use uartperf::serial::{available_port_names, SerialDevice};
use uartperf::simulator::{SimulatedDevice, Wiring};
use uartperf::{
    reporter, BidirectionalCoordinator, Config, Device, Endpoint, PayloadMode, Suite, TestResult,
};

#[derive(Parser)]
#[command(name = "uartperf")]
#[command(about = "UART throughput and data integrity tester for dual-UART probes", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Output results in JSON format
    #[arg(short = 'J', long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test one UART with its TX jumpered to its RX
    Loopback {
        /// Serial port of the UART under test
        #[arg(short, long, required_unless_present = "simulate")]
        port: Option<String>,

        #[command(flatten)]
        test: TestArgs,
    },

    /// Test P_UART and HCI_UART cross-wired to each other
    Bidirectional {
        /// Serial port of P_UART
        #[arg(long, required_unless_present = "simulate")]
        primary: Option<String>,

        /// Serial port of HCI_UART
        #[arg(long, required_unless_present = "simulate")]
        hci: Option<String>,

        #[command(flatten)]
        test: TestArgs,
    },
}

#[derive(Args)]
struct TestArgs {
    /// Line rate in baud
    #[arg(short, long, default_value = "3000000")]
    baud: u32,

    /// Transmit duration in seconds
    #[arg(short = 't', long, default_value = "10")]
    time: u64,

    /// Chunk length in bytes
    #[arg(short = 'l', long, default_value = "100000")]
    length: usize,

    /// Inactivity timeout that ends reception, in milliseconds
    #[arg(long, default_value = "1000")]
    rx_timeout_ms: u64,

    /// Generate a new random payload for every chunk
    #[arg(long)]
    fresh_payload: bool,

    /// Seed for the payload generator
    #[arg(long)]
    seed: Option<u64>,

    /// Run against an in-memory simulated probe instead of serial ports
    #[arg(long)]
    simulate: bool,
}

impl TestArgs {
    fn config(&self, json: bool) -> Config {
        let mode = if self.fresh_payload {
            PayloadMode::Fresh
        } else {
            PayloadMode::Reuse
        };

        let mut config = Config::new()
            .with_baud_rate(self.baud)
            .with_duration(Duration::from_secs(self.time))
            .with_chunk_len(self.length)
            .with_rx_timeout(Duration::from_millis(self.rx_timeout_ms))
            .with_payload_mode(mode)
            .with_json(json);

        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let (suite, config, device) = match cli.command {
        Commands::Loopback { port, test } => {
            let config = test.config(cli.json);
            let device: Arc<dyn Device> = if test.simulate {
                Arc::new(SimulatedDevice::from_config(&config, Wiring::Loopback))
            } else {
                let port = port.unwrap_or_default();
                Arc::new(open_or_exit(&port, None, config.baud_rate))
            };
            (Suite::Loopback(Endpoint::Primary), config, device)
        }

        Commands::Bidirectional { primary, hci, test } => {
            let config = test.config(cli.json);
            let device: Arc<dyn Device> = if test.simulate {
                Arc::new(SimulatedDevice::from_config(&config, Wiring::Crossed))
            } else {
                let primary = primary.unwrap_or_default();
                Arc::new(open_or_exit(&primary, hci.as_deref(), config.baud_rate))
            };
            (Suite::Bidirectional, config, device)
        }
    };

    config.validate()?;
    info!("Found device: {}", device.describe());

    let coordinator = BidirectionalCoordinator::new(device, config);
    let outcomes = coordinator.run_suite(suite).await;

    let results: Vec<&TestResult> = outcomes.iter().filter_map(|o| o.result.as_ref().ok()).collect();
    if cli.json {
        reporter::print_json(results.iter().copied())?;
    } else {
        reporter::print_summary(results.iter().copied());
    }

    let failed = outcomes.iter().filter(|o| !o.passed()).count();
    if failed > 0 {
        error!("{} of {} sessions failed", failed, outcomes.len());
        process::exit(2);
    }

    info!("All {} sessions passed", outcomes.len());
    Ok(())
}

fn open_or_exit(primary: &str, hci: Option<&str>, baud_rate: u32) -> SerialDevice {
    match SerialDevice::open(primary, hci, baud_rate) {
        Ok(device) => device,
        Err(e) => {
            error!("No compatible device found: {}", e);
            let ports = available_port_names();
            if !ports.is_empty() {
                info!("Available serial ports: {}", ports.join(", "));
            }
            process::exit(1);
        }
    }
}
