//! # UWB Bridge
//!
//! Runs one mesh node: radio worker, UART reader and the main service loop.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Set up logging (stderr, non-blocking)
//!    - Load configuration (first argument, default `config/default.toml`)
//!    - Bring up the radio; a failure here halts the node
//!    - Open the autopilot UART
//!
//! 2. **Main Loop**
//!    - Radio worker handles every radio event in order
//!    - UART reader fills the UART ring buffer
//!    - Main loop relays packets both ways, polls the anchor and pings for
//!      neighbours
//!
//! 3. **Graceful Shutdown**
//!    - Ctrl+C stops the main loop and logs final counters
//!
//! # Examples
//!
//! ```bash
//! RUST_LOG=uwb_bridge=debug cargo run --release -- config/node2.toml
//! ```

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use uwb_bridge::buffer::{ring_buffer, RING_CAPACITY};
use uwb_bridge::config::Config;
use uwb_bridge::node::{run_radio_worker, Node, NodeIo};
use uwb_bridge::radio::udp::UdpRadio;
use uwb_bridge::radio::{RadioCoordinator, RadioSession};
use uwb_bridge::router::Router;
use uwb_bridge::serial::{pump_uart_input, UartPort};
use uwb_bridge::telemetry::RangeLogger;

/// Configuration used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; the UART carries the telemetry stream
    let (log_writer, _log_guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_writer(log_writer)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("UWB Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;
    info!(
        "Node {} (anchor {}), config {}",
        config.node.address, config.node.anchor_address, config_path
    );

    // Radio bring-up
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let radio = UdpRadio::open(config.radio.bind, config.radio.peers.clone(), events_tx)
        .context("Failed to open radio")?;
    let mut session = RadioSession::new(radio, config.node.address);
    if let Err(e) = session.initialise(&config.radio_settings()) {
        error!("Radio initialisation failed, halting: {}", e);
        return Err(e.into());
    }
    let coordinator = RadioCoordinator::new(session);

    // Buffers between the producers and the main loop
    let (uart_in_tx, uart_in_rx) = ring_buffer(RING_CAPACITY);
    let (radio_in_tx, radio_in_rx) = ring_buffer(RING_CAPACITY);
    let (reports_tx, reports_rx) = mpsc::unbounded_channel();

    let router = Router::new(
        config.node.address,
        config.ranging.calibration_offset_m,
        radio_in_tx,
        reports_tx,
    );
    let worker = tokio::spawn(run_radio_worker(coordinator.clone(), router, events_rx));

    // Autopilot link
    let uart = UartPort::open(&config.serial.port, config.serial.baud_rate)?;
    info!("Autopilot UART opened at: {}", uart.device_path());
    let (uart_reader, uart_writer) = uart.into_split();
    let reader = tokio::spawn(async move {
        if let Err(e) = pump_uart_input(uart_reader, uart_in_tx).await {
            warn!("UART reader stopped: {}", e);
        }
    });

    let range_log = RangeLogger::from_config(&config.telemetry)?;
    let io = NodeIo {
        uart_in: uart_in_rx,
        radio_in: radio_in_rx,
        uart_out: uart_writer,
        reports: reports_rx,
    };
    let node = Node::new(&config, coordinator, io, range_log);

    info!("Press Ctrl+C to exit");
    let stats = node
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!(
        "Shutting down: {} UART packets relayed, {} radio packets forwarded, {} range reports",
        stats.uart_packets, stats.radio_packets, stats.reports_written
    );

    reader.abort();
    worker.abort();
    Ok(())
}
