//! # Serial Communication Module
//!
//! UART link to the autopilot.
//!
//! This module handles:
//! - Opening the serial port (8N1, no flow control)
//! - Splitting it into a reader feeding the UART ring buffer and a writer
//!   used by the main loop
//! - Forwarding PPRZ packets to the autopilot

pub mod port_trait;

use tokio::io::{AsyncRead, AsyncReadExt, ReadHalf};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

use crate::buffer::RingProducer;
use crate::error::{Result, UwbBridgeError};

pub use port_trait::{SerialPortIO, TokioSerialPort};

/// Default autopilot link speed
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Port name that selects auto-detection over [`DEFAULT_DEVICE_PATHS`]
pub const AUTO_DETECT: &str = "auto";

/// Device paths tried by auto-detection, in order
const DEFAULT_DEVICE_PATHS: &[&str] = &["/dev/ttyUSB0", "/dev/ttyACM0", "/dev/ttyS0"];

/// Size of a single read from the port
const READ_CHUNK: usize = 64;

/// Opened autopilot UART
pub struct UartPort {
    port: SerialStream,
    device_path: String,
}

impl std::fmt::Debug for UartPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UartPort")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl UartPort {
    /// Open `port` at `baud_rate`, or probe the usual device paths if `port`
    /// is `"auto"`
    ///
    /// # Errors
    ///
    /// Returns error if no candidate path could be opened
    pub fn open(port: &str, baud_rate: u32) -> Result<Self> {
        if port == AUTO_DETECT {
            Self::open_with_paths(DEFAULT_DEVICE_PATHS, baud_rate)
        } else {
            Self::open_with_paths(&[port], baud_rate)
        }
    }

    /// Open the first path in `paths` that works
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyUSB0"])
    /// * `baud_rate` - Line speed
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened autopilot UART at {} ({} baud)", path, baud_rate);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(UwbBridgeError::SerialPortNotFound(paths.join(", ")))
    }

    fn open_port(path: &str, baud_rate: u32) -> Result<SerialStream> {
        tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| UwbBridgeError::Serial(format!("Failed to open {}: {}", path, e)))
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Split into the receive half and a [`SerialPortIO`] writer
    pub fn into_split(self) -> (ReadHalf<SerialStream>, TokioSerialPort) {
        let (reader, writer) = tokio::io::split(self.port);
        (reader, TokioSerialPort::new(writer))
    }
}

/// Copy bytes from `reader` into the UART ring buffer until end of stream
///
/// Bytes that do not fit are dropped; the ring buffer counts them. Returns
/// the number of bytes read.
///
/// # Errors
///
/// Returns error if the underlying read fails
pub async fn pump_uart_input<R>(mut reader: R, mut uart_in: RingProducer) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK];
    let mut total: u64 = 0;

    loop {
        let n = reader
            .read(&mut chunk)
            .await
            .map_err(|e| UwbBridgeError::Serial(format!("UART read failed: {}", e)))?;
        if n == 0 {
            info!("UART input closed after {} bytes", total);
            return Ok(total);
        }

        total += n as u64;
        let stored = uart_in.push_slice(&chunk[..n]);
        if stored < n {
            warn!(
                "UART ring buffer full, dropped {} bytes ({} total)",
                n - stored,
                uart_in.dropped()
            );
        }
    }
}
