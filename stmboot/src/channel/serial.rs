//! Serial port channel implementation using the `serialport` crate.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::channel::{ByteChannel, ReceiveBuffer};
use crate::error::{Error, Result};

/// Default baud rate for the factory bootloader link.
pub const DEFAULT_BAUD: u32 = 230_400;

/// Poll interval of the background reader thread.
const READER_POLL: Duration = Duration::from_millis(10);

/// Serial port channel with a background reader thread.
///
/// The reader thread pumps arriving chunks into a [`ReceiveBuffer`]; the
/// consuming side takes exact-size slices out of it. This splits "data
/// arrived" from "caller wants N bytes" the same way the two independent
/// event sources are split on the wire.
pub struct SerialChannel {
    port: Option<Box<dyn serialport::SerialPort>>,
    recv: Arc<ReceiveBuffer>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    name: String,
}

impl SerialChannel {
    /// Open a serial channel at `baud_rate`, 8N1, no flow control.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .timeout(READER_POLL)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()?;

        debug!("Opened {path} at {baud_rate} baud");

        let recv = Arc::new(ReceiveBuffer::new());
        let stop = Arc::new(AtomicBool::new(false));

        let reader_port = port.try_clone()?;
        let reader = {
            let recv = Arc::clone(&recv);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name(format!("stmboot-read-{path}"))
                .spawn(move || read_loop(reader_port, &recv, &stop))?
        };

        Ok(Self {
            port: Some(port),
            recv,
            stop,
            reader: Some(reader),
            name: path.to_string(),
        })
    }

    /// Port name/path this channel was opened on.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        self.port.as_mut().ok_or(Error::ConnectionClosed)
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // Dropping the writer half releases the port; the reader half exits
        // on its next poll.
        self.port.take();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.recv.mark_closed();
    }
}

fn read_loop(
    mut port: Box<dyn serialport::SerialPort>,
    recv: &ReceiveBuffer,
    stop: &AtomicBool,
) {
    let mut chunk = [0u8; 512];
    while !stop.load(Ordering::Relaxed) {
        match port.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                trace!("Received {n} byte(s)");
                recv.push_chunk(&chunk[..n]);
            },
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::Interrupted => {},
            Err(e) => {
                debug!("Reader stopping: {e}");
                break;
            },
        }
    }
    recv.mark_closed();
}

impl ByteChannel for SerialChannel {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        trace!("Writing {} byte(s)", bytes.len());
        let port = self.port_mut()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn read_exact(&mut self, len: usize, timeout: Option<Duration>) -> Result<Vec<u8>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        self.recv.take_exact(len, deadline)
    }

    fn set_lines(&mut self, rts: bool, dtr: bool) -> Result<()> {
        trace!("Setting RTS={rts} DTR={dtr}");
        let port = self.port_mut()?;
        port.write_request_to_send(rts)?;
        port.write_data_terminal_ready(dtr)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        debug!("Closing {}", self.name);
        self.shutdown();
        Ok(())
    }
}

impl Drop for SerialChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Serial port information.
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

/// List all available serial ports.
pub fn available_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().map_err(Error::Serial)?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let (vid, pid, manufacturer, product, serial_number) = match &p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    Some(info.vid),
                    Some(info.pid),
                    info.manufacturer.clone(),
                    info.product.clone(),
                    info.serial_number.clone(),
                ),
                _ => (None, None, None, None, None),
            };

            PortInfo {
                name: p.port_name,
                vid,
                pid,
                manufacturer,
                product,
                serial_number,
            }
        })
        .collect())
}
