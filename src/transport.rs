//! The byte channel between the clients and the panel.
//!
//! [`Transport`] is everything the blocking [`Panel`](crate::sync_client::Panel)
//! needs: write a frame, read one response line, and drain whatever lines are
//! still pending. [`StreamTransport`] implements it for any blocking
//! `Read + Write` stream whose reads time out, such as a serial port opened
//! with [`SerialTransport::open`].

use std::io::{self, BufRead, BufReader, Read, Write};
use std::time::Duration;

/// Baud rate of the panel's RS-232 port.
pub const DEFAULT_BAUD_RATE: u32 = 9600;
/// How long a read waits for a response line.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);
/// Processing time the panel needs after each received frame.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// What happens to the responses of a batch of frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Read one line per sent frame, in sending order.
    Read,
    /// Read and discard every pending line.
    Purge,
}

/// A line oriented byte channel to the panel.
pub trait Transport {
    /// Writes all bytes of a frame.
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Reads one line including its terminator. Fails with
    /// [`io::ErrorKind::TimedOut`] if no complete line arrives in time.
    fn read_line(&mut self) -> io::Result<Vec<u8>>;

    /// Reads lines until the channel stays quiet for one timeout.
    fn read_all_pending(&mut self) -> io::Result<Vec<Vec<u8>>>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }

    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        (**self).read_line()
    }

    fn read_all_pending(&mut self) -> io::Result<Vec<Vec<u8>>> {
        (**self).read_all_pending()
    }
}

/// [`Transport`] over a blocking stream with read timeouts.
#[derive(Debug)]
pub struct StreamTransport<S: Read + Write> {
    stream: BufReader<S>,
}

impl<S: Read + Write> StreamTransport<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Returns the underlying stream. Buffered but unread input is lost.
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stream = self.stream.get_mut();
        stream.write_all(bytes)?;
        stream.flush()
    }

    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        let mut line = Vec::new();
        // A line cut short by the timeout is dropped together with the error.
        match self.stream.read_until(b'\n', &mut line)? {
            0 => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream closed while waiting for a response",
            )),
            _ => Ok(line),
        }
    }

    fn read_all_pending(&mut self) -> io::Result<Vec<Vec<u8>>> {
        let mut lines = Vec::new();
        loop {
            let mut line = Vec::new();
            match self.stream.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => lines.push(line),
                Err(err) if err.kind() == io::ErrorKind::TimedOut => {
                    if !line.is_empty() {
                        lines.push(line);
                    }
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(lines)
    }
}

#[cfg(feature = "serial")]
pub use self::serial::*;

#[cfg(feature = "serial")]
mod serial {
    use super::StreamTransport;
    use std::time::Duration;

    /// The parity used for serial communication.
    pub const PARITY: &tokio_serial::Parity = &tokio_serial::Parity::None;
    /// The number of stop bits used for serial communication.
    pub const STOP_BITS: &tokio_serial::StopBits = &tokio_serial::StopBits::One;
    /// The number of data bits used for serial communication.
    pub const DATA_BITS: &tokio_serial::DataBits = &tokio_serial::DataBits::Eight;

    /// Creates a `tokio_serial::SerialPortBuilder` with the panel's line settings.
    ///
    /// # Arguments
    ///
    /// * `device` - The path to the serial port device (e.g., `/dev/ttyUSB0`).
    /// * `baud_rate` - The baud rate for the serial communication.
    pub fn serial_port_builder(device: &str, baud_rate: u32) -> tokio_serial::SerialPortBuilder {
        tokio_serial::new(device, baud_rate)
            .parity(*PARITY)
            .stop_bits(*STOP_BITS)
            .data_bits(*DATA_BITS)
            .flow_control(tokio_serial::FlowControl::None)
    }

    /// A blocking serial port transport.
    pub type SerialTransport = StreamTransport<Box<dyn tokio_serial::SerialPort>>;

    impl SerialTransport {
        /// Opens `device` with the panel's line settings. Every read waits at
        /// most `timeout`.
        pub fn open(
            device: &str,
            baud_rate: u32,
            timeout: Duration,
        ) -> Result<Self, tokio_serial::Error> {
            let port = serial_port_builder(device, baud_rate)
                .timeout(timeout)
                .open()?;
            Ok(Self::new(port))
        }
    }
}
