//! Errors of the panel clients.
//!
//! [`Error`] wraps the protocol errors together with the failures of the
//! byte channel underneath. Nothing is retried; every error is handed to the
//! caller as is.

use crate::{protocol as proto, units::UnitLookupError};

/// Represents all possible errors of a panel exchange.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Wraps `proto::Error`.
    #[error(transparent)]
    ProtocolError(#[from] proto::Error),

    /// Write, read or timeout failure of the transport.
    #[error("Transport error: {0}")]
    TransportError(#[from] std::io::Error),

    /// Wraps `tokio_serial::Error`, e.g. the serial port cannot be opened.
    #[cfg(feature = "serial")]
    #[error(transparent)]
    SerialError(#[from] tokio_serial::Error),

    /// A previous holder of a shared panel panicked.
    #[error("Shared panel is poisoned")]
    Poisoned,
}

impl From<proto::FrameError> for Error {
    fn from(err: proto::FrameError) -> Self {
        Error::ProtocolError(err.into())
    }
}

impl From<UnitLookupError> for Error {
    fn from(err: UnitLookupError) -> Self {
        Error::ProtocolError(err.into())
    }
}

impl Error {
    /// A unit code or name was outside of the unit tables.
    pub fn is_lookup(&self) -> bool {
        matches!(self, Error::ProtocolError(proto::Error::Lookup(_)))
    }

    /// A response line could not be decoded.
    pub fn is_frame(&self) -> bool {
        matches!(self, Error::ProtocolError(proto::Error::Frame(_)))
    }

    /// The byte channel failed, timeouts included.
    pub fn is_transport(&self) -> bool {
        match self {
            Error::TransportError(_) => true,
            #[cfg(feature = "serial")]
            Error::SerialError(_) => true,
            _ => false,
        }
    }

    /// The transport gave up waiting for a response line.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::TransportError(err) if err.kind() == std::io::ErrorKind::TimedOut)
    }
}

/// The result type of the panel clients.
pub type Result<T> = std::result::Result<T, Error>;
