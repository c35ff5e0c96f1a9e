//! A library for controlling Brooks 0250 series secondary electronics.
//!
//! The 0250 is a panel that multiplexes up to four mass flow controllers onto
//! one RS-232 line and speaks a simple ASCII request/response protocol. Each
//! channel has a setpoint, a measured PV rate, a flow unit and a valve
//! override.
//!
//! The crate is layered like this:
//!
//! 1.  **Protocol**: the unit code tables ([`units`]) and the frame codec
//!     ([`protocol`]). Pure functions, no I/O.
//! 2.  **Clients**: [`sync_client::Panel`] (blocking, over any
//!     [`transport::Transport`]) and [`tokio_async_client::AsyncPanel`]
//!     (`async`, over any `tokio` stream). Both identify the panel when they
//!     are created and then expose the channel operations.
//! 3.  **Safe Clients**: [`sync_safe_client::SafeClient`] and
//!     [`tokio_async_safe_client::SafeClient`] share one panel between
//!     threads or tasks and serialize the exchanges.
//! 4.  **Channel views**: [`channel::Mfc`] caches the last readings of one
//!     channel.
//!
//! ## Quick Start
//!
//! ```no_run
//! use brooks0250_lib::{
//!     channel::Mfc,
//!     protocol::Channel,
//!     sync_client::Panel,
//!     sync_safe_client::SafeClient,
//!     transport::{SerialTransport, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT},
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = SerialTransport::open("/dev/ttyUSB0", DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT)?;
//!     let client = SafeClient::new(Panel::new(transport)?);
//!
//!     let mut mfc = Mfc::new(client, Channel::try_from(1)?)?;
//!     mfc.set_setpoint(20.0)?;
//!     println!("PV rate: {}", mfc.refresh_pv_rate()?);
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod protocol;
pub mod sync_client;
pub mod transport;
pub mod units;

#[cfg_attr(docsrs, doc(cfg(feature = "safe-client-sync")))]
#[cfg(feature = "safe-client-sync")]
pub mod sync_safe_client;

#[cfg_attr(docsrs, doc(cfg(feature = "safe-client-sync")))]
#[cfg(feature = "safe-client-sync")]
pub mod channel;

#[cfg_attr(docsrs, doc(cfg(feature = "tokio-async")))]
#[cfg(feature = "tokio-async")]
pub mod tokio_async_client;

#[cfg_attr(docsrs, doc(cfg(feature = "safe-client-async")))]
#[cfg(feature = "safe-client-async")]
pub mod tokio_async_safe_client;
