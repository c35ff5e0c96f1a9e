//! Thread-safe blocking client for the Brooks 0250 secondary electronics.
//!
//! A [`Panel`] must never see two exchanges interleaved: a second command
//! sent before the first response was read desynchronizes the line.
//! [`SafeClient`] shares one panel behind a mutex and holds the lock for each
//! complete request/response unit, so clones can be handed to several
//! threads.
//!
//! ## Example
//!
//! ```no_run
//! use brooks0250_lib::{
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
//!     let worker = {
//!         let client = client.clone();
//!         std::thread::spawn(move || client.read_pv_rate(Channel::try_from(2).unwrap()))
//!     };
//!     client.set_output(Channel::try_from(1)?, 10.0)?;
//!     println!("PV rate of channel 2: {}", worker.join().unwrap()?);
//!
//!     Ok(())
//! }
//! ```

use crate::{
    error::{Error, Result},
    protocol::{self as proto, Channel},
    sync_client::Panel,
    transport::Transport,
    units::{FlowUnit, RateTimeUnit, VolumeUnit},
};
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared, serialized access to one [`Panel`].
#[derive(Debug)]
pub struct SafeClient<T: Transport> {
    panel: Arc<Mutex<Panel<T>>>,
}

impl<T: Transport> Clone for SafeClient<T> {
    fn clone(&self) -> Self {
        Self {
            panel: self.panel.clone(),
        }
    }
}

impl<T: Transport> SafeClient<T> {
    /// Creates a new `SafeClient` from an identified panel.
    pub fn new(panel: Panel<T>) -> Self {
        Self {
            panel: Arc::new(Mutex::new(panel)),
        }
    }

    /// Creates a new `SafeClient` from a shared panel.
    pub fn from_shared(panel: Arc<Mutex<Panel<T>>>) -> Self {
        Self { panel }
    }

    /// Clones the shared panel.
    pub fn clone_shared(&self) -> Arc<Mutex<Panel<T>>> {
        self.panel.clone()
    }

    /// Locks the panel for a sequence of exchanges that must not be
    /// interleaved with other callers.
    pub fn lock(&self) -> Result<MutexGuard<'_, Panel<T>>> {
        self.panel.lock().map_err(|_| Error::Poisoned)
    }

    /// The bus address reported by the panel.
    pub fn address(&self) -> Result<proto::Address> {
        Ok(self.lock()?.address().clone())
    }

    /// Sets the output (setpoint) of `channel`.
    pub fn set_output(&self, channel: Channel, value: f64) -> Result<()> {
        self.lock()?.set_output(channel, value)
    }

    /// Reads the output (setpoint) of `channel`.
    pub fn read_output(&self, channel: Channel) -> Result<f64> {
        self.lock()?.read_output(channel)
    }

    /// Reads the output of `channel` and its unit without releasing the lock.
    pub fn read_output_with_unit(&self, channel: Channel) -> Result<(f64, FlowUnit)> {
        self.lock()?.read_output_with_unit(channel)
    }

    /// Reads the flow unit of `channel`.
    pub fn read_units(&self, channel: Channel) -> Result<FlowUnit> {
        self.lock()?.read_units(channel)
    }

    /// Sets the volume and/or rate time unit of `channel`.
    pub fn set_units(
        &self,
        channel: Channel,
        volume: Option<VolumeUnit>,
        time: Option<RateTimeUnit>,
    ) -> Result<()> {
        self.lock()?.set_units(channel, volume, time)
    }

    /// Sets the units of `channel` by name. Unknown names send nothing.
    pub fn set_units_by_name(
        &self,
        channel: Channel,
        volume: Option<&str>,
        time: Option<&str>,
    ) -> Result<()> {
        self.lock()?.set_units_by_name(channel, volume, time)
    }

    /// Reads the measured PV rate of `channel`.
    pub fn read_pv_rate(&self, channel: Channel) -> Result<f64> {
        self.lock()?.read_pv_rate(channel)
    }

    /// Reads the PV rate of `channel` and its unit without releasing the lock.
    pub fn read_pv_rate_with_unit(&self, channel: Channel) -> Result<(f64, FlowUnit)> {
        self.lock()?.read_pv_rate_with_unit(channel)
    }

    /// Reads the valve override state of `channel`.
    pub fn read_valve_state(&self, channel: Channel) -> Result<proto::ValveOverride> {
        self.lock()?.read_valve_state(channel)
    }

    /// Toggles the valve override of `channel`.
    ///
    /// The lock is held across the read and the write, so no other caller
    /// of this client can change the state in between.
    pub fn toggle_valve(&self, channel: Channel) -> Result<proto::ValveOverride> {
        self.lock()?.toggle_valve(channel)
    }

    /// Queries the full scale of `channel` and discards the response.
    pub fn read_full_scale(&self, channel: Channel) -> Result<()> {
        self.lock()?.read_full_scale(channel)
    }
}
