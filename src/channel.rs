//! Per-channel view of a mass flow controller.
//!
//! An [`Mfc`] caches the last PV rate it read and the last setpoint it
//! requested. The panel stays the source of truth: the cache only changes
//! through explicit calls and a setpoint is never read back.

use crate::{
    error::Result,
    protocol::{Channel, ValveOverride},
    sync_safe_client::SafeClient,
    transport::Transport,
    units::FlowUnit,
};
use std::fmt;

/// A PV rate reading with the unit it was reported in.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PvRate {
    pub value: f64,
    pub unit: FlowUnit,
}

impl fmt::Display for PvRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// One mass flow controller attached to a panel channel.
#[derive(Debug)]
pub struct Mfc<T: Transport> {
    client: SafeClient<T>,
    channel: Channel,
    pv_rate: PvRate,
    setpoint: Option<f64>,
}

impl<T: Transport> Mfc<T> {
    /// Creates the view and seeds its cache with one unit read and one PV
    /// rate read.
    pub fn new(client: SafeClient<T>, channel: Channel) -> Result<Self> {
        let unit = client.read_units(channel)?;
        let value = client.read_pv_rate(channel)?;
        Ok(Self {
            client,
            channel,
            pv_rate: PvRate { value, unit },
            setpoint: None,
        })
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// The unit of the last PV rate reading.
    pub fn unit(&self) -> FlowUnit {
        self.pv_rate.unit
    }

    /// The last PV rate reading.
    pub fn pv_rate(&self) -> &PvRate {
        &self.pv_rate
    }

    /// The last requested setpoint, if any was requested through this view.
    pub fn setpoint(&self) -> Option<f64> {
        self.setpoint
    }

    /// Reads PV rate and unit from the panel and updates the cache.
    pub fn refresh_pv_rate(&mut self) -> Result<&PvRate> {
        let (value, unit) = self.client.read_pv_rate_with_unit(self.channel)?;
        self.pv_rate = PvRate { value, unit };
        Ok(&self.pv_rate)
    }

    /// Requests a new setpoint and remembers it.
    pub fn set_setpoint(&mut self, value: f64) -> Result<()> {
        self.client.set_output(self.channel, value)?;
        self.setpoint = Some(value);
        Ok(())
    }

    /// Toggles the valve override between normal and closed.
    pub fn toggle_valve(&self) -> Result<ValveOverride> {
        self.client.toggle_valve(self.channel)
    }
}
