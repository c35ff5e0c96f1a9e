//! Frame codec and addressing of the Brooks 0250 ASCII protocol.
//!
//! Commands are single ASCII lines terminated by a carriage return:
//!
//! * query: `AZ{address}.0{register}{verb}?\r`
//! * write: `AZ{address}.0{register}{verb}={value}\r`
//! * identification: `AZI\r`
//!
//! Responses are newline terminated, comma separated lines. Which field holds
//! the value depends on the verb, see [`Verb::response_field`].
//!
//! Registers are never chosen by the caller. Every channel owns two of them,
//! `channel * 2` for setpoint, valve override and full scale, and
//! `channel * 2 - 1` for units and the PV rate; [`Register::for_verb`] picks
//! the right one.

use crate::units::{FlowUnit, RateTimeUnit, UnitLookupError, VolumeUnit};
use std::fmt;
use std::ops::Deref;

/// Number of flow channels a panel multiplexes.
pub const NUMBER_OF_CHANNELS: u8 = 4;

/// The identification frame. It is the only frame sent without a bus address.
pub const IDENTIFY_FRAME: &str = "AZI\r";

/// Field of the identification response holding the bus address.
pub const IDENTIFY_RESPONSE_FIELD: usize = 1;

/// Malformed response lines.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Response is not valid UTF-8")]
    InvalidEncoding,
    #[error("Response has no field {index}, only {available} fields received")]
    MissingField { index: usize, available: usize },
    #[error("Response field '{0}' is not a number")]
    InvalidNumber(String),
    #[error("Invalid bus address '{0}'")]
    InvalidAddress(String),
}

/// Errors of the protocol layer. None of them involve I/O.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Lookup(#[from] UnitLookupError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("Channel {0} out of range, expected 1 to {max}", max = NUMBER_OF_CHANNELS)]
    ChannelOutOfRange(u8),
}

/// A flow channel of the panel, `1..=NUMBER_OF_CHANNELS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel(u8);

impl Channel {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = NUMBER_OF_CHANNELS;

    /// All channels of the panel in ascending order.
    pub fn all() -> impl Iterator<Item = Channel> {
        (Self::MIN..=Self::MAX).map(Channel)
    }
}

impl TryFrom<u8> for Channel {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::ChannelOutOfRange(value))
        }
    }
}

impl Deref for Channel {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Channel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

/// A parameter slot inside the panel's addressing scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register(u8);

impl Register {
    /// Register `channel * 2`.
    pub const fn even(channel: Channel) -> Self {
        Self(channel.0 * 2)
    }

    /// Register `channel * 2 - 1`.
    pub const fn odd(channel: Channel) -> Self {
        Self(channel.0 * 2 - 1)
    }

    /// The register of `channel` that `verb` operates on.
    pub const fn for_verb(channel: Channel, verb: Verb) -> Self {
        if verb.uses_odd_register() {
            Self::odd(channel)
        } else {
            Self::even(channel)
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Channel scoped commands understood by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// `P01`, output (setpoint).
    Output,
    /// `P04`, volume unit.
    VolumeUnit,
    /// `P10`, rate time unit.
    RateTimeUnit,
    /// `P29`, valve override.
    ValveOverride,
    /// `P09`, full scale.
    FullScale,
    /// `K`, measured PV rate.
    PvRate,
}

impl Verb {
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Verb::Output => "P01",
            Verb::VolumeUnit => "P04",
            Verb::RateTimeUnit => "P10",
            Verb::ValveOverride => "P29",
            Verb::FullScale => "P09",
            Verb::PvRate => "K",
        }
    }

    /// Zero based index of the response field carrying the value.
    pub const fn response_field(&self) -> usize {
        match self {
            Verb::PvRate => 6,
            Verb::Output
            | Verb::VolumeUnit
            | Verb::RateTimeUnit
            | Verb::ValveOverride
            | Verb::FullScale => 4,
        }
    }

    const fn uses_odd_register(&self) -> bool {
        matches!(self, Verb::VolumeUnit | Verb::RateTimeUnit | Verb::PvRate)
    }

    // `K` is a bare command, the panel rejects `K?`.
    const fn query_suffix(&self) -> &'static str {
        match self {
            Verb::PvRate => "",
            _ => "?",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// The bus address of a panel, learned from the identification response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Address {
    type Error = FrameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(value.to_string()))
        } else {
            Err(FrameError::InvalidAddress(value.to_string()))
        }
    }
}

impl Deref for Address {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// State of a channel's valve override (VOR).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValveOverride {
    /// `0`, the valve follows the controller.
    Normal,
    /// `1`, the valve is forced closed.
    Closed,
    /// Any other value reported by the panel.
    Other(String),
}

impl ValveOverride {
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "0" => ValveOverride::Normal,
            "1" => ValveOverride::Closed,
            other => ValveOverride::Other(other.to_string()),
        }
    }

    pub fn as_raw(&self) -> &str {
        match self {
            ValveOverride::Normal => "0",
            ValveOverride::Closed => "1",
            ValveOverride::Other(raw) => raw,
        }
    }

    /// The state a toggle switches to. Unknown states fall back to normal.
    pub fn toggled(&self) -> Self {
        match self {
            ValveOverride::Normal => ValveOverride::Closed,
            ValveOverride::Closed | ValveOverride::Other(_) => ValveOverride::Normal,
        }
    }
}

impl fmt::Display for ValveOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValveOverride::Normal => f.write_str("normal"),
            ValveOverride::Closed => f.write_str("closed"),
            ValveOverride::Other(raw) => write!(f, "unknown ({raw})"),
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ValveOverride {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An encoded command line, carriage return included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame(String);

impl CommandFrame {
    pub fn identify() -> Self {
        Self(IDENTIFY_FRAME.to_string())
    }

    /// Reads the parameter `verb` of `channel`.
    pub fn query(address: &Address, channel: Channel, verb: Verb) -> Self {
        build_frame(address, Register::for_verb(channel, verb), verb, None)
    }

    /// Writes `value` to the parameter `verb` of `channel`.
    pub fn write(address: &Address, channel: Channel, verb: Verb, value: &str) -> Self {
        build_frame(address, Register::for_verb(channel, verb), verb, Some(value))
    }

    pub fn set_output(address: &Address, channel: Channel, value: f64) -> Self {
        Self::write(address, channel, Verb::Output, &value.to_string())
    }

    pub fn set_valve_override(address: &Address, channel: Channel, state: &ValveOverride) -> Self {
        Self::write(address, channel, Verb::ValveOverride, state.as_raw())
    }

    /// The write frames for a unit change, volume first. Empty if neither
    /// unit is given.
    pub fn set_units(
        address: &Address,
        channel: Channel,
        volume: Option<VolumeUnit>,
        time: Option<RateTimeUnit>,
    ) -> Vec<Self> {
        let volume = volume.map(|unit| Self::write(address, channel, Verb::VolumeUnit, unit.code()));
        let time = time.map(|unit| {
            Self::write(address, channel, Verb::RateTimeUnit, &unit.register_value())
        });
        volume.into_iter().chain(time).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_debug())
    }
}

/// Builds an addressed command frame.
///
/// With a `value` the frame writes the parameter, without it queries it.
pub fn build_frame(
    address: &Address,
    register: Register,
    verb: Verb,
    value: Option<&str>,
) -> CommandFrame {
    let mnemonic = verb.mnemonic();
    CommandFrame(match value {
        Some(value) => format!("AZ{address}.0{register}{mnemonic}={value}\r"),
        None => format!("AZ{address}.0{register}{mnemonic}{}\r", verb.query_suffix()),
    })
}

/// Returns field `field_index` (zero based) of a response line with
/// surrounding whitespace removed.
pub fn parse_response(raw: &[u8], field_index: usize) -> Result<&str, FrameError> {
    let text = std::str::from_utf8(raw).map_err(|_| FrameError::InvalidEncoding)?;
    text.split(',')
        .nth(field_index)
        .map(str::trim)
        .ok_or_else(|| FrameError::MissingField {
            index: field_index,
            available: text.split(',').count(),
        })
}

/// Extracts the bus address from an identification response.
pub fn decode_address(raw: &[u8]) -> Result<Address, FrameError> {
    Address::try_from(parse_response(raw, IDENTIFY_RESPONSE_FIELD)?)
}

/// Extracts the value field of a response to `verb`.
pub fn decode_field(raw: &[u8], verb: Verb) -> Result<&str, FrameError> {
    parse_response(raw, verb.response_field())
}

/// Extracts the value field of a response to `verb` as a number.
pub fn decode_number(raw: &[u8], verb: Verb) -> Result<f64, FrameError> {
    let field = decode_field(raw, verb)?;
    field
        .parse()
        .map_err(|_| FrameError::InvalidNumber(field.to_string()))
}

/// Combines the responses of a `P04` and a `P10` query.
pub fn decode_flow_unit(volume_raw: &[u8], time_raw: &[u8]) -> Result<FlowUnit, Error> {
    let volume = VolumeUnit::from_code(decode_field(volume_raw, Verb::VolumeUnit)?)?;
    let time = RateTimeUnit::from_code(decode_field(time_raw, Verb::RateTimeUnit)?)?;
    Ok(FlowUnit::new(volume, time))
}

/// Extracts the state from a response to a `P29` query.
pub fn decode_valve_override(raw: &[u8]) -> Result<ValveOverride, FrameError> {
    Ok(ValveOverride::from_raw(decode_field(raw, Verb::ValveOverride)?))
}
