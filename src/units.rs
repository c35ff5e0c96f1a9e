//! Unit code tables of the Brooks 0250 panel.
//!
//! The panel reports and accepts flow units as numeric codes: a two digit
//! volume (quantity) code for parameter `P04` and a one digit rate time code
//! for parameter `P10`. Both tables are fixed; every code maps to exactly one
//! name and every name to exactly one code. Lookups are exact and
//! case-sensitive.
//!
//! ```
//! use brooks0250_lib::units::{FlowUnit, RateTimeUnit, VolumeUnit};
//!
//! assert_eq!(VolumeUnit::from_code("00").unwrap(), VolumeUnit::Ml);
//! assert_eq!(RateTimeUnit::from_name("min").unwrap().code(), "2");
//!
//! let unit: FlowUnit = "g/cc/sec".parse().unwrap();
//! assert_eq!(unit.volume, VolumeUnit::GPerCc);
//! assert_eq!(unit.to_string(), "g/cc/sec");
//! ```

use std::fmt;
use std::str::FromStr;

/// A unit code or unit name outside of the fixed tables.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitLookupError {
    #[error("Unknown volume unit code '{0}'")]
    UnknownVolumeCode(String),
    #[error("Unknown volume unit name '{0}'")]
    UnknownVolumeName(String),
    #[error("Unknown rate time code '{0}'")]
    UnknownRateTimeCode(String),
    #[error("Unknown rate time name '{0}'")]
    UnknownRateTimeName(String),
    #[error("Flow unit '{0}' is not of the form 'volume/time'")]
    MalformedFlowUnit(String),
}

/// Declares a unit enum together with its two lookup directions.
///
/// The code map and the name map are separate `match` tables so that neither
/// direction is derived from the other at runtime.
macro_rules! unit_table {
    (
        $(#[$meta:meta])*
        pub enum $ty:ident($code_err:ident, $name_err:ident) {
            $($variant:ident = $code:literal => $name:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $ty {
            $($variant,)+
        }

        impl $ty {
            /// Every unit of the table, ordered by code.
            pub const ALL: &'static [$ty] = &[$($ty::$variant,)+];

            /// Looks up a unit by the code used on the wire.
            pub fn from_code(code: &str) -> Result<Self, UnitLookupError> {
                match code {
                    $($code => Ok($ty::$variant),)+
                    _ => Err(UnitLookupError::$code_err(code.to_string())),
                }
            }

            /// Looks up a unit by its human readable name.
            pub fn from_name(name: &str) -> Result<Self, UnitLookupError> {
                match name {
                    $($name => Ok($ty::$variant),)+
                    _ => Err(UnitLookupError::$name_err(name.to_string())),
                }
            }

            /// The code used on the wire.
            pub const fn code(&self) -> &'static str {
                match self {
                    $($ty::$variant => $code,)+
                }
            }

            /// The human readable name.
            pub const fn name(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = UnitLookupError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_name(s)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        #[cfg(feature = "serde")]
        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.name())
            }
        }

        #[cfg(feature = "serde")]
        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let name = <String as serde::Deserialize>::deserialize(deserializer)?;
                Self::from_name(&name).map_err(serde::de::Error::custom)
            }
        }
    };
}

unit_table! {
    /// Volume (quantity) unit, parameter `P04`.
    pub enum VolumeUnit(UnknownVolumeCode, UnknownVolumeName) {
        Ml = "00" => "ml",
        Mls = "01" => "mls",
        Mln = "02" => "mln",
        L = "03" => "l",
        Ls = "04" => "ls",
        Ln = "05" => "ln",
        Cm3 = "06" => "cm^3",
        Cm3s = "07" => "cm^3s",
        Cm3n = "08" => "cm^3n",
        M3 = "09" => "m^3",
        M3s = "10" => "m^3s",
        M3n = "11" => "m^3n",
        G = "12" => "g",
        Lb = "13" => "lb",
        Kg = "14" => "kg",
        Ft3 = "15" => "ft^3",
        Ft3s = "16" => "ft^3s",
        Ft3n = "17" => "ft^3n",
        Scc = "18" => "scc",
        Sl = "19" => "sl",
        Bar = "20" => "bar",
        Mbar = "21" => "mbar",
        Psi = "22" => "psi",
        KPa = "23" => "kPa",
        Torr = "24" => "Torr",
        Atm = "25" => "atm",
        Volt = "26" => "Volt",
        MilliAmp = "27" => "mA",
        DegC = "28" => "oC",
        DegK = "29" => "oK",
        DegR = "30" => "oR",
        DegF = "31" => "oF",
        GPerCc = "32" => "g/cc",
        Sg = "33" => "sg",
        Percent = "34" => "%",
        LbPerIn3 = "35" => "lb/in^3",
        LbPerFt3 = "36" => "lb/ft^3",
        LbPerGal = "37" => "lb/gal",
        KgPerM3 = "38" => "kg/m^3",
        GPerMl = "39" => "g/ml",
        KgPerL = "40" => "kg/l",
        GPerL = "41" => "g/l",
    }
}

unit_table! {
    /// Rate time base, parameter `P10`.
    pub enum RateTimeUnit(UnknownRateTimeCode, UnknownRateTimeName) {
        None = "0" => "none",
        Sec = "1" => "sec",
        Min = "2" => "min",
        Hrs = "3" => "hrs",
        Day = "4" => "day",
    }
}

impl RateTimeUnit {
    /// The value written to `P10`, which the panel expects as two digits.
    pub fn register_value(&self) -> String {
        format!("{:0>2}", self.code())
    }
}

/// Looks up the name of a volume unit code.
pub fn decode_volume_unit(code: &str) -> Result<&'static str, UnitLookupError> {
    VolumeUnit::from_code(code).map(|unit| unit.name())
}

/// Looks up the code of a volume unit name.
pub fn encode_volume_unit(name: &str) -> Result<&'static str, UnitLookupError> {
    VolumeUnit::from_name(name).map(|unit| unit.code())
}

/// Looks up the name of a rate time code.
pub fn decode_rate_time(code: &str) -> Result<&'static str, UnitLookupError> {
    RateTimeUnit::from_code(code).map(|unit| unit.name())
}

/// Looks up the code of a rate time name.
pub fn encode_rate_time(name: &str) -> Result<&'static str, UnitLookupError> {
    RateTimeUnit::from_name(name).map(|unit| unit.code())
}

/// The output unit of a channel, displayed as `volume/time` (e.g. `ml/min`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowUnit {
    pub volume: VolumeUnit,
    pub time: RateTimeUnit,
}

impl FlowUnit {
    pub const fn new(volume: VolumeUnit, time: RateTimeUnit) -> Self {
        Self { volume, time }
    }
}

impl fmt::Display for FlowUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.volume, self.time)
    }
}

impl FromStr for FlowUnit {
    type Err = UnitLookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Volume names may contain '/' themselves (`g/cc`), time names never do.
        let (volume, time) = s
            .rsplit_once('/')
            .ok_or_else(|| UnitLookupError::MalformedFlowUnit(s.to_string()))?;
        Ok(Self::new(
            VolumeUnit::from_name(volume)?,
            RateTimeUnit::from_name(time)?,
        ))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for FlowUnit {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn volume_table_is_complete() {
        assert_eq!(VolumeUnit::ALL.len(), 42);
        for (index, unit) in VolumeUnit::ALL.iter().enumerate() {
            assert_eq!(unit.code(), format!("{index:02}"));
        }
    }

    #[test]
    fn volume_round_trip_is_stable() {
        for unit in VolumeUnit::ALL {
            let name = decode_volume_unit(unit.code()).unwrap();
            let code = encode_volume_unit(name).unwrap();
            assert_eq!(decode_volume_unit(code).unwrap(), name);
            assert_eq!(code, unit.code());
        }
    }

    #[test]
    fn rate_time_round_trip_is_stable() {
        assert_eq!(RateTimeUnit::ALL.len(), 5);
        for unit in RateTimeUnit::ALL {
            let name = decode_rate_time(unit.code()).unwrap();
            assert_eq!(encode_rate_time(name).unwrap(), unit.code());
        }
    }

    #[test]
    fn known_entries() {
        assert_eq!(decode_volume_unit("06").unwrap(), "cm^3");
        assert_eq!(decode_volume_unit("34").unwrap(), "%");
        assert_eq!(decode_volume_unit("41").unwrap(), "g/l");
        assert_eq!(encode_volume_unit("Torr").unwrap(), "24");
        assert_eq!(decode_rate_time("3").unwrap(), "hrs");
        assert_eq!(encode_rate_time("day").unwrap(), "4");
    }

    #[test]
    fn lookups_are_exact() {
        assert_matches!(
            decode_volume_unit("42"),
            Err(UnitLookupError::UnknownVolumeCode(code)) if code == "42"
        );
        assert_matches!(
            decode_volume_unit("0"),
            Err(UnitLookupError::UnknownVolumeCode(..))
        );
        assert_matches!(
            encode_volume_unit("ML"),
            Err(UnitLookupError::UnknownVolumeName(..))
        );
        assert_matches!(
            encode_volume_unit("torr"),
            Err(UnitLookupError::UnknownVolumeName(..))
        );
        assert_matches!(
            decode_rate_time("00"),
            Err(UnitLookupError::UnknownRateTimeCode(..))
        );
        assert_matches!(
            encode_rate_time("Sec"),
            Err(UnitLookupError::UnknownRateTimeName(..))
        );
    }

    #[test]
    fn rate_time_register_value_is_two_digits() {
        assert_eq!(RateTimeUnit::None.register_value(), "00");
        assert_eq!(RateTimeUnit::Sec.register_value(), "01");
        assert_eq!(RateTimeUnit::Day.register_value(), "04");
    }

    #[test]
    fn flow_unit_display_and_parse() {
        let unit = FlowUnit::new(VolumeUnit::Ml, RateTimeUnit::Min);
        assert_eq!(unit.to_string(), "ml/min");
        assert_eq!("ml/min".parse::<FlowUnit>().unwrap(), unit);

        let unit: FlowUnit = "lb/ft^3/hrs".parse().unwrap();
        assert_eq!(unit, FlowUnit::new(VolumeUnit::LbPerFt3, RateTimeUnit::Hrs));

        assert_matches!(
            "ml".parse::<FlowUnit>(),
            Err(UnitLookupError::MalformedFlowUnit(..))
        );
        assert_matches!(
            "ml/week".parse::<FlowUnit>(),
            Err(UnitLookupError::UnknownRateTimeName(..))
        );
    }
}
