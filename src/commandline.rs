use brooks0250_lib::{
    protocol as proto,
    transport::DEFAULT_BAUD_RATE,
    units::{RateTimeUnit, VolumeUnit},
};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::time::Duration;

fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0") // The panel is usually behind a USB-to-RS232 converter.
    }
}

fn parse_channel(s: &str) -> Result<proto::Channel, String> {
    let channel_num = clap_num::number_range(s, proto::Channel::MIN, proto::Channel::MAX)?;
    proto::Channel::try_from(channel_num).map_err(|e| e.to_string())
}

fn parse_volume_unit(s: &str) -> Result<VolumeUnit, String> {
    VolumeUnit::from_name(s).map_err(|e| e.to_string())
}

fn parse_rate_time_unit(s: &str) -> Result<RateTimeUnit, String> {
    RateTimeUnit::from_name(s).map_err(|e| e.to_string())
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Run in daemon mode: continuously poll the PV rate of every channel
    /// and print it to the console.
    #[clap(verbatim_doc_comment)]
    Daemon {
        /// Interval for fetching PV rates (e.g., "10s", "1m")
        #[arg(value_parser = humantime::parse_duration, short, long, default_value = "5sec", verbatim_doc_comment)]
        poll_interval: Duration,
    },

    /// Identify the panel and print its bus address.
    Identify,

    /// Read and display the output (setpoint) of a channel.
    ReadOutput {
        /// Channel number (1 to 4).
        #[arg(value_parser = parse_channel)]
        channel: proto::Channel,
        /// Also read the flow unit of the channel.
        #[arg(short, long)]
        unit: bool,
    },

    /// Set the output (setpoint) of a channel.
    SetOutput {
        /// Channel number (1 to 4).
        #[arg(value_parser = parse_channel)]
        channel: proto::Channel,
        /// New setpoint in the channel's flow unit.
        value: f64,
    },

    /// Read and display the measured PV rate of a channel.
    ReadPvRate {
        /// Channel number (1 to 4).
        #[arg(value_parser = parse_channel)]
        channel: proto::Channel,
        /// Also read the flow unit of the channel.
        #[arg(short, long)]
        unit: bool,
    },

    /// Read and display the flow unit of a channel.
    ReadUnits {
        /// Channel number (1 to 4).
        #[arg(value_parser = parse_channel)]
        channel: proto::Channel,
    },

    /// Set the volume and/or rate time unit of a channel.
    /// Run `list-units` for the accepted names.
    #[clap(verbatim_doc_comment)]
    SetUnits {
        /// Channel number (1 to 4).
        #[arg(value_parser = parse_channel)]
        channel: proto::Channel,
        /// Volume unit name, e.g. "ml" or "scc".
        #[arg(long, value_parser = parse_volume_unit)]
        volume: Option<VolumeUnit>,
        /// Rate time unit name, e.g. "sec" or "min".
        #[arg(long, value_parser = parse_rate_time_unit)]
        time: Option<RateTimeUnit>,
    },

    /// Read and display the valve override state of a channel.
    ReadValve {
        /// Channel number (1 to 4).
        #[arg(value_parser = parse_channel)]
        channel: proto::Channel,
    },

    /// Switch the valve override of a channel between normal and closed.
    ToggleValve {
        /// Channel number (1 to 4).
        #[arg(value_parser = parse_channel)]
        channel: proto::Channel,
    },

    /// Query the full scale of a channel.
    ReadFullScale {
        /// Channel number (1 to 4).
        #[arg(value_parser = parse_channel)]
        channel: proto::Channel,
    },

    /// Read setpoint, PV rate, unit and valve state of every channel.
    Status {
        /// Print the snapshot as YAML.
        #[arg(long)]
        yaml: bool,
    },

    /// List the accepted volume and rate time unit names.
    ListUnits,
}

impl CliCommands {
    /// Whether the command talks to the panel at all.
    pub fn needs_panel(&self) -> bool {
        !matches!(self, CliCommands::ListUnits)
    }
}

const fn about_text() -> &'static str {
    "Brooks 0250 panel CLI - Control mass flow controllers attached to a Brooks 0250 secondary electronics."
}

#[derive(Parser, Debug)]
#[command(name="mfcpanel", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is warnings only.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    /// Serial port device name.
    /// Examples: "/dev/ttyUSB0" (Linux), "COM3" (Windows).
    #[arg(global = true, short, long, default_value_t = default_device_name(), verbatim_doc_comment)]
    pub device: String,

    /// Baud rate for serial communication.
    #[arg(global = true, long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud_rate: u32,

    /// Serial read timeout for a single response line.
    /// Examples: "1s", "500ms".
    #[arg(global = true, long, default_value = "500ms", value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub timeout: Duration,

    /// Settling delay after every frame sent to the panel.
    /// The panel needs this time before it starts answering.
    /// Examples: "500ms", "1s".
    #[arg(global = true, long, default_value = "500ms", value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub delay: Duration,

    #[command(subcommand)]
    pub command: CliCommands,
}

#[cfg(test)]
mod tests {
    use super::*;
    use brooks0250_lib::transport::{DEFAULT_SETTLE_DELAY, DEFAULT_TIMEOUT};
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn parses_channel_commands() {
        let args = CliArgs::try_parse_from(["mfcpanel", "set-output", "2", "12.5"]).unwrap();
        assert_eq!(
            args.command,
            CliCommands::SetOutput {
                channel: proto::Channel::try_from(2).unwrap(),
                value: 12.5
            }
        );
        assert_eq!(args.delay, DEFAULT_SETTLE_DELAY);
        assert_eq!(args.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn rejects_channel_out_of_range() {
        assert!(CliArgs::try_parse_from(["mfcpanel", "read-output", "0"]).is_err());
        assert!(CliArgs::try_parse_from(["mfcpanel", "read-output", "5"]).is_err());
    }

    #[test]
    fn parses_unit_names() {
        let args = CliArgs::try_parse_from([
            "mfcpanel", "set-units", "1", "--volume", "ml", "--time", "sec",
        ])
        .unwrap();
        assert_eq!(
            args.command,
            CliCommands::SetUnits {
                channel: proto::Channel::try_from(1).unwrap(),
                volume: Some(VolumeUnit::Ml),
                time: Some(RateTimeUnit::Sec),
            }
        );
        assert!(
            CliArgs::try_parse_from(["mfcpanel", "set-units", "1", "--volume", "bushel"]).is_err()
        );
    }

    #[test]
    fn global_options_after_subcommand() {
        let args =
            CliArgs::try_parse_from(["mfcpanel", "status", "--delay", "100ms", "-d", "/dev/ttyS1"])
                .unwrap();
        assert_eq!(args.delay, Duration::from_millis(100));
        assert_eq!(args.device, "/dev/ttyS1");
        assert_eq!(args.command, CliCommands::Status { yaml: false });
    }
}
