//! Brooks 0250 panel CLI
//!
//! A command-line interface (CLI) application for the Brooks 0250 secondary
//! electronics, which drives up to four mass flow controllers over one
//! RS-232 line.
//!
//! This tool allows users to:
//! - Identify the panel and show its bus address.
//! - Read and set the output (setpoint) of a channel.
//! - Read the measured PV rate of a channel, optionally with its flow unit.
//! - Read and set the volume and rate time units of a channel.
//! - Read and toggle the valve override of a channel.
//! - Print a snapshot of all channels, optionally as YAML.
//! - Run in a continuous daemon mode polling the PV rate of every channel.
//!
//! The CLI leverages the `brooks0250_lib` crate for protocol definitions and client operations.

use anyhow::{Context, Result};
use brooks0250_lib::{
    channel::{Mfc, PvRate},
    protocol as proto,
    sync_client::Panel,
    sync_safe_client::SafeClient,
    transport::SerialTransport,
    units::{FlowUnit, RateTimeUnit, VolumeUnit},
};
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use std::panic;

mod commandline;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

macro_rules! print_output {
    ($panel:expr, $channel:expr, $with_unit:expr) => {
        if $with_unit {
            let (output, unit) = $panel
                .read_output_with_unit($channel)
                .with_context(|| format!("Cannot read output of channel {}", $channel))?;
            println!("Output of channel {}: {} {}", $channel, output, unit);
        } else {
            let output = $panel
                .read_output($channel)
                .with_context(|| format!("Cannot read output of channel {}", $channel))?;
            println!("Output of channel {}: {}", $channel, output);
        }
    };
}

macro_rules! print_pv_rate {
    ($panel:expr, $channel:expr, $with_unit:expr) => {
        if $with_unit {
            let (rate, unit) = $panel
                .read_pv_rate_with_unit($channel)
                .with_context(|| format!("Cannot read PV rate of channel {}", $channel))?;
            println!("PV rate of channel {}: {} {}", $channel, rate, unit);
        } else {
            let rate = $panel
                .read_pv_rate($channel)
                .with_context(|| format!("Cannot read PV rate of channel {}", $channel))?;
            println!("PV rate of channel {}: {}", $channel, rate);
        }
    };
}

/// Everything the panel reports about one channel.
#[derive(Debug, serde::Serialize)]
struct ChannelStatus {
    channel: proto::Channel,
    output: f64,
    pv_rate: f64,
    unit: FlowUnit,
    valve: proto::ValveOverride,
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Channel {}: output={} pv_rate={} unit={} valve={}",
            self.channel, self.output, self.pv_rate, self.unit, self.valve
        )
    }
}

fn read_status(panel: &mut Panel<SerialTransport>) -> Result<Vec<ChannelStatus>> {
    proto::Channel::all()
        .map(|channel| {
            let output = panel
                .read_output(channel)
                .with_context(|| format!("Cannot read output of channel {channel}"))?;
            let (pv_rate, unit) = panel
                .read_pv_rate_with_unit(channel)
                .with_context(|| format!("Cannot read PV rate of channel {channel}"))?;
            let valve = panel
                .read_valve_state(channel)
                .with_context(|| format!("Cannot read valve state of channel {channel}"))?;
            Ok(ChannelStatus {
                channel,
                output,
                pv_rate,
                unit,
                valve,
            })
        })
        .collect()
}

fn print_unit_tables() {
    println!("Volume units:");
    for unit in VolumeUnit::ALL {
        println!("  {} {}", unit.code(), unit.name());
    }
    println!("Rate time units:");
    for unit in RateTimeUnit::ALL {
        println!("  {} {}", unit.code(), unit.name());
    }
}

fn format_pv_rates(readings: &[(proto::Channel, &PvRate)]) -> String {
    readings
        .iter()
        .map(|(channel, rate)| format!("CH{channel}: {rate}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Polls the PV rate of every channel until an exchange fails.
fn run_daemon(panel: Panel<SerialTransport>, poll_interval: std::time::Duration) -> Result<()> {
    let client = SafeClient::new(panel);
    let mut mfcs = proto::Channel::all()
        .map(|channel| {
            Mfc::new(client.clone(), channel)
                .with_context(|| format!("Cannot set up channel {channel}"))
        })
        .collect::<Result<Vec<_>>>()?;

    loop {
        debug!("Daemon: Reading PV rates for stdout...");
        for mfc in mfcs.iter_mut() {
            let channel = mfc.channel();
            mfc.refresh_pv_rate()
                .with_context(|| format!("Cannot read PV rate of channel {channel}"))?;
        }
        let readings = mfcs
            .iter()
            .map(|mfc| (mfc.channel(), mfc.pv_rate()))
            .collect::<Vec<_>>();
        println!("{}", format_pv_rates(&readings));
        std::thread::sleep(poll_interval);
    }
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    // 1. Initialize logging as early as possible
    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "Brooks 0250 CLI started. Log level: {}",
        args.verbose.log_level_filter()
    );

    // 2. Commands that do not talk to the panel
    if !args.command.needs_panel() {
        print_unit_tables();
        return Ok(());
    }

    // 3. Open the serial line and identify the panel
    info!(
        "Attempting to connect to device {} (Baud: {})...",
        args.device, args.baud_rate
    );
    let transport = SerialTransport::open(&args.device, args.baud_rate, args.timeout)
        .with_context(|| format!("Cannot open serial port {}", args.device))?;
    let mut panel = Panel::with_settle_delay(transport, args.delay)
        .with_context(|| format!("No Brooks 0250 panel answered on {}", args.device))?;

    // 4. Execute the command
    match &args.command {
        commandline::CliCommands::Daemon { poll_interval } => {
            info!("Starting daemon mode: interval={poll_interval:?}");
            return run_daemon(panel, *poll_interval);
        }
        commandline::CliCommands::Identify => {
            info!("Executing: Identify");
            println!("Panel bus address: {}", panel.address());
        }
        commandline::CliCommands::ReadOutput { channel, unit } => {
            info!("Executing: Read Output of Channel {channel}");
            print_output!(panel, *channel, *unit);
        }
        commandline::CliCommands::SetOutput { channel, value } => {
            info!("Executing: Set Output of Channel {channel} to {value}");
            panel
                .set_output(*channel, *value)
                .with_context(|| format!("Failed to set output of channel {channel} to {value}"))?;
            println!("Output of channel {channel} set to {value} successfully.");
        }
        commandline::CliCommands::ReadPvRate { channel, unit } => {
            info!("Executing: Read PV Rate of Channel {channel}");
            print_pv_rate!(panel, *channel, *unit);
        }
        commandline::CliCommands::ReadUnits { channel } => {
            info!("Executing: Read Units of Channel {channel}");
            let unit = panel
                .read_units(*channel)
                .with_context(|| format!("Cannot read units of channel {channel}"))?;
            println!("Unit of channel {channel}: {unit}");
        }
        commandline::CliCommands::SetUnits {
            channel,
            volume,
            time,
        } => {
            info!("Executing: Set Units of Channel {channel} (volume={volume:?}, time={time:?})");
            if volume.is_none() && time.is_none() {
                warn!("Neither --volume nor --time given, nothing to set");
            }
            panel
                .set_units(*channel, *volume, *time)
                .with_context(|| format!("Failed to set units of channel {channel}"))?;
            let unit = panel
                .read_units(*channel)
                .with_context(|| format!("Cannot read units of channel {channel}"))?;
            println!("Unit of channel {channel} is now {unit}.");
        }
        commandline::CliCommands::ReadValve { channel } => {
            info!("Executing: Read Valve Override of Channel {channel}");
            let state = panel
                .read_valve_state(*channel)
                .with_context(|| format!("Cannot read valve state of channel {channel}"))?;
            println!("Valve override of channel {channel}: {state}");
        }
        commandline::CliCommands::ToggleValve { channel } => {
            info!("Executing: Toggle Valve Override of Channel {channel}");
            let state = panel
                .toggle_valve(*channel)
                .with_context(|| format!("Failed to toggle valve of channel {channel}"))?;
            println!("Valve override of channel {channel} set to {state}.");
        }
        commandline::CliCommands::ReadFullScale { channel } => {
            info!("Executing: Read Full Scale of Channel {channel}");
            panel
                .read_full_scale(*channel)
                .with_context(|| format!("Cannot query full scale of channel {channel}"))?;
            println!("Full scale query for channel {channel} acknowledged.");
        }
        commandline::CliCommands::Status { yaml } => {
            info!("Executing: Read Status of all Channels");
            let status = read_status(&mut panel)?;
            if *yaml {
                print!(
                    "{}",
                    serde_yaml::to_string(&status).context("Cannot serialize status")?
                );
            } else {
                for channel in &status {
                    println!("{channel}");
                }
            }
        }
        commandline::CliCommands::ListUnits => unreachable!("ListUnits is handled earlier."),
    }

    panel.finish();
    Ok(())
}
