//! Blocking client for the Brooks 0250 secondary electronics.
//!
//! [`Panel`] owns a [`Transport`] and the bus address learned when it was
//! created. Every method is one or more strictly sequential
//! request/response exchanges and blocks for up to the transport's read
//! timeout per response, plus the settling delay after every frame.
//!
//! ## Example
//!
//! ```no_run
//! use brooks0250_lib::{
//!     protocol::Channel,
//!     sync_client::Panel,
//!     transport::{SerialTransport, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT},
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = SerialTransport::open("/dev/ttyUSB0", DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT)?;
//!     let mut panel = Panel::new(transport)?;
//!
//!     let channel = Channel::try_from(1)?;
//!     panel.set_output(channel, 25.0)?;
//!     let (rate, unit) = panel.read_pv_rate_with_unit(channel)?;
//!     println!("PV rate: {rate} {unit}");
//!
//!     Ok(())
//! }
//! ```

use crate::{
    error::Result,
    protocol::{self as proto, Channel, CommandFrame, Verb},
    transport::{Response, Transport, DEFAULT_SETTLE_DELAY},
    units::{FlowUnit, RateTimeUnit, VolumeUnit},
};
use log::*;
use std::time::Duration;

/// Blocking client for one panel on a point-to-point serial line.
#[derive(Debug)]
pub struct Panel<T: Transport> {
    transport: T,
    address: proto::Address,
    settle_delay: Duration,
}

impl<T: Transport> Panel<T> {
    /// Identifies the panel on `transport` and returns a client for it.
    ///
    /// Waits [`DEFAULT_SETTLE_DELAY`] after every frame.
    ///
    /// # Errors
    ///
    /// Fails if the identification exchange fails or its response carries no
    /// valid bus address.
    pub fn new(transport: T) -> Result<Self> {
        Self::with_settle_delay(transport, DEFAULT_SETTLE_DELAY)
    }

    /// Like [`Panel::new`] with a custom settling delay after every frame.
    pub fn with_settle_delay(mut transport: T, settle_delay: Duration) -> Result<Self> {
        let address = Self::discover_address(&mut transport, settle_delay)?;
        debug!("Panel identified with bus address {address}");
        Ok(Self {
            transport,
            address,
            settle_delay,
        })
    }

    fn discover_address(transport: &mut T, settle_delay: Duration) -> Result<proto::Address> {
        let mut lines = Self::exchange(
            transport,
            settle_delay,
            &[CommandFrame::identify()],
            Response::Read,
        )?;
        let rsp = lines.pop().unwrap_or_default();
        Ok(proto::decode_address(&rsp)?)
    }

    fn exchange(
        transport: &mut T,
        settle_delay: Duration,
        frames: &[CommandFrame],
        response: Response,
    ) -> Result<Vec<Vec<u8>>> {
        for frame in frames {
            trace!("Sending {frame}");
            transport.write(frame.as_bytes())?;
            std::thread::sleep(settle_delay);
        }
        match response {
            Response::Read => frames
                .iter()
                .map(|_| -> Result<Vec<u8>> {
                    let line = transport.read_line()?;
                    trace!("Received {}", String::from_utf8_lossy(&line).escape_debug());
                    Ok(line)
                })
                .collect(),
            Response::Purge => {
                let purged = transport.read_all_pending()?;
                debug!("Purged {} pending line(s)", purged.len());
                Ok(Vec::new())
            }
        }
    }

    /// The bus address reported by the panel.
    pub fn address(&self) -> &proto::Address {
        &self.address
    }

    /// The delay after every transmitted frame.
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Sends raw frames as one batch.
    ///
    /// Frames go out in order with the settling delay after each one. With
    /// [`Response::Read`] one line per frame is returned, in sending order;
    /// with [`Response::Purge`] all pending lines are discarded and the
    /// result is empty.
    pub fn send(&mut self, frames: &[CommandFrame], response: Response) -> Result<Vec<Vec<u8>>> {
        Self::exchange(&mut self.transport, self.settle_delay, frames, response)
    }

    fn transact(&mut self, frame: CommandFrame) -> Result<Vec<u8>> {
        let mut lines = self.send(std::slice::from_ref(&frame), Response::Read)?;
        Ok(lines.pop().unwrap_or_default())
    }

    /// Sets the output (setpoint) of `channel`. The echoed response is read
    /// and discarded.
    pub fn set_output(&mut self, channel: Channel, value: f64) -> Result<()> {
        self.transact(CommandFrame::set_output(&self.address, channel, value))?;
        Ok(())
    }

    /// Reads the output (setpoint) of `channel`.
    pub fn read_output(&mut self, channel: Channel) -> Result<f64> {
        let rsp = self.transact(CommandFrame::query(&self.address, channel, Verb::Output))?;
        Ok(proto::decode_number(&rsp, Verb::Output)?)
    }

    /// Reads the output (setpoint) of `channel` together with its unit.
    pub fn read_output_with_unit(&mut self, channel: Channel) -> Result<(f64, FlowUnit)> {
        let output = self.read_output(channel)?;
        Ok((output, self.read_units(channel)?))
    }

    /// Reads the flow unit of `channel`.
    ///
    /// Queries the volume unit and then the rate time unit. If either query
    /// fails the whole call fails.
    pub fn read_units(&mut self, channel: Channel) -> Result<FlowUnit> {
        let volume = self.transact(CommandFrame::query(&self.address, channel, Verb::VolumeUnit))?;
        let time = self.transact(CommandFrame::query(&self.address, channel, Verb::RateTimeUnit))?;
        Ok(proto::decode_flow_unit(&volume, &time)?)
    }

    /// Sets the volume and/or rate time unit of `channel`.
    ///
    /// Both writes are sent as one batch, volume first, and each response is
    /// consumed. Passing neither unit sends nothing.
    pub fn set_units(
        &mut self,
        channel: Channel,
        volume: Option<VolumeUnit>,
        time: Option<RateTimeUnit>,
    ) -> Result<()> {
        let frames = CommandFrame::set_units(&self.address, channel, volume, time);
        if frames.is_empty() {
            return Ok(());
        }
        self.send(&frames, Response::Read)?;
        Ok(())
    }

    /// Like [`Panel::set_units`] with unit names (e.g. `"ml"`, `"sec"`).
    ///
    /// Both names are looked up before anything is sent, so an unknown name
    /// leaves the panel untouched.
    pub fn set_units_by_name(
        &mut self,
        channel: Channel,
        volume: Option<&str>,
        time: Option<&str>,
    ) -> Result<()> {
        let volume = volume.map(VolumeUnit::from_name).transpose()?;
        let time = time.map(RateTimeUnit::from_name).transpose()?;
        self.set_units(channel, volume, time)
    }

    /// Reads the measured PV rate of `channel`.
    pub fn read_pv_rate(&mut self, channel: Channel) -> Result<f64> {
        let rsp = self.transact(CommandFrame::query(&self.address, channel, Verb::PvRate))?;
        Ok(proto::decode_number(&rsp, Verb::PvRate)?)
    }

    /// Reads the measured PV rate of `channel` together with its unit.
    pub fn read_pv_rate_with_unit(&mut self, channel: Channel) -> Result<(f64, FlowUnit)> {
        let rate = self.read_pv_rate(channel)?;
        Ok((rate, self.read_units(channel)?))
    }

    /// Reads the valve override state of `channel`.
    pub fn read_valve_state(&mut self, channel: Channel) -> Result<proto::ValveOverride> {
        let rsp = self.transact(CommandFrame::query(
            &self.address,
            channel,
            Verb::ValveOverride,
        ))?;
        Ok(proto::decode_valve_override(&rsp)?)
    }

    /// Switches the valve override of `channel` between normal and closed
    /// and returns the state written.
    ///
    /// This is a read followed by an independent write; a change made by
    /// someone else in between is overwritten. The response to the write is
    /// purged.
    pub fn toggle_valve(&mut self, channel: Channel) -> Result<proto::ValveOverride> {
        let state = self.read_valve_state(channel)?.toggled();
        let frame = CommandFrame::set_valve_override(&self.address, channel, &state);
        self.send(&[frame], Response::Purge)?;
        Ok(state)
    }

    /// Queries the full scale of `channel`. The response is read and
    /// discarded.
    pub fn read_full_scale(&mut self, channel: Channel) -> Result<()> {
        self.transact(CommandFrame::query(&self.address, channel, Verb::FullScale))?;
        Ok(())
    }

    /// Gives the transport back. Dropping it closes the port.
    pub fn finish(self) -> T {
        self.transport
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{error::Error, transport::mock::MockTransport, units::UnitLookupError};
    use assert_matches::assert_matches;

    pub(crate) fn panel(transport: &MockTransport) -> Panel<MockTransport> {
        Panel::with_settle_delay(transport.clone(), Duration::ZERO).unwrap()
    }

    pub(crate) fn channel(value: u8) -> Channel {
        Channel::try_from(value).unwrap()
    }

    #[test]
    fn discovers_address() {
        let transport = MockTransport::identified();
        let panel = panel(&transport);
        assert_eq!(panel.address().as_str(), "07");
        assert_eq!(transport.written(), ["AZI\r"]);
    }

    #[test]
    fn discovery_needs_a_response() {
        let transport = MockTransport::new().silent();
        let err = Panel::with_settle_delay(transport, Duration::ZERO).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn discovery_rejects_short_response() {
        let transport = MockTransport::new().reply("AZI\r\n");
        let err = Panel::with_settle_delay(transport, Duration::ZERO).unwrap_err();
        assert!(err.is_frame());
    }

    #[test]
    fn set_output_consumes_echo() {
        let transport = MockTransport::identified().reply("AZ,07,04,P01,50\r\n");
        let mut panel = panel(&transport);
        panel.set_output(channel(2), 50.0).unwrap();
        assert_eq!(transport.written()[1], "AZ07.04P01=50\r");
        assert_eq!(transport.pending(), 0);
    }

    #[test]
    fn read_output() {
        let transport = MockTransport::identified().reply("AZ,07,04,P01,12.50\r\n");
        let mut panel = panel(&transport);
        assert_eq!(panel.read_output(channel(2)).unwrap(), 12.5);
        assert_eq!(transport.written()[1], "AZ07.04P01?\r");
    }

    #[test]
    fn read_output_with_unit() {
        let transport = MockTransport::identified()
            .reply("AZ,07,02,P01,20.0\r\n")
            .reply("AZ,07,01,P04,03\r\n")
            .reply("AZ,07,01,P10,2\r\n");
        let mut panel = panel(&transport);
        let (value, unit) = panel.read_output_with_unit(channel(1)).unwrap();
        assert_eq!(value, 20.0);
        assert_eq!(unit.to_string(), "l/min");
        assert_eq!(
            transport.written(),
            ["AZI\r", "AZ07.02P01?\r", "AZ07.01P04?\r", "AZ07.01P10?\r"]
        );
    }

    #[test]
    fn read_units_fails_as_a_whole() {
        let transport = MockTransport::identified()
            .reply("AZ,07,03,P04,00\r\n")
            .reply("AZ,07,03,P10,9\r\n");
        let mut panel = panel(&transport);
        let err = panel.read_units(channel(2)).unwrap_err();
        assert_matches!(
            err,
            Error::ProtocolError(proto::Error::Lookup(UnitLookupError::UnknownRateTimeCode(..)))
        );
    }

    #[test]
    fn read_pv_rate() {
        let transport = MockTransport::identified().reply("AZ,07,05,K,0,0,3.25\r\n");
        let mut panel = panel(&transport);
        assert_eq!(panel.read_pv_rate(channel(3)).unwrap(), 3.25);
        assert_eq!(transport.written()[1], "AZ07.05K\r");
    }

    #[test]
    fn read_pv_rate_rejects_garbage() {
        let transport = MockTransport::identified().reply("AZ,07,05,K,0,0,---\r\n");
        let mut panel = panel(&transport);
        assert_matches!(
            panel.read_pv_rate(channel(3)),
            Err(Error::ProtocolError(proto::Error::Frame(proto::FrameError::InvalidNumber(..))))
        );
    }

    #[test]
    fn set_units_sends_volume_then_time() {
        let transport = MockTransport::identified()
            .reply("AZ,07,01,P04,00\r\n")
            .reply("AZ,07,01,P10,1\r\n");
        let mut panel = panel(&transport);
        panel
            .set_units_by_name(channel(1), Some("ml"), Some("sec"))
            .unwrap();
        assert_eq!(
            transport.written(),
            ["AZI\r", "AZ07.01P04=00\r", "AZ07.01P10=01\r"]
        );
        assert_eq!(transport.pending(), 0);
    }

    #[test]
    fn set_units_with_one_unit() {
        let transport = MockTransport::identified().reply("AZ,07,03,P04,14\r\n");
        let mut panel = panel(&transport);
        panel
            .set_units(channel(2), Some(VolumeUnit::Kg), None)
            .unwrap();
        assert_eq!(transport.written(), ["AZI\r", "AZ07.03P04=14\r"]);
    }

    #[test]
    fn set_units_without_units_sends_nothing() {
        let transport = MockTransport::identified();
        let mut panel = panel(&transport);
        panel.set_units(channel(1), None, None).unwrap();
        assert_eq!(transport.written(), ["AZI\r"]);
    }

    #[test]
    fn unknown_unit_name_sends_nothing() {
        let transport = MockTransport::identified();
        let mut panel = panel(&transport);

        let err = panel
            .set_units_by_name(channel(1), Some("ml"), Some("fortnight"))
            .unwrap_err();
        assert!(err.is_lookup());

        let err = panel
            .set_units_by_name(channel(1), Some("gallon"), Some("sec"))
            .unwrap_err();
        assert!(err.is_lookup());

        assert_eq!(transport.written(), ["AZI\r"]);
    }

    #[test]
    fn toggle_valve_from_normal_closes() {
        let transport = MockTransport::identified()
            .reply("AZ,07,04,P29,0\r\n")
            .reply("AZ,07,04,P29,1\r\n");
        let mut panel = panel(&transport);
        assert_eq!(
            panel.toggle_valve(channel(2)).unwrap(),
            proto::ValveOverride::Closed
        );
        assert_eq!(
            transport.written(),
            ["AZI\r", "AZ07.04P29?\r", "AZ07.04P29=1\r"]
        );
        assert_eq!(transport.pending(), 0);
    }

    #[test]
    fn toggle_valve_from_closed_opens() {
        let transport = MockTransport::identified()
            .reply("AZ,07,02,P29,1\r\n")
            .silent();
        let mut panel = panel(&transport);
        assert_eq!(
            panel.toggle_valve(channel(1)).unwrap(),
            proto::ValveOverride::Normal
        );
        assert_eq!(transport.written()[2], "AZ07.02P29=0\r");
    }

    #[test]
    fn toggle_valve_from_unknown_state_opens() {
        let transport = MockTransport::identified()
            .reply("AZ,07,08,P29,5\r\n")
            .reply("AZ,07,08,P29,0\r\n");
        let mut panel = panel(&transport);
        panel.toggle_valve(channel(4)).unwrap();
        assert_eq!(transport.written()[2], "AZ07.08P29=0\r");
    }

    #[test]
    fn read_valve_state_keeps_raw_value() {
        let transport = MockTransport::identified().reply("AZ,07,04,P29,2\r\n");
        let mut panel = panel(&transport);
        let state = panel.read_valve_state(channel(2)).unwrap();
        assert_eq!(state.as_raw(), "2");
        assert_eq!(transport.written().len(), 2);
    }

    #[test]
    fn read_full_scale_discards_response() {
        let transport = MockTransport::identified().reply("AZ,07,02,P09,100.0\r\n");
        let mut panel = panel(&transport);
        panel.read_full_scale(channel(1)).unwrap();
        assert_eq!(transport.written()[1], "AZ07.02P09?\r");
        assert_eq!(transport.pending(), 0);
    }

    #[test]
    fn missing_response_is_a_transport_error() {
        let transport = MockTransport::identified().silent();
        let mut panel = panel(&transport);
        let err = panel.read_output(channel(1)).unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn batch_reads_in_sending_order() {
        let transport = MockTransport::identified().reply("first\r\n").reply("second\r\n");
        let mut panel = panel(&transport);
        let address = panel.address().clone();
        let frames = [
            CommandFrame::query(&address, channel(1), Verb::Output),
            CommandFrame::query(&address, channel(2), Verb::Output),
        ];
        let lines = panel.send(&frames, Response::Read).unwrap();
        assert_eq!(lines, [b"first\r\n".to_vec(), b"second\r\n".to_vec()]);
    }

    #[test]
    fn batch_purge_discards_everything() {
        let transport = MockTransport::identified().reply("first\r\n").reply("second\r\n");
        let mut panel = panel(&transport);
        let address = panel.address().clone();
        let frames = [
            CommandFrame::query(&address, channel(1), Verb::Output),
            CommandFrame::query(&address, channel(2), Verb::Output),
        ];
        assert!(panel.send(&frames, Response::Purge).unwrap().is_empty());
        assert_eq!(transport.pending(), 0);
    }

    #[test]
    fn finish_returns_transport() {
        let transport = MockTransport::identified();
        let panel = panel(&transport);
        let returned = panel.finish();
        assert_eq!(returned.written(), ["AZI\r"]);
    }
}
