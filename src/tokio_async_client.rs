//! Asynchronous client for the Brooks 0250 secondary electronics.
//!
//! [`AsyncPanel`] speaks the same protocol as
//! [`Panel`](crate::sync_client::Panel) over any `tokio` byte stream,
//! typically a `tokio_serial::SerialStream`. Exchanges are still strictly
//! sequential; every response read is bounded by the read timeout.
//!
//! All client methods are `async` and must be `.await`ed.

use crate::{
    error::Result,
    protocol::{self as proto, Channel, CommandFrame, Verb},
    transport::{Response, DEFAULT_SETTLE_DELAY},
    units::{FlowUnit, RateTimeUnit, VolumeUnit},
};
use log::*;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Line level exchanges over the stream, shared by discovery and the client.
#[derive(Debug)]
struct Link<S> {
    stream: BufReader<S>,
    timeout: Duration,
    settle_delay: Duration,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Link<S> {
    async fn read_line(&mut self) -> io::Result<Vec<u8>> {
        let mut line = Vec::new();
        let read = tokio::time::timeout(self.timeout, self.stream.read_until(b'\n', &mut line))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no response from panel"))??;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream closed while waiting for a response",
            ));
        }
        trace!("Received {}", String::from_utf8_lossy(&line).escape_debug());
        Ok(line)
    }

    async fn purge(&mut self) -> io::Result<usize> {
        let mut purged = 0;
        loop {
            match self.read_line().await {
                Ok(_) => purged += 1,
                Err(err) if err.kind() == io::ErrorKind::TimedOut => break,
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err),
            }
        }
        debug!("Purged {purged} pending line(s)");
        Ok(purged)
    }

    async fn send(&mut self, frames: &[CommandFrame], response: Response) -> Result<Vec<Vec<u8>>> {
        for frame in frames {
            trace!("Sending {frame}");
            let stream = self.stream.get_mut();
            stream.write_all(frame.as_bytes()).await?;
            stream.flush().await?;
            tokio::time::sleep(self.settle_delay).await;
        }
        match response {
            Response::Read => {
                let mut lines = Vec::with_capacity(frames.len());
                for _ in frames {
                    lines.push(self.read_line().await?);
                }
                Ok(lines)
            }
            Response::Purge => {
                self.purge().await?;
                Ok(Vec::new())
            }
        }
    }
}

/// Asynchronous client for one panel.
#[derive(Debug)]
pub struct AsyncPanel<S> {
    link: Link<S>,
    address: proto::Address,
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncPanel<S> {
    /// Identifies the panel on `stream` and returns a client for it.
    ///
    /// * `timeout` - How long a read waits for a response line.
    pub async fn new(stream: S, timeout: Duration) -> Result<Self> {
        Self::with_settle_delay(stream, timeout, DEFAULT_SETTLE_DELAY).await
    }

    /// Like [`AsyncPanel::new`] with a custom settling delay after every frame.
    pub async fn with_settle_delay(
        stream: S,
        timeout: Duration,
        settle_delay: Duration,
    ) -> Result<Self> {
        let mut link = Link {
            stream: BufReader::new(stream),
            timeout,
            settle_delay,
        };
        let mut lines = link
            .send(&[CommandFrame::identify()], Response::Read)
            .await?;
        let address = proto::decode_address(&lines.pop().unwrap_or_default())?;
        debug!("Panel identified with bus address {address}");
        Ok(Self { link, address })
    }

    /// The bus address reported by the panel.
    pub fn address(&self) -> &proto::Address {
        &self.address
    }

    /// Sends raw frames as one batch, see
    /// [`Panel::send`](crate::sync_client::Panel::send).
    pub async fn send(
        &mut self,
        frames: &[CommandFrame],
        response: Response,
    ) -> Result<Vec<Vec<u8>>> {
        self.link.send(frames, response).await
    }

    async fn transact(&mut self, frame: CommandFrame) -> Result<Vec<u8>> {
        let mut lines = self.send(std::slice::from_ref(&frame), Response::Read).await?;
        Ok(lines.pop().unwrap_or_default())
    }

    /// Sets the output (setpoint) of `channel`.
    pub async fn set_output(&mut self, channel: Channel, value: f64) -> Result<()> {
        self.transact(CommandFrame::set_output(&self.address, channel, value))
            .await?;
        Ok(())
    }

    /// Reads the output (setpoint) of `channel`.
    pub async fn read_output(&mut self, channel: Channel) -> Result<f64> {
        let rsp = self
            .transact(CommandFrame::query(&self.address, channel, Verb::Output))
            .await?;
        Ok(proto::decode_number(&rsp, Verb::Output)?)
    }

    /// Reads the output (setpoint) of `channel` together with its unit.
    pub async fn read_output_with_unit(&mut self, channel: Channel) -> Result<(f64, FlowUnit)> {
        let output = self.read_output(channel).await?;
        Ok((output, self.read_units(channel).await?))
    }

    /// Reads the flow unit of `channel`.
    pub async fn read_units(&mut self, channel: Channel) -> Result<FlowUnit> {
        let volume = self
            .transact(CommandFrame::query(&self.address, channel, Verb::VolumeUnit))
            .await?;
        let time = self
            .transact(CommandFrame::query(&self.address, channel, Verb::RateTimeUnit))
            .await?;
        Ok(proto::decode_flow_unit(&volume, &time)?)
    }

    /// Sets the volume and/or rate time unit of `channel`, volume first.
    pub async fn set_units(
        &mut self,
        channel: Channel,
        volume: Option<VolumeUnit>,
        time: Option<RateTimeUnit>,
    ) -> Result<()> {
        let frames = CommandFrame::set_units(&self.address, channel, volume, time);
        if frames.is_empty() {
            return Ok(());
        }
        self.send(&frames, Response::Read).await?;
        Ok(())
    }

    /// Sets the units of `channel` by name. Unknown names send nothing.
    pub async fn set_units_by_name(
        &mut self,
        channel: Channel,
        volume: Option<&str>,
        time: Option<&str>,
    ) -> Result<()> {
        let volume = volume.map(VolumeUnit::from_name).transpose()?;
        let time = time.map(RateTimeUnit::from_name).transpose()?;
        self.set_units(channel, volume, time).await
    }

    /// Reads the measured PV rate of `channel`.
    pub async fn read_pv_rate(&mut self, channel: Channel) -> Result<f64> {
        let rsp = self
            .transact(CommandFrame::query(&self.address, channel, Verb::PvRate))
            .await?;
        Ok(proto::decode_number(&rsp, Verb::PvRate)?)
    }

    /// Reads the measured PV rate of `channel` together with its unit.
    pub async fn read_pv_rate_with_unit(&mut self, channel: Channel) -> Result<(f64, FlowUnit)> {
        let rate = self.read_pv_rate(channel).await?;
        Ok((rate, self.read_units(channel).await?))
    }

    /// Reads the valve override state of `channel`.
    pub async fn read_valve_state(&mut self, channel: Channel) -> Result<proto::ValveOverride> {
        let rsp = self
            .transact(CommandFrame::query(
                &self.address,
                channel,
                Verb::ValveOverride,
            ))
            .await?;
        Ok(proto::decode_valve_override(&rsp)?)
    }

    /// Switches the valve override of `channel` and returns the state
    /// written. Read and write are separate exchanges.
    pub async fn toggle_valve(&mut self, channel: Channel) -> Result<proto::ValveOverride> {
        let state = self.read_valve_state(channel).await?.toggled();
        let frame = CommandFrame::set_valve_override(&self.address, channel, &state);
        self.send(&[frame], Response::Purge).await?;
        Ok(state)
    }

    /// Queries the full scale of `channel` and discards the response.
    pub async fn read_full_scale(&mut self, channel: Channel) -> Result<()> {
        self.transact(CommandFrame::query(&self.address, channel, Verb::FullScale))
            .await?;
        Ok(())
    }

    /// Gives the stream back.
    pub fn finish(self) -> S {
        self.link.stream.into_inner()
    }
}

/// Opens `device` as an asynchronous serial stream with the panel's line
/// settings.
#[cfg(feature = "serial")]
pub fn open_serial(device: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
    use tokio_serial::SerialPortBuilderExt;

    Ok(crate::transport::serial_port_builder(device, baud_rate).open_native_async()?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio::task::JoinHandle;

    pub(crate) const TIMEOUT: Duration = Duration::from_millis(50);

    /// Plays the panel: answers each received frame with the next reply and
    /// returns the frames it received.
    pub(crate) fn fake_panel(
        replies: Vec<Option<&'static str>>,
    ) -> (DuplexStream, JoinHandle<Vec<String>>) {
        let (client, mut device) = tokio::io::duplex(1024);
        let handle = tokio::spawn(async move {
            let mut frames = Vec::new();
            let mut frame = Vec::new();
            let mut byte = [0u8; 1];
            let mut replies = replies.into_iter();
            while device.read(&mut byte).await.unwrap_or(0) == 1 {
                frame.push(byte[0]);
                if byte[0] != b'\r' {
                    continue;
                }
                frames.push(String::from_utf8(std::mem::take(&mut frame)).unwrap());
                match replies.next() {
                    Some(Some(reply)) => device.write_all(reply.as_bytes()).await.unwrap(),
                    Some(None) => {}
                    None => break,
                }
            }
            frames
        });
        (client, handle)
    }

    async fn panel(stream: DuplexStream) -> AsyncPanel<DuplexStream> {
        AsyncPanel::with_settle_delay(stream, TIMEOUT, Duration::ZERO)
            .await
            .unwrap()
    }

    fn channel(value: u8) -> Channel {
        Channel::try_from(value).unwrap()
    }

    #[tokio::test]
    async fn discovers_address_and_reads_output() {
        let (stream, device) = fake_panel(vec![
            Some("AZI,07,0,0,1,2,3\r\n"),
            Some("AZ,07,04,P01,12.50\r\n"),
        ]);
        let mut panel = panel(stream).await;
        assert_eq!(panel.address().as_str(), "07");
        assert_eq!(panel.read_output(channel(2)).await.unwrap(), 12.5);
        drop(panel);
        assert_eq!(device.await.unwrap(), ["AZI\r", "AZ07.04P01?\r"]);
    }

    #[tokio::test]
    async fn reads_pv_rate_with_unit() {
        let (stream, device) = fake_panel(vec![
            Some("AZI,07,0,0,1,2,3\r\n"),
            Some("AZ,07,01,K,0,0,7.25\r\n"),
            Some("AZ,07,01,P04,18\r\n"),
            Some("AZ,07,01,P10,2\r\n"),
        ]);
        let mut panel = panel(stream).await;
        let (rate, unit) = panel.read_pv_rate_with_unit(channel(1)).await.unwrap();
        assert_eq!(rate, 7.25);
        assert_eq!(unit.to_string(), "scc/min");
        drop(panel);
        assert_eq!(
            device.await.unwrap(),
            ["AZI\r", "AZ07.01K\r", "AZ07.01P04?\r", "AZ07.01P10?\r"]
        );
    }

    #[tokio::test]
    async fn set_units_in_order() {
        let (stream, device) = fake_panel(vec![
            Some("AZI,07,0,0,1,2,3\r\n"),
            Some("AZ,07,01,P04,00\r\n"),
            Some("AZ,07,01,P10,1\r\n"),
        ]);
        let mut panel = panel(stream).await;
        panel
            .set_units_by_name(channel(1), Some("ml"), Some("sec"))
            .await
            .unwrap();
        assert!(panel
            .set_units_by_name(channel(1), Some("ml"), Some("jiffy"))
            .await
            .unwrap_err()
            .is_lookup());
        drop(panel);
        assert_eq!(
            device.await.unwrap(),
            ["AZI\r", "AZ07.01P04=00\r", "AZ07.01P10=01\r"]
        );
    }

    #[tokio::test]
    async fn toggle_valve_purges_write_response() {
        let (stream, device) = fake_panel(vec![
            Some("AZI,07,0,0,1,2,3\r\n"),
            Some("AZ,07,04,P29,0\r\n"),
            Some("AZ,07,04,P29,1\r\n"),
            Some("AZ,07,04,P29,1\r\n"),
        ]);
        let mut panel = panel(stream).await;
        assert_eq!(
            panel.toggle_valve(channel(2)).await.unwrap(),
            proto::ValveOverride::Closed
        );
        // Nothing stale is left for the next exchange.
        assert_eq!(
            panel.read_valve_state(channel(2)).await.unwrap(),
            proto::ValveOverride::Closed
        );
        drop(panel);
        assert_eq!(
            device.await.unwrap(),
            ["AZI\r", "AZ07.04P29?\r", "AZ07.04P29=1\r", "AZ07.04P29?\r"]
        );
    }

    #[tokio::test]
    async fn missing_response_times_out() {
        let (stream, _device) = fake_panel(vec![Some("AZI,07,0,0,1,2,3\r\n"), None]);
        let mut panel = panel(stream).await;
        let err = panel.read_full_scale(channel(1)).await.unwrap_err();
        assert!(err.is_timeout());
    }
}
