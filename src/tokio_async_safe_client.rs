//! Asynchronous, shareable client for the Brooks 0250 secondary electronics.
//!
//! [`SafeClient`] shares one [`AsyncPanel`] behind a `tokio` mutex and holds
//! it for each complete request/response unit. Clones can be moved into
//! separate tasks.
//!
//! All client methods are `async` and must be `.await`ed.

use crate::{
    error::Result,
    protocol::{self as proto, Channel},
    tokio_async_client::AsyncPanel,
    units::{FlowUnit, RateTimeUnit, VolumeUnit},
};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, MutexGuard};

/// Shared, serialized access to one [`AsyncPanel`].
#[derive(Debug)]
pub struct SafeClient<S> {
    panel: Arc<Mutex<AsyncPanel<S>>>,
}

impl<S> Clone for SafeClient<S> {
    fn clone(&self) -> Self {
        Self {
            panel: self.panel.clone(),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> SafeClient<S> {
    /// Creates a new `SafeClient` from an identified panel.
    pub fn new(panel: AsyncPanel<S>) -> Self {
        Self {
            panel: Arc::new(Mutex::new(panel)),
        }
    }

    /// Creates a new `SafeClient` from a shared panel.
    pub fn from_shared(panel: Arc<Mutex<AsyncPanel<S>>>) -> Self {
        Self { panel }
    }

    /// Clones the shared panel.
    pub fn clone_shared(&self) -> Arc<Mutex<AsyncPanel<S>>> {
        self.panel.clone()
    }

    /// Locks the panel for a sequence of exchanges that must not be
    /// interleaved with other callers.
    pub async fn lock(&self) -> MutexGuard<'_, AsyncPanel<S>> {
        self.panel.lock().await
    }

    /// The bus address reported by the panel.
    pub async fn address(&self) -> proto::Address {
        self.panel.lock().await.address().clone()
    }

    /// Sets the output (setpoint) of `channel`.
    pub async fn set_output(&self, channel: Channel, value: f64) -> Result<()> {
        self.panel.lock().await.set_output(channel, value).await
    }

    /// Reads the output (setpoint) of `channel`.
    pub async fn read_output(&self, channel: Channel) -> Result<f64> {
        self.panel.lock().await.read_output(channel).await
    }

    /// Reads the output of `channel` and its unit without releasing the lock.
    pub async fn read_output_with_unit(&self, channel: Channel) -> Result<(f64, FlowUnit)> {
        self.panel.lock().await.read_output_with_unit(channel).await
    }

    /// Reads the flow unit of `channel`.
    pub async fn read_units(&self, channel: Channel) -> Result<FlowUnit> {
        self.panel.lock().await.read_units(channel).await
    }

    /// Sets the volume and/or rate time unit of `channel`.
    pub async fn set_units(
        &self,
        channel: Channel,
        volume: Option<VolumeUnit>,
        time: Option<RateTimeUnit>,
    ) -> Result<()> {
        self.panel.lock().await.set_units(channel, volume, time).await
    }

    /// Sets the units of `channel` by name. Unknown names send nothing.
    pub async fn set_units_by_name(
        &self,
        channel: Channel,
        volume: Option<&str>,
        time: Option<&str>,
    ) -> Result<()> {
        self.panel
            .lock()
            .await
            .set_units_by_name(channel, volume, time)
            .await
    }

    /// Reads the measured PV rate of `channel`.
    pub async fn read_pv_rate(&self, channel: Channel) -> Result<f64> {
        self.panel.lock().await.read_pv_rate(channel).await
    }

    /// Reads the PV rate of `channel` and its unit without releasing the lock.
    pub async fn read_pv_rate_with_unit(&self, channel: Channel) -> Result<(f64, FlowUnit)> {
        self.panel.lock().await.read_pv_rate_with_unit(channel).await
    }

    /// Reads the valve override state of `channel`.
    pub async fn read_valve_state(&self, channel: Channel) -> Result<proto::ValveOverride> {
        self.panel.lock().await.read_valve_state(channel).await
    }

    /// Toggles the valve override of `channel`, holding the lock across the
    /// read and the write.
    pub async fn toggle_valve(&self, channel: Channel) -> Result<proto::ValveOverride> {
        self.panel.lock().await.toggle_valve(channel).await
    }

    /// Queries the full scale of `channel` and discards the response.
    pub async fn read_full_scale(&self, channel: Channel) -> Result<()> {
        self.panel.lock().await.read_full_scale(channel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokio_async_client::tests::{fake_panel, TIMEOUT};
    use std::time::Duration;

    #[tokio::test]
    async fn tasks_share_one_panel() {
        let (stream, device) = fake_panel(vec![
            Some("AZI,07,0,0,1,2,3\r\n"),
            Some("AZ,07,01,P04,00\r\n"),
            Some("AZ,07,01,P10,1\r\n"),
            Some("AZ,07,01,P04,00\r\n"),
            Some("AZ,07,01,P10,1\r\n"),
        ]);
        let panel = AsyncPanel::with_settle_delay(stream, TIMEOUT, Duration::ZERO)
            .await
            .unwrap();
        let client = SafeClient::new(panel);
        assert_eq!(client.address().await.as_str(), "07");

        let channel = Channel::try_from(1).unwrap();
        let first = tokio::spawn({
            let client = client.clone();
            async move { client.read_units(channel).await.unwrap() }
        });
        let second = tokio::spawn({
            let client = client.clone();
            async move { client.read_units(channel).await.unwrap() }
        });
        assert_eq!(first.await.unwrap().to_string(), "ml/sec");
        assert_eq!(second.await.unwrap().to_string(), "ml/sec");

        drop(client);
        assert_eq!(
            device.await.unwrap(),
            [
                "AZI\r",
                "AZ07.01P04?\r",
                "AZ07.01P10?\r",
                "AZ07.01P04?\r",
                "AZ07.01P10?\r"
            ]
        );
    }
}
