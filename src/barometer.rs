use tracing::info;

use crate::ble::Transport;
use crate::error::SensorError;
use crate::frame_codec::decode_pressure_frame;
use crate::sensor::{ChannelId, PhysicalSample, SensorService};
use crate::types::{
    BARO_CTRL_UUID, BARO_DATA_UUID, BARO_PERIOD_UUID, DEFAULT_PERIOD, SENSOR_OFF, SENSOR_ON,
};

pub const BAROMETER_ID: ChannelId = ChannelId::new(BARO_DATA_UUID, BARO_CTRL_UUID, BARO_PERIOD_UUID);

/// Barómetro del SensorTag, devuelve un escalar en hPa
#[derive(Debug, Clone)]
pub struct Barometer {
    id: ChannelId,
    period: u8,
}

impl Barometer {
    pub fn new() -> Self {
        Self::with_period(DEFAULT_PERIOD)
    }

    /// `period` en unidades de 10 ms
    pub fn with_period(period: u8) -> Self {
        Self {
            id: BAROMETER_ID,
            period,
        }
    }
}

impl Default for Barometer {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorService for Barometer {
    fn id(&self) -> &ChannelId {
        &self.id
    }

    /// Control primero, periodo después
    fn enable<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<&mut Self, SensorError> {
        transport.write_characteristic(self.id.control(), &[SENSOR_ON])?;
        transport.write_characteristic(self.id.period(), &[self.period])?;
        info!(period_ms = self.period as u32 * 10, "Barómetro activado");
        Ok(self)
    }

    fn disable<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), SensorError> {
        transport.write_characteristic(self.id.control(), &[SENSOR_OFF])?;
        Ok(())
    }

    fn decode(&self, raw: &[u8]) -> Result<PhysicalSample, SensorError> {
        let frame = decode_pressure_frame(raw)?;
        Ok(PhysicalSample::Scalar(frame.pressure_hpa()))
    }
}
