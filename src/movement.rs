//! Servicio de movimiento MPU-9250: giroscopio, acelerómetro y magnetómetro
//! comparten una sola característica de datos y un solo registro de control.

use std::ops::Range;

use tracing::{info, warn};

use crate::ble::Transport;
use crate::error::SensorError;
use crate::frame_codec::{decode_motion_frame, encode_control_word, MotionTuple};
use crate::sensor::{ChannelId, ControlMask, PhysicalSample, SensorService};
use crate::types::{
    ACCEL_CHANNEL, ACCEL_RANGE_4G, ACCEL_SCALE_4G, ACCEL_XYZ, DEFAULT_PERIOD, GYRO_CHANNEL,
    GYRO_SCALE, GYRO_XYZ, MAG_CHANNEL, MAG_SCALE, MAG_XYZ, MOTION_CTRL_UUID, MOTION_DATA_UUID,
    MOTION_PERIOD_UUID,
};

pub const MOTION_ID: ChannelId =
    ChannelId::new(MOTION_DATA_UUID, MOTION_CTRL_UUID, MOTION_PERIOD_UUID);

/// Componente de 3 ejes del servicio de movimiento.
///
/// La porción de la trama que lee cada componente está fijada por la
/// disposición física de la trama, no por el orden de registro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubChannel {
    Gyroscope,
    Accelerometer,
    Magnetometer,
}

impl SubChannel {
    pub const ALL: [SubChannel; 3] = [
        SubChannel::Gyroscope,
        SubChannel::Accelerometer,
        SubChannel::Magnetometer,
    ];

    /// Bits de activación. El acelerómetro fija el rango ±4g.
    pub const fn enable_mask(self) -> ControlMask {
        match self {
            SubChannel::Gyroscope => ControlMask::new(GYRO_XYZ),
            SubChannel::Accelerometer => ControlMask::new(ACCEL_XYZ | ACCEL_RANGE_4G),
            SubChannel::Magnetometer => ControlMask::new(MAG_XYZ),
        }
    }

    /// Índices dentro de la tupla de 9 valores
    pub fn frame_slice(self) -> Range<usize> {
        match self {
            SubChannel::Gyroscope => 0..3,
            SubChannel::Accelerometer => 3..6,
            SubChannel::Magnetometer => 6..9,
        }
    }

    pub const fn scale(self) -> f64 {
        match self {
            SubChannel::Gyroscope => GYRO_SCALE,
            SubChannel::Accelerometer => ACCEL_SCALE_4G,
            SubChannel::Magnetometer => MAG_SCALE,
        }
    }

    /// Primer canal del buffer de ventana que ocupa este componente
    pub const fn window_channel(self) -> usize {
        match self {
            SubChannel::Gyroscope => GYRO_CHANNEL,
            SubChannel::Accelerometer => ACCEL_CHANNEL,
            SubChannel::Magnetometer => MAG_CHANNEL,
        }
    }

    /// Gyro en °/s, accel en g, mag en µT
    pub fn decode(self, raw: &MotionTuple) -> [f64; 3] {
        let scale = self.scale();
        let slice = &raw[self.frame_slice()];
        [
            slice[0] as f64 * scale,
            slice[1] as f64 * scale,
            slice[2] as f64 * scale,
        ]
    }
}

/// Servicio compuesto: agrega los componentes registrados en una sola escritura de control
#[derive(Debug, Clone)]
pub struct MotionService {
    id: ChannelId,
    period: u8,
    registered: Vec<SubChannel>,
    mask: ControlMask,
    /// Máscara enviada al hardware en el último `enable`
    issued: Option<ControlMask>,
}

impl MotionService {
    pub fn new() -> Self {
        Self::with_period(DEFAULT_PERIOD)
    }

    /// `period` en unidades de 10 ms
    pub fn with_period(period: u8) -> Self {
        Self {
            id: MOTION_ID,
            period,
            registered: Vec::new(),
            mask: ControlMask::EMPTY,
            issued: None,
        }
    }

    /// Añade un componente al final de la lista de registro. Registrar después
    /// de `enable` no cambia el estado del hardware hasta el siguiente `enable`.
    /// Un componente repetido se decodifica dos veces; la máscara no cambia.
    pub fn register(&mut self, sub: SubChannel) -> &mut Self {
        if self.registered.contains(&sub) {
            warn!(?sub, "Componente registrado dos veces");
        }
        if self.issued.is_some() {
            warn!(?sub, "Registro tras enable: no activo hasta volver a llamar a enable");
        }
        self.registered.push(sub);
        self.mask |= sub.enable_mask();
        self
    }

    pub fn registered(&self) -> &[SubChannel] {
        &self.registered
    }

    pub fn is_registered(&self, sub: SubChannel) -> bool {
        self.registered.contains(&sub)
    }

    /// Máscara acumulada de todos los componentes registrados
    pub fn control_mask(&self) -> ControlMask {
        self.mask
    }

    /// Máscara realmente escrita en el dispositivo, si se ha activado
    pub fn issued_mask(&self) -> Option<ControlMask> {
        self.issued
    }

    /// Decodifica la trama una vez y la reparte entre los componentes en orden de registro
    pub fn decode_segments(&self, raw: &[u8]) -> Result<Vec<(SubChannel, [f64; 3])>, SensorError> {
        let tuple = decode_motion_frame(raw)?;
        Ok(self
            .registered
            .iter()
            .map(|sub| (*sub, sub.decode(&tuple)))
            .collect())
    }

    pub fn read_segments<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
    ) -> Result<Vec<(SubChannel, [f64; 3])>, SensorError> {
        let raw = transport.read_characteristic(self.id.data())?;
        self.decode_segments(&raw)
    }
}

impl Default for MotionService {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorService for MotionService {
    fn id(&self) -> &ChannelId {
        &self.id
    }

    /// Periodo primero, después la máscara acumulada
    fn enable<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<&mut Self, SensorError> {
        transport.write_characteristic(self.id.period(), &[self.period])?;
        transport.write_characteristic(self.id.control(), &encode_control_word(self.mask.bits()))?;
        self.issued = Some(self.mask);
        info!(
            mask = %format!("{:#06x}", self.mask.bits()),
            components = ?self.registered,
            "Sensor de movimiento activado"
        );
        Ok(self)
    }

    fn disable<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), SensorError> {
        transport.write_characteristic(self.id.control(), &encode_control_word(0))?;
        self.issued = None;
        Ok(())
    }

    /// Longitud de salida = 3 × componentes registrados; vacío si no hay ninguno
    fn decode(&self, raw: &[u8]) -> Result<PhysicalSample, SensorError> {
        let values = self
            .decode_segments(raw)?
            .into_iter()
            .flat_map(|(_, segment)| segment)
            .collect();
        Ok(PhysicalSample::Vector(values))
    }
}
