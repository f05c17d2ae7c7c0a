use std::ops::{BitOr, BitOrAssign};

use crate::ble::Transport;
use crate::error::SensorError;

/// Identidad de un sensor físico: sus tres características GATT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId {
    data: &'static str,
    control: &'static str,
    period: &'static str,
}

impl ChannelId {
    pub const fn new(data: &'static str, control: &'static str, period: &'static str) -> Self {
        Self {
            data,
            control,
            period,
        }
    }

    pub fn data(&self) -> &'static str {
        self.data
    }

    pub fn control(&self) -> &'static str {
        self.control
    }

    pub fn period(&self) -> &'static str {
        self.period
    }
}

/// Máscara de bits escrita en la característica de control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlMask(u16);

impl ControlMask {
    pub const EMPTY: ControlMask = ControlMask(0);

    pub const fn new(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: ControlMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ControlMask {
    type Output = ControlMask;

    fn bitor(self, rhs: ControlMask) -> ControlMask {
        ControlMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for ControlMask {
    fn bitor_assign(&mut self, rhs: ControlMask) {
        self.0 |= rhs.0;
    }
}

/// Una lectura decodificada
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicalSample {
    /// Presión en hPa
    Scalar(f64),
    /// Segmentos de 3 ejes concatenados en orden de registro
    Vector(Vec<f64>),
}

/// Servicio de sensor del SensorTag: activación, desactivación y decodificación.
///
/// Los métodos son genéricos sobre el transporte para que el despacho sea estático.
pub trait SensorService {
    fn id(&self) -> &ChannelId;

    /// Activa el sensor y configura su periodo de muestreo
    fn enable<T: Transport + ?Sized>(&mut self, transport: &mut T)
        -> Result<&mut Self, SensorError>;

    /// Escribe el valor de control nulo
    fn disable<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), SensorError>;

    fn decode(&self, raw: &[u8]) -> Result<PhysicalSample, SensorError>;

    /// Una única lectura de la característica de datos seguida de `decode`
    fn read<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<PhysicalSample, SensorError> {
        let raw = transport.read_characteristic(self.id().data())?;
        self.decode(&raw)
    }
}
