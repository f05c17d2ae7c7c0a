//! Decodificación de tramas binarias del SensorTag. Sin E/S.

use crate::error::FrameLengthError;
use crate::types::{MOTION_FRAME_LEN, MOTION_FRAME_VALUES, PRESSURE_FRAME_LEN};

/// 9 enteros con signo: [gx, gy, gz, ax, ay, az, mx, my, mz]
pub type MotionTuple = [i16; MOTION_FRAME_VALUES];

/// Decodifica 18 bytes little-endian en 9 valores i16
pub fn decode_motion_frame(raw: &[u8]) -> Result<MotionTuple, FrameLengthError> {
    if raw.len() != MOTION_FRAME_LEN {
        return Err(FrameLengthError {
            sensor: "motion",
            expected: MOTION_FRAME_LEN,
            actual: raw.len(),
        });
    }

    let mut values = [0i16; MOTION_FRAME_VALUES];
    for (value, chunk) in values.iter_mut().zip(raw.chunks_exact(2)) {
        *value = i16::from_le_bytes([chunk[0], chunk[1]]);
    }
    Ok(values)
}

/// Inversa de `decode_motion_frame`
pub fn encode_motion_frame(values: &MotionTuple) -> [u8; MOTION_FRAME_LEN] {
    let mut raw = [0u8; MOTION_FRAME_LEN];
    for (chunk, value) in raw.chunks_exact_mut(2).zip(values.iter()) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
    raw
}

/// Trama del barómetro: [tL, tM, tH, pL, pM, pH]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressureFrame {
    bytes: [u8; PRESSURE_FRAME_LEN],
}

impl PressureFrame {
    pub fn from_bytes(bytes: [u8; PRESSURE_FRAME_LEN]) -> Self {
        Self { bytes }
    }

    /// Compuesto de 24 bits de la presión (pH*65536 + pM*256 + pL)
    pub fn pressure_raw(&self) -> u32 {
        compose_u24(self.bytes[3], self.bytes[4], self.bytes[5])
    }

    /// Presión en hPa
    pub fn pressure_hpa(&self) -> f64 {
        self.pressure_raw() as f64 / 100.0
    }

    /// Temperatura en °C; el flujo de adquisición no la usa
    pub fn temperature_c(&self) -> f64 {
        compose_u24(self.bytes[0], self.bytes[1], self.bytes[2]) as f64 / 100.0
    }
}

fn compose_u24(low: u8, mid: u8, high: u8) -> u32 {
    (high as u32) * 65536 + (mid as u32) * 256 + low as u32
}

pub fn decode_pressure_frame(raw: &[u8]) -> Result<PressureFrame, FrameLengthError> {
    let bytes: [u8; PRESSURE_FRAME_LEN] = raw.try_into().map_err(|_| FrameLengthError {
        sensor: "barometer",
        expected: PRESSURE_FRAME_LEN,
        actual: raw.len(),
    })?;
    Ok(PressureFrame::from_bytes(bytes))
}

/// Palabra de control de 16 bits en little-endian
pub fn encode_control_word(bits: u16) -> [u8; 2] {
    bits.to_le_bytes()
}
