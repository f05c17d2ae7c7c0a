//! Adquisición de telemetría de movimiento y presión de un SensorTag por BLE.
//!
//! Las tramas binarias de cada sensor se decodifican a unidades físicas, se
//! agrupan en ventanas de N instantes × 10 canales y cada ventana completa se
//! entrega a un publicador (MQTT) para inferencia.

pub mod acquisition;
pub mod barometer;
pub mod ble;
pub mod config;
pub mod csv_log;
pub mod error;
pub mod frame_codec;
pub mod movement;
pub mod publisher;
pub mod sensor;
pub mod types;
pub mod window_buffer;
