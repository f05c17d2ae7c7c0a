use std::time::Duration;

use thiserror::Error;

use crate::movement::SubChannel;

/// Fallos en la frontera con el hardware (D-Bus/BlueZ) o con el broker.
/// Nunca se reintentan en este nivel.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("D-Bus error: {0}")]
    Dbus(#[from] dbus::Error),

    #[error("Characteristic {0} not found on device")]
    CharacteristicNotFound(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Disconnected: {0}")]
    Disconnected(String),

    #[error("Invalid device address: {0}")]
    InvalidAddress(String),
}

/// La trama leída no tiene el tamaño fijo del sensor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {sensor} frame length: expected {expected} bytes, got {actual}")]
pub struct FrameLengthError {
    pub sensor: &'static str,
    pub expected: usize,
    pub actual: usize,
}

/// Valor malformado después de validar la longitud
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Motion decode produced {actual} values, expected {expected}")]
    SegmentMismatch { expected: usize, actual: usize },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Resultado de cualquier operación de un `SensorService`
#[derive(Error, Debug)]
pub enum SensorError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    FrameLength(#[from] FrameLengthError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Publish channel closed")]
    ChannelClosed,
}

/// Aborta la ventana en curso; nunca hay publicación parcial
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Motion service is missing the {0:?} sub-channel")]
    IncompleteLayout(SubChannel),

    #[error("Motion service has the {0:?} sub-channel registered more than once")]
    DuplicateSubChannel(SubChannel),

    #[error("Window length must be at least 1 timestep")]
    EmptyWindow,
}

impl From<TransportError> for AcquisitionError {
    fn from(e: TransportError) -> Self {
        AcquisitionError::Sensor(SensorError::Transport(e))
    }
}
