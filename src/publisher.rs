use std::fmt;
use std::fs::File;
use std::io::Write;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::csv_log::CsvRecorder;
use crate::error::{DecodeError, PublishError, TransportError};
use crate::types::Timestep;
use crate::window_buffer::Window;

/// Mensaje publicado por ventana: `{"data": [[[accel_x, …, pressure], …]]}`.
/// Forma 1 × N × 10: los 10 canales apilados en la tercera dimensión.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowPayload {
    pub data: Vec<Vec<Timestep>>,
}

impl WindowPayload {
    pub fn from_window(window: &Window) -> Self {
        Self {
            data: vec![window.timesteps().to_vec()],
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Destino de las ventanas completas
pub trait Publisher {
    fn publish(&mut self, payload: &WindowPayload) -> Result<(), PublishError>;
}

impl<P: Publisher + ?Sized> Publisher for &mut P {
    fn publish(&mut self, payload: &WindowPayload) -> Result<(), PublishError> {
        (**self).publish(payload)
    }
}

/// Respuesta del servicio de inferencia
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Prediction {
    pub prediction: serde_json::Value,
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prediction {
            serde_json::Value::String(label) => write!(f, "{}", label),
            other => write!(f, "{}", other),
        }
    }
}

/// Publica por MQTT y recibe las predicciones por el mismo tópico
pub struct MqttPublisher {
    client: Client,
    topic: String,
    predictions: Receiver<Prediction>,
    _event_loop: JoinHandle<()>,
}

impl MqttPublisher {
    pub fn connect(broker: &str, port: u16, topic: &str) -> Result<Self, PublishError> {
        let client_id = format!("sensortag-{}", std::process::id());
        let mut options = MqttOptions::new(client_id, broker, port);
        options.set_keep_alive(Duration::from_secs(5));

        let (client, connection) = Client::new(options, 10);
        client.subscribe(topic, QoS::AtMostOnce)?;

        let (tx, rx) = unbounded::<Prediction>();
        let event_loop = thread::spawn(move || forward_predictions(connection, tx));
        info!(broker, port, topic, "Cliente MQTT iniciado");

        Ok(Self {
            client,
            topic: topic.to_string(),
            predictions: rx,
            _event_loop: event_loop,
        })
    }

    /// Bloquea hasta recibir una predicción o agotar `timeout`
    pub fn wait_prediction(&self, timeout: Duration) -> Result<Prediction, TransportError> {
        wait_prediction(&self.predictions, timeout)
    }

    pub fn disconnect(&mut self) -> Result<(), PublishError> {
        self.client.disconnect()?;
        Ok(())
    }
}

impl Publisher for MqttPublisher {
    fn publish(&mut self, payload: &WindowPayload) -> Result<(), PublishError> {
        let bytes = payload.to_json()?;
        debug!(bytes = bytes.len(), topic = %self.topic, "Publicando ventana");
        self.client
            .publish(self.topic.as_str(), QoS::AtLeastOnce, false, bytes)?;
        Ok(())
    }
}

/// Espera acotada sobre el canal de predicciones
pub fn wait_prediction(
    predictions: &Receiver<Prediction>,
    timeout: Duration,
) -> Result<Prediction, TransportError> {
    match predictions.recv_timeout(timeout) {
        Ok(prediction) => Ok(prediction),
        Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected(
            "MQTT event loop stopped".to_string(),
        )),
    }
}

/// Mensaje entrante del tópico: `Some` si trae `"prediction"`, `None` si es
/// otro JSON (p.ej. el eco de una ventana propia).
pub fn parse_prediction(payload: &[u8]) -> Result<Option<Prediction>, DecodeError> {
    let value: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| DecodeError::MalformedResponse(e.to_string()))?;
    if value.get("prediction").is_none() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| DecodeError::MalformedResponse(e.to_string()))
}

/// Conduce el bucle de eventos MQTT y reenvía los mensajes con `"prediction"`.
/// Las propias ventanas publicadas vuelven por el mismo tópico y se ignoran.
fn forward_predictions(mut connection: Connection, tx: Sender<Prediction>) {
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::Publish(msg))) => {
                match parse_prediction(&msg.payload) {
                    Ok(Some(prediction)) => {
                        if tx.send(prediction).is_err() {
                            return;
                        }
                    }
                    Ok(None) => debug!(topic = %msg.topic, "Mensaje sin predicción ignorado"),
                    Err(e) => warn!(topic = %msg.topic, "Respuesta descartada: {}", e),
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => info!("Conectado al broker MQTT"),
            Ok(_) => {}
            Err(e) => {
                warn!("Bucle MQTT terminado: {}", e);
                return;
            }
        }
    }
}

/// Reenvía las ventanas a un canal en proceso
pub struct ChannelPublisher {
    tx: Sender<WindowPayload>,
}

impl ChannelPublisher {
    pub fn new(tx: Sender<WindowPayload>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, Receiver<WindowPayload>) {
        let (tx, rx) = unbounded();
        (Self::new(tx), rx)
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&mut self, payload: &WindowPayload) -> Result<(), PublishError> {
        self.tx
            .send(payload.clone())
            .map_err(|_| PublishError::ChannelClosed)
    }
}

/// Guarda cada ventana en CSV antes de pasarla al publicador interior
pub struct RecordingPublisher<P, W: Write = File> {
    inner: P,
    recorder: CsvRecorder<W>,
}

impl<P: Publisher, W: Write> RecordingPublisher<P, W> {
    pub fn new(inner: P, recorder: CsvRecorder<W>) -> Self {
        Self { inner, recorder }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut P {
        &mut self.inner
    }
}

impl<P: Publisher, W: Write> Publisher for RecordingPublisher<P, W> {
    fn publish(&mut self, payload: &WindowPayload) -> Result<(), PublishError> {
        for batch in &payload.data {
            self.recorder.record(batch)?;
        }
        self.inner.publish(payload)
    }
}
