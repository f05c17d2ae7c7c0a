/*
Adquisición SensorTag -> MQTT

Sistema que:
1. Conecta por BLE (BlueZ/D-Bus) con un SensorTag CC2650
2. Activa barómetro y sensor de movimiento (giro + accel ±4g + mag)
3. Recoge ventanas de N instantes × 10 canales
4. Publica cada ventana en MQTT y espera la predicción del servicio de inferencia

La MAC del dispositivo se lee de sensortag_addr.txt (una línea).

Para ejecutar:
    echo "B0:B4:48:C9:74:80" > sensortag_addr.txt
    RUST_LOG=info ./target/release/sensortag --windows 10 --record ventanas.csv
*/

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use sensortag::acquisition::AcquisitionLoop;
use sensortag::barometer::Barometer;
use sensortag::ble::BluezTransport;
use sensortag::config::{load_address, DaemonArgs};
use sensortag::csv_log::CsvRecorder;
use sensortag::movement::{MotionService, SubChannel};
use sensortag::publisher::{MqttPublisher, Publisher, RecordingPublisher};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let args = DaemonArgs::parse();

    println!("🎯 SensorTag -> MQTT\n");

    let address = load_address(&args.addr_file)?;
    println!("🎯 Objetivo BLE: {}", address);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        stop_handler.store(true, Ordering::SeqCst);
    })
    .context("Cannot install Ctrl+C handler")?;

    let mqtt = MqttPublisher::connect(&args.mqtt.broker, args.mqtt.port, &args.mqtt.topic)
        .context("Cannot start MQTT client")?;

    let mut transport = BluezTransport::connect(&args.adapter, &address)
        .with_context(|| format!("Cannot connect to {}", address))?;
    println!("✅ Conectado a {}", address);

    let barometer = Barometer::with_period(args.period);
    let mut motion = MotionService::with_period(args.period);
    motion
        .register(SubChannel::Accelerometer)
        .register(SubChannel::Gyroscope)
        .register(SubChannel::Magnetometer);

    let mut acquisition = AcquisitionLoop::new(barometer, motion, args.timesteps)?;
    acquisition.enable_sensors(&mut transport)?;
    println!("✅ Sensores activados\n");

    match &args.record {
        Some(path) => {
            let recorder = CsvRecorder::create(path)
                .with_context(|| format!("Cannot create {:?}", path))?;
            info!(path = ?path, "Grabando ventanas en CSV");
            let mut publisher = RecordingPublisher::new(mqtt, recorder);
            acquire(&args, &mut acquisition, &mut transport, &mut publisher, &stop)?;
            publisher.inner_mut().disconnect()?;
        }
        None => {
            let mut publisher = mqtt;
            acquire(&args, &mut acquisition, &mut transport, &mut publisher, &stop)?;
            publisher.disconnect()?;
        }
    }

    if let Err(e) = acquisition.disable_sensors(&mut transport) {
        warn!("No se pudieron desactivar los sensores: {}", e);
    }
    transport.disconnect()?;
    println!("\n👋 Saliendo...");
    Ok(())
}

/// Acceso al cliente MQTT, con o sin grabación CSV delante
trait PredictionSource: Publisher {
    fn mqtt(&self) -> &MqttPublisher;
}

impl PredictionSource for MqttPublisher {
    fn mqtt(&self) -> &MqttPublisher {
        self
    }
}

impl PredictionSource for RecordingPublisher<MqttPublisher> {
    fn mqtt(&self) -> &MqttPublisher {
        self.inner()
    }
}

fn acquire<P: PredictionSource>(
    args: &DaemonArgs,
    acquisition: &mut AcquisitionLoop,
    transport: &mut BluezTransport,
    publisher: &mut P,
    stop: &AtomicBool,
) -> Result<()> {
    let timeout = args.mqtt.prediction_timeout();
    println!("🖐️  Realiza la acción durante 3 segundos...");

    let result = acquisition.run(transport, publisher, args.windows, stop, |publisher, window| {
        println!("📤 Ventana publicada ({} instantes)", window.len());
        let prediction = publisher.mqtt().wait_prediction(timeout)?;
        println!("🎯 Predicción: {}", prediction);
        if !stop.load(Ordering::SeqCst) {
            println!("🖐️  Realiza la acción durante 3 segundos...");
        }
        Ok(())
    });

    match result {
        Ok(published) => {
            info!(published, "Adquisición terminada");
            Ok(())
        }
        Err(e) => {
            error!("Adquisición abortada: {}", e);
            Err(e.into())
        }
    }
}
