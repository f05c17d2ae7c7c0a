use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;

use sensortag::config::BrokerArgs;
use sensortag::csv_log::load_windows;
use sensortag::publisher::{MqttPublisher, Publisher, WindowPayload};

/// Vuelve a publicar ventanas grabadas con `sensortag --record`
#[derive(Parser, Debug)]
#[command(name = "replay_csv")]
struct ReplayArgs {
    /// CSV grabado (window,timestep,accel_x,…,pressure)
    csv: PathBuf,

    /// Pausa entre ventanas en milisegundos
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// No esperar la predicción tras cada ventana
    #[arg(long)]
    no_wait: bool,

    #[command(flatten)]
    mqtt: BrokerArgs,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    let args = ReplayArgs::parse();

    println!("🎞️  Reproduciendo ventanas desde {:?}", args.csv);
    let windows = load_windows(&args.csv)?;
    println!("ℹ️  {} ventanas de {} instantes", windows.len(), windows[0].len());

    let mut publisher = MqttPublisher::connect(&args.mqtt.broker, args.mqtt.port, &args.mqtt.topic)
        .context("Cannot start MQTT client")?;
    let timeout = args.mqtt.prediction_timeout();

    for (idx, window) in windows.iter().enumerate() {
        publisher
            .publish(&WindowPayload::from_window(window))
            .with_context(|| format!("Cannot publish window {}", idx))?;
        println!("📤 Ventana {} publicada", idx);

        if !args.no_wait {
            match publisher.wait_prediction(timeout) {
                Ok(prediction) => println!("🎯 Ventana {}: {}", idx, prediction),
                Err(e) => warn!(window = idx, "Sin predicción: {}", e),
            }
        }

        if args.delay_ms > 0 {
            thread::sleep(Duration::from_millis(args.delay_ms));
        }
    }

    publisher.disconnect()?;
    println!("✅ Reproducción terminada");
    Ok(())
}
