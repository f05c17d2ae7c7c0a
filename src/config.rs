use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser};

use crate::ble::validate_address;
use crate::types::{DEFAULT_ADDR_FILE, DEFAULT_PERIOD, DEFAULT_TIMESTEPS, DEFAULT_TOPIC};

/// Conexión con el broker MQTT de inferencia
#[derive(Args, Debug, Clone)]
pub struct BrokerArgs {
    /// Host del broker MQTT
    #[arg(long, default_value = "127.0.0.1")]
    pub broker: String,

    /// Puerto del broker MQTT
    #[arg(long, default_value_t = 1883)]
    pub port: u16,

    /// Tópico de ventanas y predicciones
    #[arg(long, default_value = DEFAULT_TOPIC)]
    pub topic: String,

    /// Segundos de espera por cada predicción
    #[arg(long, default_value_t = 10)]
    pub prediction_timeout: u64,
}

impl BrokerArgs {
    pub fn prediction_timeout(&self) -> Duration {
        Duration::from_secs(self.prediction_timeout)
    }
}

#[derive(Parser, Debug)]
#[command(name = "sensortag", about = "Adquisición SensorTag -> ventanas MQTT")]
pub struct DaemonArgs {
    /// Fichero con la MAC del SensorTag (una línea)
    #[arg(long, default_value = DEFAULT_ADDR_FILE)]
    pub addr_file: PathBuf,

    /// Adaptador BlueZ
    #[arg(long, default_value = "hci0")]
    pub adapter: String,

    /// Instantes por ventana
    #[arg(long, default_value_t = DEFAULT_TIMESTEPS)]
    pub timesteps: usize,

    /// Ventanas a publicar (0 = hasta Ctrl+C)
    #[arg(long, default_value_t = 0)]
    pub windows: u64,

    /// Periodo de muestreo en unidades de 10 ms
    #[arg(long, default_value_t = DEFAULT_PERIOD)]
    pub period: u8,

    /// Grabar cada ventana publicada en este CSV
    #[arg(long)]
    pub record: Option<PathBuf>,

    #[command(flatten)]
    pub mqtt: BrokerArgs,
}

/// Lee la MAC del periférico: primera línea no vacía, sin espacios alrededor
pub fn load_address(path: &Path) -> Result<String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(anyhow!(
                "No file named {:?}: create it and write the SensorTag MAC address",
                path
            ));
        }
        Err(e) => return Err(e).with_context(|| format!("Cannot read {:?}", path)),
    };

    let address = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| anyhow!("Address file {:?} is empty", path))?;

    validate_address(address)?;
    Ok(address.to_string())
}
