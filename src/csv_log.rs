use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use csv::{ReaderBuilder, Writer};

use crate::types::{Timestep, CHANNEL_NAMES, NUM_CHANNELS};
use crate::window_buffer::Window;

const COLUMNS: usize = 2 + NUM_CHANNELS;

/// Escribe ventanas en CSV con el formato:
/// window,timestep,accel_x,accel_y,accel_z,gyro_x,gyro_y,gyro_z,mag_x,mag_y,mag_z,pressure
pub struct CsvRecorder<W: Write = File> {
    writer: Writer<W>,
    next_window: u64,
}

impl CsvRecorder<File> {
    /// Crea (o trunca) el fichero y escribe la cabecera
    pub fn create(path: impl AsRef<Path>) -> Result<Self, csv::Error> {
        Self::from_writer(File::create(path)?)
    }
}

impl<W: Write> CsvRecorder<W> {
    pub fn from_writer(inner: W) -> Result<Self, csv::Error> {
        let mut writer = Writer::from_writer(inner);
        let mut header = vec!["window", "timestep"];
        header.extend(CHANNEL_NAMES);
        writer.write_record(&header)?;
        writer.flush()?;
        Ok(Self {
            writer,
            next_window: 0,
        })
    }

    /// Añade una ventana; cada instante es una fila
    pub fn record(&mut self, timesteps: &[Timestep]) -> Result<(), csv::Error> {
        for (t, step) in timesteps.iter().enumerate() {
            let mut row = Vec::with_capacity(COLUMNS);
            row.push(self.next_window.to_string());
            row.push(t.to_string());
            row.extend(step.iter().map(|v| v.to_string()));
            self.writer.write_record(&row)?;
        }
        // Cada ventana queda en disco aunque el proceso muera después
        self.writer.flush()?;
        self.next_window += 1;
        Ok(())
    }

    pub fn windows_recorded(&self) -> u64 {
        self.next_window
    }
}

/// Carga todas las ventanas de un CSV grabado por `CsvRecorder`.
/// Todas deben tener el mismo número de instantes, numerados desde 0 sin huecos.
pub fn load_windows(path: impl AsRef<Path>) -> Result<Vec<Window>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Cannot open CSV {:?}", path))?;

    let mut windows: BTreeMap<u64, BTreeMap<usize, Timestep>> = BTreeMap::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Invalid row {} in {:?}", row_idx + 1, path))?;
        if record.len() != COLUMNS {
            bail!(
                "Row {} has {} columns, expected {}",
                row_idx + 1,
                record.len(),
                COLUMNS
            );
        }

        let window: u64 = record[0]
            .parse()
            .with_context(|| format!("Invalid window index in row {}", row_idx + 1))?;
        let timestep: usize = record[1]
            .parse()
            .with_context(|| format!("Invalid timestep in row {}", row_idx + 1))?;

        let mut values = [0.0f64; NUM_CHANNELS];
        for (c, value) in values.iter_mut().enumerate() {
            *value = record[2 + c].parse().with_context(|| {
                format!("Invalid {} value in row {}", CHANNEL_NAMES[c], row_idx + 1)
            })?;
        }

        if windows.entry(window).or_default().insert(timestep, values).is_some() {
            bail!("Duplicated timestep {} in window {}", timestep, window);
        }
    }

    ensure!(!windows.is_empty(), "CSV {:?} contains no windows", path);

    let mut expected_len = None;
    let mut loaded = Vec::with_capacity(windows.len());
    for (window_idx, steps) in windows {
        let len = steps.len();
        ensure!(
            steps.keys().copied().eq(0..len),
            "Window {} has gaps in its timesteps",
            window_idx
        );
        let expected = *expected_len.get_or_insert(len);
        ensure!(
            len == expected,
            "Window {} has {} timesteps, expected {}",
            window_idx,
            len,
            expected
        );
        loaded.push(Window::from_timesteps(steps.into_values().collect()));
    }

    Ok(loaded)
}
