use crate::types::{Timestep, CHANNEL_NAMES, NUM_CHANNELS, PUBLISH_ORDER};

/// Ventana completa de N instantes × 10 canales, en orden de publicación
/// [accel_x, accel_y, accel_z, gyro_x, gyro_y, gyro_z, mag_x, mag_y, mag_z, pressure]
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    timesteps: Vec<Timestep>,
}

impl Window {
    pub fn from_timesteps(timesteps: Vec<Timestep>) -> Self {
        Self { timesteps }
    }

    pub fn timesteps(&self) -> &[Timestep] {
        &self.timesteps
    }

    pub fn len(&self) -> usize {
        self.timesteps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timesteps.is_empty()
    }

    /// Serie temporal de un canal (índice en orden de publicación);
    /// `None` fuera de los 10 canales
    pub fn channel(&self, idx: usize) -> Option<Vec<f64>> {
        if idx >= NUM_CHANNELS {
            return None;
        }
        Some(self.timesteps.iter().map(|t| t[idx]).collect())
    }

    /// Serie temporal por nombre, p.ej. `"accel_x"` o `"pressure"`
    pub fn channel_by_name(&self, name: &str) -> Option<Vec<f64>> {
        CHANNEL_NAMES
            .iter()
            .position(|n| *n == name)
            .and_then(|idx| self.channel(idx))
    }
}

/// Acumulador multicanal de capacidad fija.
///
/// Internamente los canales siguen el orden del sensor de movimiento
/// (0–2 giro, 3–5 accel, 6–8 mag, 9 presión); la ventana emitida se
/// reordena a orden de publicación. Sin estado entre ventanas.
pub struct WindowBuffer {
    channels: [Vec<f64>; NUM_CHANNELS],
    window_size: usize,
}

impl WindowBuffer {
    pub fn new(window_size: usize) -> Self {
        Self {
            channels: std::array::from_fn(|_| Vec::with_capacity(window_size)),
            window_size,
        }
    }

    /// Añade una muestra a un canal. Devuelve `false` (y la descarta)
    /// si el canal no existe o ya tiene la ventana completa.
    pub fn push(&mut self, channel: usize, value: f64) -> bool {
        let Some(seq) = self.channels.get_mut(channel) else {
            return false;
        };
        if seq.len() >= self.window_size {
            return false;
        }
        seq.push(value);
        true
    }

    /// Longitud actual de un canal; `None` si no existe
    pub fn channel_len(&self, channel: usize) -> Option<usize> {
        self.channels.get(channel).map(Vec::len)
    }

    /// Número de instantes completos (mínimo entre canales)
    pub fn len(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.channels.iter().all(Vec::is_empty)
    }

    /// Todos los canales tienen exactamente `window_size` muestras
    pub fn is_ready(&self) -> bool {
        self.channels.iter().all(|c| c.len() == self.window_size)
    }

    /// Si la ventana está completa la devuelve y vacía todos los canales
    pub fn take_window(&mut self) -> Option<Window> {
        if !self.is_ready() {
            return None;
        }

        let timesteps: Vec<Timestep> = (0..self.window_size)
            .map(|t| std::array::from_fn(|i| self.channels[PUBLISH_ORDER[i]][t]))
            .collect();
        self.clear();
        Some(Window::from_timesteps(timesteps))
    }

    /// Descarta la ventana parcial
    pub fn clear(&mut self) {
        for channel in self.channels.iter_mut() {
            channel.clear();
        }
    }
}
