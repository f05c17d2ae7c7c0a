/// Características GATT del SensorTag (CC2650).
/// Movimiento (MPU-9250): datos / control / periodo
pub const MOTION_DATA_UUID: &str = "f000aa81-0451-4000-b000-000000000000";
pub const MOTION_CTRL_UUID: &str = "f000aa82-0451-4000-b000-000000000000";
pub const MOTION_PERIOD_UUID: &str = "f000aa83-0451-4000-b000-000000000000";

/// Barómetro: datos / control / periodo
pub const BARO_DATA_UUID: &str = "f000aa41-0451-4000-b000-000000000000";
pub const BARO_CTRL_UUID: &str = "f000aa42-0451-4000-b000-000000000000";
pub const BARO_PERIOD_UUID: &str = "f000aa44-0451-4000-b000-000000000000";

/// Tamaño fijo de cada trama
pub const MOTION_FRAME_LEN: usize = 18;
pub const MOTION_FRAME_VALUES: usize = 9;
pub const PRESSURE_FRAME_LEN: usize = 6;

/// Bits del registro de control de movimiento
pub const GYRO_XYZ: u16 = 7;
pub const ACCEL_XYZ: u16 = 7 << 3;
pub const MAG_XYZ: u16 = 1 << 6;
pub const ACCEL_RANGE_2G: u16 = 0 << 8;
pub const ACCEL_RANGE_4G: u16 = 1 << 8;
pub const ACCEL_RANGE_8G: u16 = 2 << 8;
pub const ACCEL_RANGE_16G: u16 = 3 << 8;

/// Escalas del datasheet (unidad física por LSB)
pub const GYRO_SCALE: f64 = 500.0 / 65536.0; // °/s
pub const ACCEL_SCALE_4G: f64 = 8.0 / 32768.0; // g, rango ±4g
pub const MAG_SCALE: f64 = 4912.0 / 32760.0; // µT

/// Byte de activación para sensores de un solo bit
pub const SENSOR_ON: u8 = 0x01;
pub const SENSOR_OFF: u8 = 0x00;

/// Periodo de muestreo en unidades de 10 ms (0x0A = 100 ms, 10 Hz)
pub const DEFAULT_PERIOD: u8 = 0x0A;

/// Canales lógicos de la ventana, en orden de publicación
pub const NUM_CHANNELS: usize = 10;
pub const CHANNEL_NAMES: [&str; NUM_CHANNELS] = [
    "accel_x", "accel_y", "accel_z", "gyro_x", "gyro_y", "gyro_z", "mag_x", "mag_y", "mag_z",
    "pressure",
];

/// Índice del primer eje de cada grupo dentro del buffer de ventana
pub const GYRO_CHANNEL: usize = 0;
pub const ACCEL_CHANNEL: usize = 3;
pub const MAG_CHANNEL: usize = 6;
pub const PRESSURE_CHANNEL: usize = 9;

/// Buffer (giro, accel, mag, presión) -> orden publicado (accel, giro, mag, presión).
/// `PUBLISH_ORDER[i]` es el canal del buffer que ocupa la posición `i` publicada.
pub const PUBLISH_ORDER: [usize; NUM_CHANNELS] = [3, 4, 5, 0, 1, 2, 6, 7, 8, 9];

/// Un instante de la ventana en orden de publicación
pub type Timestep = [f64; NUM_CHANNELS];

/// Constantes del sistema
pub const DEFAULT_TIMESTEPS: usize = 5;
pub const DEFAULT_TOPIC: &str = "Group_22/LSTM";
pub const DEFAULT_ADDR_FILE: &str = "sensortag_addr.txt";
