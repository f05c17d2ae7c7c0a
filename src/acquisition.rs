use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::barometer::Barometer;
use crate::ble::Transport;
use crate::error::{AcquisitionError, DecodeError, SensorError};
use crate::movement::{MotionService, SubChannel};
use crate::publisher::{Publisher, WindowPayload};
use crate::sensor::{PhysicalSample, SensorService};
use crate::types::PRESSURE_CHANNEL;
use crate::window_buffer::{Window, WindowBuffer};

/// Estados del bucle de adquisición
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    /// Sin muestras
    Idle,
    /// Acumulando instantes
    Collecting,
    /// Todos los canales tienen N muestras
    Full,
    /// Ventana entregada y buffer vaciado
    Flushed,
}

/// Bucle de adquisición: barómetro + movimiento -> buffer -> publicador.
///
/// Las lecturas de cada instante son estrictamente secuenciales (barómetro y
/// luego movimiento) porque comparten un único enlace BLE.
pub struct AcquisitionLoop {
    barometer: Barometer,
    motion: MotionService,
    buffer: WindowBuffer,
    state: AcquisitionState,
    windows_published: u64,
}

impl AcquisitionLoop {
    /// El servicio de movimiento debe tener registrados giro, accel y mag:
    /// sin ellos la ventana de 10 canales nunca se completaría.
    pub fn new(
        barometer: Barometer,
        motion: MotionService,
        timesteps: usize,
    ) -> Result<Self, AcquisitionError> {
        if timesteps == 0 {
            return Err(AcquisitionError::EmptyWindow);
        }
        if let Some(missing) = SubChannel::ALL
            .into_iter()
            .find(|sub| !motion.is_registered(*sub))
        {
            return Err(AcquisitionError::IncompleteLayout(missing));
        }
        if let Some(repeated) = SubChannel::ALL
            .into_iter()
            .find(|sub| motion.registered().iter().filter(|r| *r == sub).count() > 1)
        {
            return Err(AcquisitionError::DuplicateSubChannel(repeated));
        }

        Ok(Self {
            barometer,
            motion,
            buffer: WindowBuffer::new(timesteps),
            state: AcquisitionState::Idle,
            windows_published: 0,
        })
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn buffer(&self) -> &WindowBuffer {
        &self.buffer
    }

    pub fn windows_published(&self) -> u64 {
        self.windows_published
    }

    /// Activa ambos servicios (barómetro primero)
    pub fn enable_sensors<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<(), SensorError> {
        self.barometer.enable(transport)?;
        self.motion.enable(transport)?;
        Ok(())
    }

    pub fn disable_sensors<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<(), SensorError> {
        self.barometer.disable(transport)?;
        self.motion.disable(transport)?;
        Ok(())
    }

    /// Un instante: una lectura de barómetro y una de movimiento.
    /// Cualquier fallo descarta la ventana en curso.
    pub fn tick<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), AcquisitionError> {
        self.state = AcquisitionState::Collecting;

        if let Err(e) = self.read_tick(transport) {
            warn!(collected = self.buffer.len(), "Ventana abortada: {}", e);
            self.buffer.clear();
            self.state = AcquisitionState::Idle;
            return Err(e);
        }

        if self.buffer.is_ready() {
            self.state = AcquisitionState::Full;
        }
        Ok(())
    }

    fn read_tick<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), AcquisitionError> {
        let pressure = match self.barometer.read(transport)? {
            PhysicalSample::Scalar(hpa) => hpa,
            other => {
                return Err(SensorError::from(DecodeError::MalformedResponse(format!(
                    "barometer produced {:?}",
                    other
                )))
                .into())
            }
        };
        let segments = self.motion.read_segments(transport)?;

        let expected = 3 * SubChannel::ALL.len();
        let actual = 3 * segments.len();
        if actual != expected {
            return Err(SensorError::from(DecodeError::SegmentMismatch { expected, actual }).into());
        }

        // Enrutado por tipo de componente, no por posición en el registro
        self.buffer.push(PRESSURE_CHANNEL, pressure);
        for (sub, values) in segments {
            let base = sub.window_channel();
            for (axis, value) in values.into_iter().enumerate() {
                self.buffer.push(base + axis, value);
            }
        }
        debug!(timestep = self.buffer.len(), pressure, "Instante recogido");
        Ok(())
    }

    /// Recoge N instantes y devuelve la ventana.
    /// La señal de parada solo se consulta entre instantes; si está activa la
    /// ventana parcial se descarta y se devuelve `None`.
    pub fn collect_window<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        stop: &AtomicBool,
    ) -> Result<Option<Window>, AcquisitionError> {
        loop {
            if let Some(window) = self.buffer.take_window() {
                self.state = AcquisitionState::Flushed;
                return Ok(Some(window));
            }
            if stop.load(Ordering::SeqCst) {
                if !self.buffer.is_empty() {
                    info!(discarded = self.buffer.len(), "Parada: ventana parcial descartada");
                }
                self.buffer.clear();
                self.state = AcquisitionState::Idle;
                return Ok(None);
            }
            self.tick(transport)?;
        }
    }

    /// Recoge una ventana y la publica. Única vía de emisión.
    pub fn run_window<T: Transport + ?Sized, P: Publisher + ?Sized>(
        &mut self,
        transport: &mut T,
        publisher: &mut P,
        stop: &AtomicBool,
    ) -> Result<Option<Window>, AcquisitionError> {
        let Some(window) = self.collect_window(transport, stop)? else {
            return Ok(None);
        };

        if let Err(e) = publisher.publish(&WindowPayload::from_window(&window)) {
            warn!("Ventana no publicada: {}", e);
            self.state = AcquisitionState::Idle;
            return Err(e.into());
        }
        self.windows_published += 1;
        self.state = AcquisitionState::Collecting;
        info!(
            window = self.windows_published,
            timesteps = window.len(),
            "Ventana publicada"
        );
        Ok(Some(window))
    }

    /// Publica hasta `max_windows` ventanas (0 = sin límite) o hasta la parada.
    /// `after_publish` se llama tras cada ventana publicada; un error suyo corta el bucle.
    /// Devuelve cuántas ventanas se publicaron en esta llamada.
    pub fn run<T, P, F>(
        &mut self,
        transport: &mut T,
        publisher: &mut P,
        max_windows: u64,
        stop: &AtomicBool,
        mut after_publish: F,
    ) -> Result<u64, AcquisitionError>
    where
        T: Transport + ?Sized,
        P: Publisher + ?Sized,
        F: FnMut(&mut P, &Window) -> Result<(), AcquisitionError>,
    {
        let mut published = 0u64;
        while max_windows == 0 || published < max_windows {
            let Some(window) = self.run_window(transport, publisher, stop)? else {
                break;
            };
            published += 1;
            after_publish(publisher, &window)?;
        }
        debug!(published, "Bucle de adquisición terminado");
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::mock::MockTransport;
    use crate::error::{PublishError, TransportError};
    use crate::frame_codec::{encode_motion_frame, MotionTuple};
    use crate::publisher::ChannelPublisher;
    use crate::types::{BARO_DATA_UUID, MOTION_DATA_UUID};

    const N: usize = 5;

    fn full_motion(order: &[SubChannel]) -> MotionService {
        let mut motion = MotionService::new();
        for sub in order {
            motion.register(*sub);
        }
        motion
    }

    fn default_loop() -> AcquisitionLoop {
        AcquisitionLoop::new(
            Barometer::new(),
            full_motion(&[
                SubChannel::Accelerometer,
                SubChannel::Gyroscope,
                SubChannel::Magnetometer,
            ]),
            N,
        )
        .unwrap()
    }

    fn pressure_bytes(i: usize) -> [u8; 6] {
        let p_l = (10 + i) as u8;
        let p_m = (0x80 + i) as u8;
        let p_h = 0x01;
        [0x00, 0x00, 0x00, p_l, p_m, p_h]
    }

    fn motion_tuple(i: usize) -> MotionTuple {
        let i = i as i16;
        [
            100 + i,
            -200 - i,
            300,
            1000 * (i + 1),
            -4096,
            8192 + i,
            -1000 + i,
            0,
            1000,
        ]
    }

    fn scripted_transport(ticks: usize) -> MockTransport {
        let mut transport = MockTransport::new();
        for i in 0..ticks {
            transport.queue_read(BARO_DATA_UUID, &pressure_bytes(i));
            transport.queue_read(MOTION_DATA_UUID, &encode_motion_frame(&motion_tuple(i)));
        }
        transport
    }

    /// Activa la parada tras un número de lecturas
    struct StoppingTransport<'a> {
        inner: MockTransport,
        stop: &'a AtomicBool,
        stop_after: usize,
    }

    impl Transport for StoppingTransport<'_> {
        fn read_characteristic(&mut self, uuid: &str) -> Result<Vec<u8>, TransportError> {
            let value = self.inner.read_characteristic(uuid);
            if self.inner.read_log.len() >= self.stop_after {
                self.stop.store(true, Ordering::SeqCst);
            }
            value
        }

        fn write_characteristic(&mut self, uuid: &str, value: &[u8]) -> Result<(), TransportError> {
            self.inner.write_characteristic(uuid, value)
        }
    }

    #[test]
    fn test_end_to_end_window() {
        let mut transport = scripted_transport(N);
        let (mut publisher, rx) = ChannelPublisher::channel();
        let stop = AtomicBool::new(false);
        let mut acquisition = default_loop();
        assert_eq!(acquisition.state(), AcquisitionState::Idle);

        let window = acquisition
            .run_window(&mut transport, &mut publisher, &stop)
            .unwrap()
            .unwrap();

        let payload = rx.try_recv().unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(payload.data.len(), 1);
        assert_eq!(payload.data[0].len(), N);
        assert_eq!(payload, WindowPayload::from_window(&window));

        let expected_pressure: Vec<f64> = (0..N)
            .map(|i| {
                let b = pressure_bytes(i);
                (b[5] as f64 * 65536.0 + b[4] as f64 * 256.0 + b[3] as f64) / 100.0
            })
            .collect();
        let expected_accel_x: Vec<f64> = (0..N)
            .map(|i| motion_tuple(i)[3] as f64 * (8.0 / 32768.0))
            .collect();
        let expected_gyro_y: Vec<f64> = (0..N)
            .map(|i| motion_tuple(i)[1] as f64 * (500.0 / 65536.0))
            .collect();
        let expected_mag_x: Vec<f64> = (0..N)
            .map(|i| motion_tuple(i)[6] as f64 * (4912.0 / 32760.0))
            .collect();

        assert_eq!(window.channel_by_name("pressure").unwrap(), expected_pressure);
        assert_eq!(window.channel_by_name("accel_x").unwrap(), expected_accel_x);
        assert_eq!(window.channel_by_name("gyro_y").unwrap(), expected_gyro_y);
        assert_eq!(window.channel_by_name("mag_x").unwrap(), expected_mag_x);

        assert!(acquisition.buffer().is_empty());
        assert_eq!(acquisition.windows_published(), 1);
        assert_eq!(acquisition.state(), AcquisitionState::Collecting);
    }

    #[test]
    fn test_reads_are_sequential_barometer_first() {
        let mut transport = scripted_transport(N);
        let stop = AtomicBool::new(false);
        let mut acquisition = default_loop();
        acquisition.collect_window(&mut transport, &stop).unwrap();

        assert_eq!(transport.read_log.len(), 2 * N);
        for pair in transport.read_log.chunks(2) {
            assert_eq!(pair[0], BARO_DATA_UUID);
            assert_eq!(pair[1], MOTION_DATA_UUID);
        }
    }

    #[test]
    fn test_registration_order_does_not_change_channels() {
        let stop = AtomicBool::new(false);
        let orders = [
            [SubChannel::Accelerometer, SubChannel::Gyroscope, SubChannel::Magnetometer],
            [SubChannel::Magnetometer, SubChannel::Accelerometer, SubChannel::Gyroscope],
            [SubChannel::Gyroscope, SubChannel::Magnetometer, SubChannel::Accelerometer],
        ];

        let windows: Vec<Window> = orders
            .iter()
            .map(|order| {
                let mut transport = scripted_transport(N);
                let mut acquisition =
                    AcquisitionLoop::new(Barometer::new(), full_motion(order), N).unwrap();
                acquisition
                    .collect_window(&mut transport, &stop)
                    .unwrap()
                    .unwrap()
            })
            .collect();

        assert_eq!(windows[0], windows[1]);
        assert_eq!(windows[0], windows[2]);
    }

    #[test]
    fn test_frame_length_error_aborts_window() {
        for bad_tick in 0..N {
            let mut transport = MockTransport::new();
            for i in 0..N {
                transport.queue_read(BARO_DATA_UUID, &pressure_bytes(i));
                if i == bad_tick {
                    transport.queue_read(MOTION_DATA_UUID, &[0u8; 17]);
                } else {
                    transport.queue_read(MOTION_DATA_UUID, &encode_motion_frame(&motion_tuple(i)));
                }
            }

            let (mut publisher, rx) = ChannelPublisher::channel();
            let stop = AtomicBool::new(false);
            let mut acquisition = default_loop();
            let err = acquisition
                .run_window(&mut transport, &mut publisher, &stop)
                .unwrap_err();

            assert!(matches!(
                err,
                AcquisitionError::Sensor(SensorError::FrameLength(_))
            ));
            assert!(rx.try_recv().is_err());
            assert!(acquisition.buffer().is_empty());
            assert_eq!(acquisition.windows_published(), 0);
            assert_eq!(acquisition.state(), AcquisitionState::Idle);
        }
    }

    #[test]
    fn test_transport_error_aborts_window() {
        let mut transport = scripted_transport(2);
        transport.queue_error(BARO_DATA_UUID, TransportError::Disconnected("gone".into()));

        let (mut publisher, rx) = ChannelPublisher::channel();
        let stop = AtomicBool::new(false);
        let mut acquisition = default_loop();
        let err = acquisition
            .run_window(&mut transport, &mut publisher, &stop)
            .unwrap_err();

        assert!(matches!(
            err,
            AcquisitionError::Sensor(SensorError::Transport(TransportError::Disconnected(_)))
        ));
        assert!(rx.is_empty());
    }

    #[test]
    fn test_stop_before_start_reads_nothing() {
        let mut transport = scripted_transport(N);
        let stop = AtomicBool::new(true);
        let mut acquisition = default_loop();
        assert!(acquisition
            .collect_window(&mut transport, &stop)
            .unwrap()
            .is_none());
        assert!(transport.read_log.is_empty());
    }

    #[test]
    fn test_stop_between_ticks_discards_partial_window() {
        let stop = AtomicBool::new(false);
        // Parada durante la lectura de movimiento del segundo instante
        let mut transport = StoppingTransport {
            inner: scripted_transport(N),
            stop: &stop,
            stop_after: 4,
        };
        let (mut publisher, rx) = ChannelPublisher::channel();
        let mut acquisition = default_loop();

        let result = acquisition
            .run_window(&mut transport, &mut publisher, &stop)
            .unwrap();
        assert!(result.is_none());
        // El instante en curso se completa: la parada no interrumpe una lectura
        assert_eq!(transport.inner.read_log.len(), 4);
        assert!(rx.is_empty());
        assert!(acquisition.buffer().is_empty());
        assert_eq!(acquisition.state(), AcquisitionState::Idle);
    }

    #[test]
    fn test_consecutive_windows_share_no_state() {
        let mut transport = scripted_transport(2 * N);
        let (mut publisher, rx) = ChannelPublisher::channel();
        let stop = AtomicBool::new(false);
        let mut acquisition = default_loop();

        acquisition.run_window(&mut transport, &mut publisher, &stop).unwrap();
        acquisition.run_window(&mut transport, &mut publisher, &stop).unwrap();

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.data[0].len(), N);
        assert_eq!(second.data[0].len(), N);
        assert_ne!(first, second);
        assert_eq!(acquisition.windows_published(), 2);
    }

    #[test]
    fn test_run_stops_at_window_count() {
        let mut transport = scripted_transport(3 * N);
        let (mut publisher, rx) = ChannelPublisher::channel();
        let stop = AtomicBool::new(false);
        let mut acquisition = default_loop();

        let mut seen = Vec::new();
        let published = acquisition
            .run(&mut transport, &mut publisher, 2, &stop, |_, window| {
                seen.push(window.len());
                Ok(())
            })
            .unwrap();

        assert_eq!(published, 2);
        assert_eq!(seen, vec![N, N]);
        assert_eq!(rx.len(), 2);
        assert_eq!(transport.read_log.len(), 2 * 2 * N);
    }

    #[test]
    fn test_run_unbounded_until_stop() {
        let stop = AtomicBool::new(false);
        // Parada a mitad de la tercera ventana
        let mut transport = StoppingTransport {
            inner: scripted_transport(3 * N),
            stop: &stop,
            stop_after: 2 * 2 * N + 3,
        };
        let (mut publisher, rx) = ChannelPublisher::channel();
        let mut acquisition = default_loop();

        let published = acquisition
            .run(&mut transport, &mut publisher, 0, &stop, |_, _| Ok(()))
            .unwrap();

        assert_eq!(published, 2);
        assert_eq!(rx.len(), 2);
        assert!(acquisition.buffer().is_empty());
        assert_eq!(acquisition.state(), AcquisitionState::Idle);
    }

    #[test]
    fn test_run_hook_error_ends_loop() {
        let mut transport = scripted_transport(2 * N);
        let (mut publisher, rx) = ChannelPublisher::channel();
        let stop = AtomicBool::new(false);
        let mut acquisition = default_loop();

        let err = acquisition
            .run(&mut transport, &mut publisher, 0, &stop, |_, _| {
                Err(TransportError::Timeout(std::time::Duration::from_secs(1)).into())
            })
            .unwrap_err();

        assert!(matches!(
            err,
            AcquisitionError::Sensor(SensorError::Transport(TransportError::Timeout(_)))
        ));
        assert_eq!(rx.len(), 1);
        assert_eq!(acquisition.windows_published(), 1);
    }

    struct RejectingPublisher;

    impl Publisher for RejectingPublisher {
        fn publish(&mut self, _payload: &WindowPayload) -> Result<(), PublishError> {
            Err(PublishError::ChannelClosed)
        }
    }

    #[test]
    fn test_publish_failure_returns_to_idle() {
        let mut transport = scripted_transport(N);
        let stop = AtomicBool::new(false);
        let mut acquisition = default_loop();

        let err = acquisition
            .run_window(&mut transport, &mut RejectingPublisher, &stop)
            .unwrap_err();

        assert!(matches!(
            err,
            AcquisitionError::Publish(PublishError::ChannelClosed)
        ));
        assert_eq!(acquisition.state(), AcquisitionState::Idle);
        assert!(acquisition.buffer().is_empty());
        assert_eq!(acquisition.windows_published(), 0);
    }

    #[test]
    fn test_duplicate_subchannel_rejected() {
        let motion = full_motion(&[
            SubChannel::Accelerometer,
            SubChannel::Gyroscope,
            SubChannel::Magnetometer,
            SubChannel::Gyroscope,
        ]);
        let err = AcquisitionLoop::new(Barometer::new(), motion, N).err().unwrap();
        assert!(matches!(
            err,
            AcquisitionError::DuplicateSubChannel(SubChannel::Gyroscope)
        ));
    }

    #[test]
    fn test_incomplete_layout_rejected() {
        let motion = full_motion(&[SubChannel::Accelerometer, SubChannel::Gyroscope]);
        let err = AcquisitionLoop::new(Barometer::new(), motion, N).err().unwrap();
        assert!(matches!(
            err,
            AcquisitionError::IncompleteLayout(SubChannel::Magnetometer)
        ));
    }

    #[test]
    fn test_zero_timesteps_rejected() {
        let err = AcquisitionLoop::new(
            Barometer::new(),
            full_motion(&SubChannel::ALL),
            0,
        )
        .err()
        .unwrap();
        assert!(matches!(err, AcquisitionError::EmptyWindow));
    }

    #[test]
    fn test_enable_sensors_order() {
        let mut transport = MockTransport::new();
        let mut acquisition = default_loop();
        acquisition.enable_sensors(&mut transport).unwrap();
        let uuids: Vec<&str> = transport.writes.iter().map(|(u, _)| u.as_str()).collect();
        assert_eq!(
            uuids,
            vec![
                crate::types::BARO_CTRL_UUID,
                crate::types::BARO_PERIOD_UUID,
                crate::types::MOTION_PERIOD_UUID,
                crate::types::MOTION_CTRL_UUID,
            ]
        );
    }
}
