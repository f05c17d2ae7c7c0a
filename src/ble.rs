use dbus::arg::{PropMap, Variant};
use dbus::blocking::stdintf::org_freedesktop_dbus::{ObjectManager, Properties};
use dbus::blocking::{Connection, Proxy};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::TransportError;

const BLUEZ: &str = "org.bluez";
const GATT_CHARACTERISTIC: &str = "org.bluez.GattCharacteristic1";
const DEVICE: &str = "org.bluez.Device1";
const CALL_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Acceso síncrono a las características de un periférico conectado.
/// Cada llamada bloquea hasta completarse; no hay peticiones concurrentes.
pub trait Transport {
    fn read_characteristic(&mut self, uuid: &str) -> Result<Vec<u8>, TransportError>;
    fn write_characteristic(&mut self, uuid: &str, value: &[u8]) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read_characteristic(&mut self, uuid: &str) -> Result<Vec<u8>, TransportError> {
        (**self).read_characteristic(uuid)
    }

    fn write_characteristic(&mut self, uuid: &str, value: &[u8]) -> Result<(), TransportError> {
        (**self).write_characteristic(uuid, value)
    }
}

/// Valida una MAC del tipo `AA:BB:CC:DD:EE:FF`
pub fn validate_address(address: &str) -> Result<(), TransportError> {
    let octets: Vec<&str> = address.split(':').collect();
    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
    if valid {
        Ok(())
    } else {
        Err(TransportError::InvalidAddress(address.to_string()))
    }
}

/// Ruta D-Bus de un dispositivo BlueZ a partir de su MAC
pub fn device_path(adapter: &str, address: &str) -> String {
    format!(
        "/org/bluez/{}/dev_{}",
        adapter,
        address.to_uppercase().replace(':', "_")
    )
}

/// Transporte BLE sobre BlueZ (D-Bus del sistema)
pub struct BluezTransport {
    conn: Connection,
    device_path: String,
    connected: bool,
    /// UUID -> ruta del objeto característica
    characteristics: HashMap<String, dbus::Path<'static>>,
}

impl BluezTransport {
    /// Enciende el adaptador, conecta al dispositivo y resuelve sus características
    pub fn connect(adapter: &str, address: &str) -> Result<Self, TransportError> {
        validate_address(address)?;

        let conn = Connection::new_system()?;
        debug!("Conectado a D-Bus del sistema");

        let adapter_path = format!("/org/bluez/{}", adapter);
        let adapter_proxy = conn.with_proxy(BLUEZ, &adapter_path, CALL_TIMEOUT);
        let _: () = adapter_proxy.method_call(
            "org.freedesktop.DBus.Properties",
            "Set",
            ("org.bluez.Adapter1", "Powered", Variant(true)),
        )?;
        info!(adapter, "Adaptador Bluetooth encendido");

        let device_path = device_path(adapter, address);
        let device_proxy = conn.with_proxy(BLUEZ, &device_path, CONNECT_TIMEOUT);
        device_proxy.method_call::<(), _, _, _>(DEVICE, "Connect", ())?;
        info!(address, "Conectado al dispositivo");

        let mut transport = Self {
            conn,
            device_path,
            connected: true,
            characteristics: HashMap::new(),
        };
        transport.wait_services_resolved()?;
        transport.resolve_characteristics()?;
        Ok(transport)
    }

    fn device_proxy(&self) -> Proxy<'_, &Connection> {
        self.conn
            .with_proxy(BLUEZ, self.device_path.as_str(), CALL_TIMEOUT)
    }

    fn wait_services_resolved(&self) -> Result<(), TransportError> {
        let start = Instant::now();
        loop {
            let resolved: bool = self.device_proxy().get(DEVICE, "ServicesResolved")?;
            if resolved {
                return Ok(());
            }
            if start.elapsed() >= RESOLVE_TIMEOUT {
                return Err(TransportError::Timeout(RESOLVE_TIMEOUT));
            }
            std::thread::sleep(Duration::from_millis(250));
        }
    }

    /// Recorre los objetos de BlueZ y guarda las características de este dispositivo
    fn resolve_characteristics(&mut self) -> Result<(), TransportError> {
        let root = self.conn.with_proxy(BLUEZ, "/", CALL_TIMEOUT);
        let objects = root.get_managed_objects()?;

        for (path, interfaces) in objects {
            if !path.starts_with(self.device_path.as_str()) {
                continue;
            }
            let uuid = interfaces
                .get(GATT_CHARACTERISTIC)
                .and_then(|props| props.get("UUID"))
                .and_then(|value| value.0.as_str())
                .map(str::to_lowercase);
            if let Some(uuid) = uuid {
                debug!(%uuid, path = %path, "Característica encontrada");
                self.characteristics.insert(uuid, path);
            }
        }

        info!(count = self.characteristics.len(), "Características resueltas");
        Ok(())
    }

    fn characteristic_proxy(&self, uuid: &str) -> Result<Proxy<'_, &Connection>, TransportError> {
        let path = self
            .characteristics
            .get(&uuid.to_lowercase())
            .ok_or_else(|| TransportError::CharacteristicNotFound(uuid.to_string()))?;
        Ok(self.conn.with_proxy(BLUEZ, path.clone(), CALL_TIMEOUT))
    }

    pub fn disconnect(&mut self) -> Result<(), TransportError> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        self.device_proxy()
            .method_call::<(), _, _, _>(DEVICE, "Disconnect", ())?;
        info!("Dispositivo desconectado");
        Ok(())
    }
}

impl Transport for BluezTransport {
    fn read_characteristic(&mut self, uuid: &str) -> Result<Vec<u8>, TransportError> {
        let proxy = self.characteristic_proxy(uuid)?;
        let (value,): (Vec<u8>,) =
            proxy.method_call(GATT_CHARACTERISTIC, "ReadValue", (PropMap::new(),))?;
        Ok(value)
    }

    fn write_characteristic(&mut self, uuid: &str, value: &[u8]) -> Result<(), TransportError> {
        let proxy = self.characteristic_proxy(uuid)?;
        proxy.method_call::<(), _, _, _>(
            GATT_CHARACTERISTIC,
            "WriteValue",
            (value.to_vec(), PropMap::new()),
        )?;
        Ok(())
    }
}

impl Drop for BluezTransport {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!("No se pudo desconectar: {}", e);
        }
    }
}
