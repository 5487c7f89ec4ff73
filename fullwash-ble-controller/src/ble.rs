//! BLE client for configuring FullWash machines
//!
//! Provides adapter acquisition, device discovery, and a connected session
//! type for the password-gated configuration operations. Every outcome of a
//! gated write is read back from the device's status characteristic and
//! inferred by substring matching on the returned text.

use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use std::time::Duration;
use uuid::Uuid;

use fullwash_proto::{
    AUTH_CHAR_UUID, ENVIRONMENT_CHAR_UUID, MACHINE_NUM_CHAR_UUID, STATUS_CHAR_UUID,
};

#[derive(Debug, thiserror::Error)]
pub enum BleError {
    #[error("bluetooth error: {0}")]
    Transport(#[from] btleplug::Error),
    #[error("no Bluetooth adapter found")]
    NoAdapter,
    #[error("no device matching '{0}' found")]
    DeviceNotFound(String),
    #[error("characteristic {0} not found on device (is this a FullWash machine?)")]
    CharacteristicMissing(Uuid),
    #[error("authentication failed, device reported: {status}")]
    AuthenticationFailed { status: String },
    #[error("device rejected the write, status: {status}")]
    WriteRejected { status: String },
    #[error("invalid machine number '{0}' (must be 1-10 characters)")]
    InvalidMachineNumber(String),
    #[error("invalid environment '{0}' (must be 'local' or 'prod')")]
    InvalidEnvironment(String),
    #[error("device returned non-UTF-8 text: {0}")]
    InvalidText(#[from] std::string::FromUtf8Error),
}

/// A device seen during a scan
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    pub is_fullwash: bool,
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, BleError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(BleError::NoAdapter)
}

/// Scan for BLE devices for `duration_secs`.
///
/// Returns every visible device; FullWash machines have `is_fullwash = true`.
pub async fn scan(adapter: &Adapter, duration_secs: u64) -> Result<Vec<DiscoveredDevice>, BleError> {
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_secs(duration_secs)).await;

    // Stop discovery before inspecting the result so a failed property
    // read does not leave the adapter scanning
    let devices = collect_devices(adapter).await;
    adapter.stop_scan().await?;
    devices
}

async fn collect_devices(adapter: &Adapter) -> Result<Vec<DiscoveredDevice>, BleError> {
    let peripherals = adapter.peripherals().await?;
    let mut devices = Vec::new();

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_else(|| "(Unknown)".to_string());
            let address = peripheral.address().to_string();
            let is_fullwash = fullwash_proto::is_fullwash_name(&name);

            devices.push(DiscoveredDevice { name, address, rssi: props.rssi, is_fullwash });
        }
    }

    Ok(devices)
}

/// Whether a device matches a locator, by name or address fragment
fn matches_locator(name: &str, address: &str, locator: &str) -> bool {
    name.contains(locator) || address.contains(locator)
}

/// Find the device matching `locator` (a MAC address or name fragment).
///
/// Runs a short discovery pass; the transport cannot connect to an address
/// it has not seen advertise.
pub async fn find_device(adapter: &Adapter, locator: &str) -> Result<Peripheral, BleError> {
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_secs(fullwash_proto::DEFAULT_SCAN_SECS)).await;

    let found = locate(adapter, locator).await;
    adapter.stop_scan().await?;
    found?.ok_or_else(|| BleError::DeviceNotFound(locator.to_string()))
}

async fn locate(adapter: &Adapter, locator: &str) -> Result<Option<Peripheral>, BleError> {
    let peripherals = adapter.peripherals().await?;

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_default();
            let address = peripheral.address().to_string();

            if matches_locator(&name, &address, locator) {
                log::debug!("matched device {name} ({address})");
                return Ok(Some(peripheral));
            }
        }
    }

    Ok(None)
}

/// A connected FullWash machine with its configuration characteristics
/// resolved. Holds the connection for the duration of one command.
pub struct MachineSession {
    device: Peripheral,
    auth: Characteristic,
    machine_num: Characteristic,
    environment: Characteristic,
    status: Characteristic,
}

/// The four configuration characteristics, in declaration order
struct ConfigChars {
    auth: Characteristic,
    machine_num: Characteristic,
    environment: Characteristic,
    status: Characteristic,
}

fn resolve_characteristics(
    characteristics: &std::collections::BTreeSet<Characteristic>,
) -> Result<ConfigChars, BleError> {
    let find = |uuid: Uuid| {
        characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .cloned()
            .ok_or(BleError::CharacteristicMissing(uuid))
    };

    Ok(ConfigChars {
        auth: find(AUTH_CHAR_UUID)?,
        machine_num: find(MACHINE_NUM_CHAR_UUID)?,
        environment: find(ENVIRONMENT_CHAR_UUID)?,
        status: find(STATUS_CHAR_UUID)?,
    })
}

impl MachineSession {
    /// Connect to a machine and resolve the configuration characteristics.
    ///
    /// If discovery or resolution fails after the link came up, the link is
    /// dropped before the error is returned, so a device that is not a
    /// FullWash machine is not left connected.
    pub async fn connect(device: Peripheral) -> Result<Self, BleError> {
        device.connect().await?;
        log::debug!("connected to {}", device.address());

        let chars = async {
            device.discover_services().await?;
            resolve_characteristics(&device.characteristics())
        }
        .await;

        match chars {
            Ok(chars) => Ok(MachineSession {
                auth: chars.auth,
                machine_num: chars.machine_num,
                environment: chars.environment,
                status: chars.status,
                device,
            }),
            Err(e) => {
                let _ = device.disconnect().await;
                Err(e)
            }
        }
    }

    /// Present the master password to the machine.
    ///
    /// The firmware reports the outcome through the status characteristic;
    /// authentication succeeded iff the status contains "Authenticated".
    pub async fn authenticate(&self, password: &str) -> Result<(), BleError> {
        self.device
            .write(&self.auth, password.as_bytes(), WriteType::WithResponse)
            .await?;
        tokio::time::sleep(fullwash_proto::SETTLE_DELAY).await;

        let status = self.status().await?;
        log::debug!("status after auth: {status}");
        if fullwash_proto::is_authenticated(&status) {
            Ok(())
        } else {
            Err(BleError::AuthenticationFailed { status })
        }
    }

    /// Read the machine number
    pub async fn machine_number(&self) -> Result<String, BleError> {
        let raw = self.device.read(&self.machine_num).await?;
        Ok(String::from_utf8(raw)?)
    }

    /// Write a new machine number (requires prior authentication).
    ///
    /// Succeeded iff the status string afterwards contains "success"
    /// case-insensitively. The machine must be restarted for the change
    /// to take effect.
    pub async fn set_machine_number(&self, number: &str) -> Result<(), BleError> {
        if !fullwash_proto::valid_machine_number(number) {
            return Err(BleError::InvalidMachineNumber(number.to_string()));
        }

        self.device
            .write(&self.machine_num, number.as_bytes(), WriteType::WithResponse)
            .await?;
        tokio::time::sleep(fullwash_proto::SETTLE_DELAY).await;

        let status = self.status().await?;
        log::debug!("status after machine number write: {status}");
        if fullwash_proto::is_write_accepted(&status) {
            Ok(())
        } else {
            Err(BleError::WriteRejected { status })
        }
    }

    /// Read the environment ("local" or "prod")
    pub async fn environment(&self) -> Result<String, BleError> {
        let raw = self.device.read(&self.environment).await?;
        Ok(String::from_utf8(raw)?)
    }

    /// Write a new environment (requires prior authentication).
    /// Lower-cased before sending, as the firmware expects.
    pub async fn set_environment(&self, env: &str) -> Result<(), BleError> {
        let env = fullwash_proto::normalize_environment(env)
            .ok_or_else(|| BleError::InvalidEnvironment(env.to_string()))?;

        self.device
            .write(&self.environment, env.as_bytes(), WriteType::WithResponse)
            .await?;
        tokio::time::sleep(fullwash_proto::SETTLE_DELAY).await;

        let status = self.status().await?;
        log::debug!("status after environment write: {status}");
        if fullwash_proto::is_write_accepted(&status) {
            Ok(())
        } else {
            Err(BleError::WriteRejected { status })
        }
    }

    /// Read the raw status text the device last reported
    pub async fn status(&self) -> Result<String, BleError> {
        let raw = self.device.read(&self.status).await?;
        Ok(String::from_utf8(raw)?)
    }

    /// Drop the connection
    pub async fn disconnect(&self) -> Result<(), BleError> {
        self.device.disconnect().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{matches_locator, resolve_characteristics, BleError};
    use btleplug::api::{CharPropFlags, Characteristic};
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn config_char(uuid: Uuid) -> Characteristic {
        Characteristic {
            uuid,
            service_uuid: fullwash_proto::SERVICE_UUID,
            properties: CharPropFlags::empty(),
            descriptors: Default::default(),
        }
    }

    fn full_service() -> BTreeSet<Characteristic> {
        [
            fullwash_proto::AUTH_CHAR_UUID,
            fullwash_proto::MACHINE_NUM_CHAR_UUID,
            fullwash_proto::ENVIRONMENT_CHAR_UUID,
            fullwash_proto::STATUS_CHAR_UUID,
        ]
        .into_iter()
        .map(config_char)
        .collect()
    }

    #[test]
    fn resolves_all_config_characteristics() {
        let chars = resolve_characteristics(&full_service()).unwrap();
        assert_eq!(chars.auth.uuid, fullwash_proto::AUTH_CHAR_UUID);
        assert_eq!(chars.machine_num.uuid, fullwash_proto::MACHINE_NUM_CHAR_UUID);
        assert_eq!(chars.environment.uuid, fullwash_proto::ENVIRONMENT_CHAR_UUID);
        assert_eq!(chars.status.uuid, fullwash_proto::STATUS_CHAR_UUID);
    }

    #[test]
    fn missing_characteristic_is_reported() {
        // A device without the configuration service, e.g. not a FullWash
        // machine at all
        let mut service = full_service();
        service.retain(|c| c.uuid != fullwash_proto::STATUS_CHAR_UUID);

        match resolve_characteristics(&service) {
            Err(BleError::CharacteristicMissing(uuid)) => {
                assert_eq!(uuid, fullwash_proto::STATUS_CHAR_UUID)
            }
            Err(e) => panic!("expected CharacteristicMissing, got {e:?}"),
            Ok(_) => panic!("expected CharacteristicMissing, got Ok"),
        }
    }

    #[test]
    fn empty_service_is_rejected() {
        assert!(resolve_characteristics(&BTreeSet::new()).is_err());
    }

    #[test]
    fn locator_matches_address_fragment() {
        assert!(matches_locator("FullWash Machine", "AA:BB:CC:DD:EE:FF", "AA:BB:CC:DD:EE:FF"));
        assert!(matches_locator("FullWash Machine", "AA:BB:CC:DD:EE:FF", "DD:EE"));
        assert!(!matches_locator("FullWash Machine", "AA:BB:CC:DD:EE:FF", "11:22"));
    }

    #[test]
    fn locator_matches_name_fragment() {
        assert!(matches_locator("FullWash Machine", "AA:BB:CC:DD:EE:FF", "FullWash"));
        assert!(!matches_locator("SomeOtherDevice", "AA:BB:CC:DD:EE:FF", "FullWash"));
    }
}
