//! FullWash BLE Controller
//!
//! BLE client for reading and configuring FullWash machines.
//!
//! # Example
//!
//! ```ignore
//! use fullwash_ble_controller::ble;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ble::BleError> {
//!     let adapter = ble::get_adapter().await?;
//!
//!     // Scan for machines
//!     for device in ble::scan(&adapter, 5).await? {
//!         println!("{} ({})", device.name, device.address);
//!     }
//!
//!     // Read the configuration of a specific machine
//!     let peripheral = ble::find_device(&adapter, "AA:BB:CC:DD:EE:FF").await?;
//!     let session = ble::MachineSession::connect(peripheral).await?;
//!     session.authenticate("fullwash2025").await?;
//!     println!("machine number: {}", session.machine_number().await?);
//!     session.disconnect().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod ble;
