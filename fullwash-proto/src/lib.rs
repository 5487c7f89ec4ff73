//! GATT protocol constants for the FullWash machine configuration service.
//!
//! The machine firmware exposes a small configuration service: a write-only
//! authentication characteristic, two password-gated text values (machine
//! number and environment), and a free-form status string the device updates
//! after every operation. Outcomes are inferred by substring matching on that
//! status string; there is no binary framing anywhere in this protocol.

use std::time::Duration;

use uuid::Uuid;

/// Configuration service UUID: 4fafc201-1fb5-459e-8fcc-c5c9c331914b
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);

/// Authentication characteristic (write only) - takes the master password
pub const AUTH_CHAR_UUID: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);

/// Machine number characteristic (read/write, write requires auth)
pub const MACHINE_NUM_CHAR_UUID: Uuid = Uuid::from_u128(0x1c95d5e3_d8f7_413a_bf3d_7a2e5d7be87e);

/// Environment characteristic (read/write, write requires auth)
pub const ENVIRONMENT_CHAR_UUID: Uuid = Uuid::from_u128(0x2d95d5e3_d8f7_413a_bf3d_7a2e5d7be87e);

/// Status characteristic (read/notify) - free-form outcome text
pub const STATUS_CHAR_UUID: Uuid = Uuid::from_u128(0xd8de624e_140f_4a22_8594_e2216b84a5f2);

/// Name the machines advertise over BLE
pub const DEVICE_NAME: &str = "FullWash Machine";

/// Factory master password, used unless the operator overrides it
pub const DEFAULT_PASSWORD: &str = "fullwash2025";

/// How long the firmware needs to process a gated write before the status
/// characteristic reflects the outcome
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Default discovery window for scans
pub const DEFAULT_SCAN_SECS: u64 = 5;

/// The firmware rejects machine numbers outside this encoded length
pub const MAX_MACHINE_NUMBER_LEN: usize = 10;

/// Whether a status string reports a successful authentication.
pub fn is_authenticated(status: &str) -> bool {
    status.contains("Authenticated")
}

/// Whether a status string reports a successful gated write.
/// The firmware phrases these as "... updated successfully".
pub fn is_write_accepted(status: &str) -> bool {
    status.to_lowercase().contains("success")
}

/// Whether an advertised name belongs to a FullWash machine.
pub fn is_fullwash_name(name: &str) -> bool {
    name.contains(DEVICE_NAME)
}

/// Client-side check mirroring the firmware's machine number validation.
pub fn valid_machine_number(encoded: &str) -> bool {
    !encoded.is_empty() && encoded.len() <= MAX_MACHINE_NUMBER_LEN
}

/// Normalize an environment value to what the firmware accepts
/// (`local` or `prod`, lower-cased), or `None` if it is neither.
pub fn normalize_environment(env: &str) -> Option<String> {
    let env = env.to_lowercase();
    match env.as_str() {
        "local" | "prod" => Some(env),
        _ => None,
    }
}
