//! BLE GATT constants for the Sunset lamp
//!
//! The lamp exposes one writable characteristic that takes encrypted
//! 16-byte command frames.

/// Control characteristic UUID (write)
pub const CONTROL_UUID: &str = "0000ac52-1212-efde-1523-785fedbeda25";

/// Control characteristic UUID as a 128-bit value
pub const CONTROL_UUID_U128: u128 = 0x0000ac52_1212_efde_1523_785fedbeda25;

/// Address of the lamp this project was first paired with
pub const DEFAULT_ADDRESS: &str = "65:91:68:29:E4:DB";
