//! Sunset BLE Controller
//!
//! Talks to the Sunset lamp over BLE: finds it, connects, and writes
//! encrypted color frames to its control characteristic.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use sunset_ble_controller::{BtleplugTransport, DeviceLink};
//! use sunset_proto::{Brightness, Color, Speed};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = BtleplugTransport::new().await?;
//!     let link = DeviceLink::connect(transport, "65:91:68:29:E4:DB", Duration::from_secs(5)).await?;
//!
//!     link.send_color(Color::new(255, 0, 0), Brightness::MAX, Speed::MAX).await?;
//!
//!     link.close().await?;
//!     Ok(())
//! }
//! ```

pub mod ble;
mod link;
pub mod memory;
mod transport;

pub use ble::{BtleplugTransport, LampDevice, ServiceInfo};
pub use link::{DeviceLink, LinkError, CONNECT_TIMEOUT};
pub use memory::MemoryTransport;
pub use transport::{Transport, TransportError};
