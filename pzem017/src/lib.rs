//! Driver for the PZEM-017 DC energy meter over Modbus RTU.
//!
//! The meter exposes voltage, current, power, accumulated energy and two
//! voltage alarms. [`Pzem017`] reads them in one block, caches the result
//! for a configurable interval, and writes the meter's alarm thresholds,
//! bus address and shunt range.
//!
//! The PZEM-003 speaks the same protocol but has no current range register.
//!
//! # Example
//!
//! ```no_run
//! use pzem017::{DeviceConfig, Pzem017};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DeviceConfig::load_from_file("pzem017.json5")?;
//!     pzem_common::init_tracing(&config.logging)?;
//!
//!     let mut meter = Pzem017::open(&config)?;
//!
//!     let volts = meter.voltage(false);
//!     if volts.is_nan() {
//!         eprintln!("read failed: {}", meter.last_operation_result_string());
//!     } else {
//!         println!("{volts:.2} V, {:.2} A", meter.current(false));
//!     }
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod registers;
pub mod rtu;
pub mod session;
pub mod status;
pub mod transport;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ConfigError, DeviceConfig, SerialConfig};
pub use error::{Error, Result};
pub use registers::{CurrentRange, GENERAL_ADDRESS, Snapshot};
pub use rtu::RtuTransport;
pub use session::{DEFAULT_UPDATE_INTERVAL, Pzem017};
pub use status::Status;
pub use transport::{Transport, TransportResult};
