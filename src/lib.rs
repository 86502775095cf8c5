//! Client library for signing energy meters speaking SunSpec over Modbus.
//!
//! Creates signed snapshots, verifies their signatures against the public key
//! exported by the meter and assembles OCMF transaction documents.

pub mod config;
pub mod sunspec;
pub mod bsm;

pub use bsm::snapshot::{PollOptions, SnapshotOutcome, SnapshotStatus, SnapshotType};
pub use bsm::{BsmDevice, BsmError};
pub use config::{BsmConfig, Config, ConfigError};
pub use sunspec::{Device, ModelHandle, ModelLibrary, SunSpecError, Transport};
#[cfg(feature = "modbus")]
pub use sunspec::transport::{open_transport, ModbusTcpTransport};
#[cfg(feature = "serial")]
pub use sunspec::transport::ModbusRtuTransport;
