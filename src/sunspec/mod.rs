//! Minimal SunSpec client: model definitions, register models with typed
//! points and a device bound to a register transport.
//!
//! Only what the signing meter needs is covered. There is no device scan, the
//! caller decides where each model lives.

use thiserror::Error;

pub mod types;
pub mod definitions;
pub mod model;
pub mod transport;
pub mod device;

pub use definitions::{ModelDefinition, ModelLibrary, PointDefinition};
pub use device::{Device, ModelHandle};
pub use model::{Block, BlockKind, Model, Point};
pub use transport::Transport;
pub use types::{Access, PointType, PointValue, TextEncoding};

/// Register address of the `SunS` marker.
pub const SUNSPEC_BASE_ADDRESS: u16 = 40000;
/// Registers taken by the `SunS` marker.
pub const SUNSPEC_ID_REGS: u16 = 2;
/// Registers taken by each model header (`ID` and `L`).
pub const SUNSPEC_HEADER_REGS: u16 = 2;
/// `SunS` as two registers.
pub const SUNSPEC_ID: [u16; 2] = [0x5375, 0x6e53];

/* Modbus limits for holding registers per request */
pub const REQ_COUNT_MAX: u16 = 125;
pub const WRITE_COUNT_MAX: u16 = 123;

#[derive(Error, Debug)]
pub enum SunSpecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Modbus error: {0}")]
    Modbus(String),
    #[error("Short read at {address}: expected {expected} registers, got {actual}")]
    ShortRead { address: u16, expected: usize, actual: usize },
    #[error("Unknown model {0}")]
    UnknownModel(u16),
    #[error("Expected model {expected} at {address}, found {found}")]
    ModelIdMismatch { address: u16, expected: u16, found: u16 },
    #[error("Model {id} with length {len} does not match its definition")]
    ModelLength { id: u16, len: u16 },
    #[error("Invalid model definition: {0}")]
    InvalidDefinition(String),
    #[error("Register address out of range")]
    AddressOverflow,
    #[error("Unknown point {point} in model {model}")]
    UnknownPoint { model: u16, point: String },
    #[error("Point {0} is read-only")]
    ReadOnly(String),
    #[error("Value does not fit point type {0:?}")]
    ValueOutOfRange(PointType),
    #[error("Value has the wrong kind for point type {0:?}")]
    TypeMismatch(PointType),
    #[error("Text encoding error: {0}")]
    Encoding(String),
}
