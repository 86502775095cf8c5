use log::info;
use serde::{Deserialize, Serialize};
use serde_yml;
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::bsm::crypto::{Curve, DigestAlgorithm};
use crate::sunspec::{TextEncoding, REQ_COUNT_MAX};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to find the config on config/bsm.yaml or bsm.yaml")]
    NotFound,
    #[error("Unable to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unable to parse config file: {0}")]
    Parse(#[from] serde_yml::Error),
}

#[derive(Deserialize, Serialize, Clone, PartialEq, Debug)]
pub enum ModbusProtoConfig {
    TCP,
    RTUoverTCP,
    RTU,
}

#[derive(Deserialize, Serialize, Clone, Copy, PartialEq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

fn connection_port_default() -> u16 { return 502 }
fn connection_proto_default() -> ModbusProtoConfig { return ModbusProtoConfig::TCP }
fn connection_slave_id_default() -> u8 { return 42 }
fn connection_timeout_default() -> u64 { return 10 }
fn connection_max_count_default() -> u16 { return REQ_COUNT_MAX }
fn connection_device_default() -> String { return "/dev/ttyUSB0".to_string() }
fn connection_baudrate_default() -> u32 { return 19200 }
fn connection_parity_default() -> ParityConfig { return ParityConfig::Even }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ConnectionConfig {
    /* TCP and RTUoverTCP */
    #[serde(default)]
    pub host: String,
    #[serde(default="connection_port_default")]
    pub port: u16,
    #[serde(default="connection_proto_default")]
    pub proto: ModbusProtoConfig,
    #[serde(default="connection_slave_id_default")]
    pub slave_id: u8,
    /* seconds, for connect, read and write */
    #[serde(default="connection_timeout_default")]
    pub timeout: u64,
    #[serde(default="connection_max_count_default")]
    pub max_count: u16,
    /* serial RTU only */
    #[serde(default="connection_device_default")]
    pub device: String,
    #[serde(default="connection_baudrate_default")]
    pub baudrate: u32,
    #[serde(default="connection_parity_default")]
    pub parity: ParityConfig,
}

fn points_snapshot_status_default() -> String { return "St".to_string() }
fn points_snapshot_signature_length_default() -> String { return "NSig".to_string() }
fn points_bsm_curve_name_default() -> String { return "Curve".to_string() }
fn points_bsm_public_key_length_default() -> String { return "NPK".to_string() }
fn points_ocmf_status_default() -> String { return "St".to_string() }
fn points_ocmf_data_default() -> String { return "O".to_string() }
fn points_digest_excluded_default() -> Vec<String> { return vec!["St".to_string(), "NSig".to_string()] }

/// Data point ids the signing logic relies on.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct PointsConfig {
    #[serde(default="points_snapshot_status_default")]
    pub snapshot_status: String,
    #[serde(default="points_snapshot_signature_length_default")]
    pub snapshot_signature_length: String,
    #[serde(default="points_bsm_curve_name_default")]
    pub bsm_curve_name: String,
    #[serde(default="points_bsm_public_key_length_default")]
    pub bsm_public_key_length: String,
    #[serde(default="points_ocmf_status_default")]
    pub ocmf_status: String,
    #[serde(default="points_ocmf_data_default")]
    pub ocmf_data: String,
    /* snapshot points not covered by the signature */
    #[serde(default="points_digest_excluded_default")]
    pub digest_excluded: Vec<String>,
}

impl Default for PointsConfig {
    fn default() -> Self {
        return PointsConfig {
            snapshot_status: points_snapshot_status_default(),
            snapshot_signature_length: points_snapshot_signature_length_default(),
            bsm_curve_name: points_bsm_curve_name_default(),
            bsm_public_key_length: points_bsm_public_key_length_default(),
            ocmf_status: points_ocmf_status_default(),
            ocmf_data: points_ocmf_data_default(),
            digest_excluded: points_digest_excluded_default(),
        };
    }
}

fn crypto_curve_default() -> Curve { return Curve::Secp256r1 }
fn crypto_digest_default() -> DigestAlgorithm { return DigestAlgorithm::Sha256 }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct CryptoConfig {
    #[serde(default="crypto_curve_default")]
    pub curve: Curve,
    #[serde(default="crypto_digest_default")]
    pub digest: DigestAlgorithm,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        return CryptoConfig { curve: crypto_curve_default(), digest: crypto_digest_default() };
    }
}

fn snapshot_poll_interval_ms_default() -> u64 { return 100 }
fn snapshot_timeout_secs_default() -> Option<u64> { return Some(30) }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct SnapshotConfig {
    #[serde(default="snapshot_poll_interval_ms_default")]
    pub poll_interval_ms: u64,
    /* `~` polls without a time limit */
    #[serde(default="snapshot_timeout_secs_default")]
    pub timeout_secs: Option<u64>,
}

impl SnapshotConfig {
    pub fn poll_interval(&self) -> Duration {
        return Duration::from_millis(self.poll_interval_ms);
    }

    pub fn timeout(&self) -> Option<Duration> {
        return self.timeout_secs.map(Duration::from_secs);
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        return SnapshotConfig {
            poll_interval_ms: snapshot_poll_interval_ms_default(),
            timeout_secs: snapshot_timeout_secs_default(),
        };
    }
}

fn bsm_model_alias_default() -> String { return "bs_meter".to_string() }
fn bsm_string_encoding_default() -> TextEncoding { return TextEncoding::Utf8 }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct BsmConfig {
    #[serde(default="bsm_model_alias_default")]
    pub bsm_model_alias: String,
    #[serde(default="bsm_string_encoding_default")]
    pub string_encoding: TextEncoding,
    #[serde(default)]
    pub points: PointsConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

impl Default for BsmConfig {
    fn default() -> Self {
        return BsmConfig {
            bsm_model_alias: bsm_model_alias_default(),
            string_encoding: bsm_string_encoding_default(),
            points: PointsConfig::default(),
            crypto: CryptoConfig::default(),
            snapshot: SnapshotConfig::default(),
        };
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Config {
    pub connection: ConnectionConfig,
    /* directory with model_<id>.yaml files replacing the shipped definitions */
    #[serde(default)]
    pub model_definitions: Option<String>,
    #[serde(default)]
    pub bsm: BsmConfig,
}

impl Config {
    /// Loads `config/bsm.yaml`, falling back to `bsm.yaml`.
    pub fn load() -> Result<Self, ConfigError> {
        for path in ["config/bsm.yaml", "bsm.yaml"] {
            if Path::new(path).exists() {
                return Self::load_from(Path::new(path));
            }
        }

        return Err(ConfigError::NotFound);
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;
        let config = Self::from_yaml(&contents)?;
        info!("Using config {}", path.display());
        return Ok(config);
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        return Ok(serde_yml::from_str(contents)?);
    }
}
