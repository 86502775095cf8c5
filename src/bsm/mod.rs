//! Client for signing meters: fixed model layout, snapshots, BLOB data and
//! signature verification.

use std::collections::HashMap;

use log::{debug, info};
use thiserror::Error;

use crate::config::BsmConfig;
use crate::sunspec::{Device, Model, ModelHandle, ModelLibrary, PointValue, SunSpecError, Transport};

pub mod registry;
pub mod blob;
pub mod crypto;
pub mod snapshot;
pub mod verify;
pub mod ocmf;
#[cfg(test)]
pub(crate) mod simulator;

use crypto::{CryptoError, CryptoProvider, EcdsaProvider};
use registry::{ModelInstanceDescriptor, MODEL_INSTANCES};

#[derive(Error, Debug)]
pub enum BsmError {
    #[error("Unknown model alias {0}")]
    UnknownAlias(String),
    #[error("Unknown snapshot alias {0}")]
    UnknownSnapshotAlias(String),
    #[error("Model {model} has no point {point}")]
    MissingPoint { model: String, point: String },
    #[error("No value for {point} in {model}, has the model been read?")]
    MissingValue { model: String, point: String },
    #[error("Layout mismatch in {model}: {declared} BLOB registers declared but {blocks} blocks present")]
    LayoutMismatch { model: String, declared: i64, blocks: usize },
    #[error("Unexpected curve {actual:?}, expected {expected}")]
    UnexpectedCurve { expected: String, actual: Option<String> },
    #[error("Unknown snapshot status {0:?}")]
    UnknownSnapshotStatus(Option<i64>),
    #[error(transparent)]
    SunSpec(#[from] SunSpecError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// A signing meter with all models of its known layout registered.
pub struct BsmDevice<T: Transport> {
    device: Device<T>,
    config: BsmConfig,
    crypto: Box<dyn CryptoProvider>,
    /* same order as MODEL_INSTANCES */
    instances: Vec<ModelHandle>,
    model_aliases: HashMap<String, ModelHandle>,
    snapshot_aliases: HashMap<String, ModelHandle>,
}

fn register_aliases(dictionary: &mut HashMap<String, ModelHandle>, aliases: &[&str], handle: ModelHandle) {
    for alias in aliases {
        dictionary.insert(alias.to_string(), handle);
    }
}

impl<T: Transport> BsmDevice<T> {
    /// Builds the model layout from the registry. Every model header gets read
    /// once for its length, no scan takes place.
    pub fn new(transport: T, library: ModelLibrary, config: BsmConfig) -> Result<Self, BsmError> {
        let device = Device::new(transport, library, config.string_encoding);
        return Self::from_device(device, config);
    }

    pub fn from_device(mut device: Device<T>, config: BsmConfig) -> Result<Self, BsmError> {
        let mut instances = Vec::with_capacity(MODEL_INSTANCES.len());
        let mut model_aliases = HashMap::new();
        let mut snapshot_aliases = HashMap::new();
        let mut address = registry::first_model_address();

        for (index, info) in MODEL_INSTANCES.iter().enumerate() {
            let model = device.load_model(info.id, address, 0)?;
            let len = model.len();
            let handle = device.add_model(model);
            debug!("Registered {} ({}) at {} with {} registers", info.label, info.id, address, len);

            instances.push(handle);
            register_aliases(&mut model_aliases, info.aliases, handle);
            if info.is_snapshot {
                register_aliases(&mut snapshot_aliases, info.aliases, handle);
            }

            /* nothing follows the last instance */
            if index + 1 < MODEL_INSTANCES.len() {
                address = registry::next_model_address(address, len)?;
            }
        }

        info!("Signing meter layout with {} model instances ready", instances.len());
        return Ok(BsmDevice {
            device,
            config,
            crypto: Box::new(EcdsaProvider),
            instances,
            model_aliases,
            snapshot_aliases,
        });
    }

    pub fn with_crypto_provider(mut self, crypto: Box<dyn CryptoProvider>) -> Self {
        self.crypto = crypto;
        return self;
    }

    pub fn config(&self) -> &BsmConfig {
        return &self.config;
    }

    pub fn device(&self) -> &Device<T> {
        return &self.device;
    }

    pub fn device_mut(&mut self) -> &mut Device<T> {
        return &mut self.device;
    }

    /// Model instance by any of its aliases.
    pub fn model(&self, alias: &str) -> Result<ModelHandle, BsmError> {
        return self
            .model_aliases
            .get(alias)
            .copied()
            .ok_or_else(|| BsmError::UnknownAlias(alias.to_string()));
    }

    /// Snapshot model instance by any of its aliases.
    pub fn snapshot(&self, alias: &str) -> Result<ModelHandle, BsmError> {
        return self
            .snapshot_aliases
            .get(alias)
            .copied()
            .ok_or_else(|| BsmError::UnknownSnapshotAlias(alias.to_string()));
    }

    pub fn model_ref(&self, handle: ModelHandle) -> &Model {
        return self.device.model(handle);
    }

    pub fn read_model(&mut self, handle: ModelHandle) -> Result<(), BsmError> {
        self.device.read_points(handle)?;
        return Ok(());
    }

    fn descriptor(&self, handle: ModelHandle) -> Option<&'static ModelInstanceDescriptor> {
        let index = self.instances.iter().position(|h| *h == handle)?;
        return MODEL_INSTANCES.get(index);
    }

    /// Label of the model instance, like "Signed Turn-On Snapshot".
    pub fn model_instance_label(&self, handle: ModelHandle) -> Option<&'static str> {
        return self.descriptor(handle).map(|d| d.label);
    }

    pub fn aliases(&self, handle: ModelHandle) -> &'static [&'static str] {
        return self.descriptor(handle).map(|d| d.aliases).unwrap_or(&[]);
    }

    /// First alias under which `handle` is known as a snapshot.
    pub fn snapshot_alias(&self, handle: ModelHandle) -> Option<&'static str> {
        let descriptor = self.descriptor(handle)?;
        if !descriptor.is_snapshot {
            return None;
        }
        return descriptor.aliases.first().copied();
    }

    pub fn snapshot_aliases(&self) -> impl Iterator<Item = &str> {
        return self.snapshot_aliases.keys().map(|k| k.as_str());
    }

    fn model_name(&self, handle: ModelHandle) -> String {
        return match self.model_instance_label(handle) {
            Some(label) => label.to_string(),
            None => format!("model {}", self.model_ref(handle).id()),
        };
    }

    pub(crate) fn point_value(&self, handle: ModelHandle, id: &str) -> Result<Option<&PointValue>, BsmError> {
        let point = self.model_ref(handle).point(id).ok_or_else(|| BsmError::MissingPoint {
            model: self.model_name(handle),
            point: id.to_string(),
        })?;
        return Ok(point.value());
    }

    pub(crate) fn point_integer(&self, handle: ModelHandle, id: &str) -> Result<Option<i64>, BsmError> {
        return Ok(self.point_value(handle, id)?.and_then(PointValue::as_i64));
    }

    pub(crate) fn point_text(&self, handle: ModelHandle, id: &str) -> Result<Option<String>, BsmError> {
        return Ok(self.point_value(handle, id)?.and_then(PointValue::as_str).map(str::to_string));
    }
}
