use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use serde::Deserialize;
use serde_yml;

use super::types::{Access, PointType};
use super::SunSpecError;

/* Definitions shipped with the crate, keyed by model id */
const BUILTIN_MODELS: [(u16, &str); 8] = [
    (1, include_str!("../../defs/sunspec/model_1.yaml")),
    (10, include_str!("../../defs/sunspec/model_10.yaml")),
    (17, include_str!("../../defs/sunspec/model_17.yaml")),
    (203, include_str!("../../defs/sunspec/model_203.yaml")),
    (64900, include_str!("../../defs/sunspec/model_64900.yaml")),
    (64901, include_str!("../../defs/sunspec/model_64901.yaml")),
    (64902, include_str!("../../defs/sunspec/model_64902.yaml")),
    (64903, include_str!("../../defs/sunspec/model_64903.yaml")),
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PointDefinition {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub point_type: PointType,
    /* only used by strings */
    #[serde(default)]
    pub len: Option<u16>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub sf: Option<String>, // scale factor point id
    #[serde(default)]
    pub access: Access,
}

impl PointDefinition {
    pub fn register_count(&self) -> u16 {
        return self.point_type.fixed_len().or(self.len).unwrap_or(0);
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelDefinition {
    pub id: u16,
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub fixed: Vec<PointDefinition>,
    #[serde(default)]
    pub repeating: Vec<PointDefinition>,
}

impl ModelDefinition {
    pub fn from_yaml(contents: &str) -> Result<Self, SunSpecError> {
        let definition: ModelDefinition = serde_yml::from_str(contents)
            .map_err(|e| SunSpecError::InvalidDefinition(format!("{e}")))?;
        definition.validate()?;
        return Ok(definition);
    }

    pub fn fixed_len(&self) -> u16 {
        return self.fixed.iter().map(|p| p.register_count()).sum();
    }

    pub fn repeating_len(&self) -> u16 {
        return self.repeating.iter().map(|p| p.register_count()).sum();
    }

    pub fn point(&self, id: &str) -> Option<&PointDefinition> {
        return self.fixed.iter().find(|p| p.id == id);
    }

    fn validate(&self) -> Result<(), SunSpecError> {
        for block in [&self.fixed, &self.repeating] {
            let mut seen = HashSet::new();
            for point in block.iter() {
                if point.point_type == PointType::Text && point.len.unwrap_or(0) == 0 {
                    return Err(SunSpecError::InvalidDefinition(format!(
                        "string point {} of model {} needs a length", point.id, self.id)));
                }
                if !seen.insert(point.id.as_str()) {
                    return Err(SunSpecError::InvalidDefinition(format!(
                        "duplicate point {} in model {}", point.id, self.id)));
                }
            }
        }
        return Ok(());
    }
}

/// The set of model definitions a device may instantiate.
#[derive(Debug, Clone, Default)]
pub struct ModelLibrary {
    models: HashMap<u16, Arc<ModelDefinition>>,
}

impl ModelLibrary {
    pub fn builtin() -> Result<Self, SunSpecError> {
        return Self::load(None);
    }

    /// Loads every known model. User provided definitions in `user_dir`
    /// (`model_<id>.yaml`) are used first, the shipped ones otherwise.
    pub fn load(user_dir: Option<&Path>) -> Result<Self, SunSpecError> {
        let mut library = ModelLibrary::default();

        for (id, builtin) in BUILTIN_MODELS.iter() {
            let user_file = user_dir.map(|dir| dir.join(format!("model_{id}.yaml")));
            let definition = match user_file {
                Some(path) if path.exists() => {
                    info!("Using user provided definition of model {id}");
                    let mut contents = String::new();
                    File::open(&path)?.read_to_string(&mut contents)?;
                    ModelDefinition::from_yaml(&contents)?
                }
                _ => {
                    debug!("Loading definition of model {id}");
                    ModelDefinition::from_yaml(builtin)?
                }
            };

            if definition.id != *id {
                return Err(SunSpecError::InvalidDefinition(format!(
                    "definition for model {} declares id {}", id, definition.id)));
            }
            library.insert(definition);
        }

        return Ok(library);
    }

    pub fn insert(&mut self, definition: ModelDefinition) {
        self.models.insert(definition.id, Arc::new(definition));
    }

    pub fn get(&self, id: u16) -> Option<Arc<ModelDefinition>> {
        return self.models.get(&id).cloned();
    }

    pub fn len(&self) -> usize {
        return self.models.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.models.is_empty();
    }
}
