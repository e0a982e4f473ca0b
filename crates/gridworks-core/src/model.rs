use crate::geometry::Size;
use crate::world::World;
use serde::{Deserialize, Serialize};

/// Descriptive metadata of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelInfo {
    pub title: String,
    pub author: String,
    pub version: String,
    pub description: String,
    /// Cleared for models saved as locked.
    pub editable: bool,
}

impl Default for ModelInfo {
    fn default() -> Self {
        Self {
            title: String::new(),
            author: String::new(),
            version: String::new(),
            description: String::new(),
            editable: true,
        }
    }
}

/// A world plus its metadata.
#[derive(Debug, Clone)]
pub struct Model {
    pub world: World,
    pub info: ModelInfo,
}

impl Model {
    pub fn new(world: World) -> Self {
        Self {
            world,
            info: ModelInfo::default(),
        }
    }

    /// A model of blank cells.
    pub fn blank(model_name: &str, model_size: Size, bank_name: &str, bank_size: Size) -> Self {
        Self::new(World::new(model_name, model_size, bank_name, bank_size))
    }
}
