//! Resolve an assignment into a concrete trial config.

use hs_types::{ConfigNode, ParameterPath, SpaceError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::space::Assignment;

/// Supported model families. Each one knows which config fields carry the
/// run name its trainer uses for logging and output directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Nequip,
    Mace,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Nequip, ModelKind::Mace];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nequip => "Nequip",
            Self::Mace => "Mace",
        }
    }

    /// Config fields that receive the trial name.
    pub fn naming_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Nequip => &["trainer.logger.name"],
            Self::Mace => &[
                "name",
                "model_dir",
                "log_dir",
                "checkpoints_dir",
                "results_dir",
                "wandb_name",
            ],
        }
    }

    /// Write the trial name into this model's naming fields, creating
    /// missing mapping levels.
    pub fn apply_naming(&self, config: &mut ConfigNode, name: &str) -> Result<(), SpaceError> {
        for field in self.naming_fields() {
            let path: ParameterPath = field.parse()?;
            path.upsert(config, ConfigNode::String(name.to_string()))?;
        }
        Ok(())
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = SpaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SpaceError::UnknownModel {
                name: s.to_string(),
            })
    }
}

/// A fully resolved trial config and its name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedTrial {
    pub name: String,
    pub config: ConfigNode,
}

/// Apply `assignment` to a copy of `base` and stamp the trial name into the
/// model's naming fields.
pub fn materialize(
    base: &ConfigNode,
    assignment: &Assignment,
    model: ModelKind,
    ordinal: usize,
) -> Result<MaterializedTrial, SpaceError> {
    let mut config = base.clone();
    for (path, value) in assignment.iter() {
        path.assign(&mut config, value.to_node())?;
    }

    let name = trial_name(model, ordinal, assignment);
    model.apply_naming(&mut config, &name)?;

    Ok(MaterializedTrial { name, config })
}

/// `{model}_{ordinal}_{path}_{value}[_{path}_{value}...]` in assignment
/// order, with path separators and whitespace replaced so the name is a
/// single directory component.
pub fn trial_name(model: ModelKind, ordinal: usize, assignment: &Assignment) -> String {
    let pairs: Vec<String> = assignment
        .iter()
        .map(|(path, value)| format!("{path}_{value}"))
        .collect();
    let raw = format!("{model}_{ordinal}_{}", pairs.join("_"));
    raw.chars()
        .map(|c| if c == '/' || c == '\\' || c.is_whitespace() { '-' } else { c })
        .collect()
}
