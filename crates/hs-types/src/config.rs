//! Config tree representation and YAML I/O.

use std::path::Path;

use crate::errors::HsResult;

/// A node of a training configuration: a mapping (key order preserved), a
/// sequence, or a scalar.
pub type ConfigNode = serde_json::Value;

/// Parse a YAML document into a config tree.
pub fn parse_yaml(text: &str) -> HsResult<ConfigNode> {
    let node: ConfigNode = serde_yaml::from_str(text)?;
    Ok(node)
}

/// Load a YAML config file.
pub fn load_yaml<P: AsRef<Path>>(path: P) -> HsResult<ConfigNode> {
    let text = std::fs::read_to_string(path)?;
    parse_yaml(&text)
}

/// Render a config tree as YAML.
pub fn to_yaml(node: &ConfigNode) -> HsResult<String> {
    Ok(serde_yaml::to_string(node)?)
}

/// Write a config tree to a YAML file.
pub fn save_yaml<P: AsRef<Path>>(path: P, node: &ConfigNode) -> HsResult<()> {
    std::fs::write(path, to_yaml(node)?)?;
    Ok(())
}
