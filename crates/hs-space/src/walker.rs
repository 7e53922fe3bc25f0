//! Config tree walk that collects annotated leaves into a parameter space.

use hs_types::{ConfigNode, ParameterPath, SpaceError};
use serde::Serialize;
use tracing::{debug, warn};

use crate::annotation::{is_annotation, parse_annotation};
use crate::space::ParameterSpace;

/// An annotated leaf that failed to parse and was left out of the space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedLeaf {
    pub path: ParameterPath,
    pub text: String,
    #[serde(serialize_with = "serialize_error")]
    pub error: SpaceError,
}

/// Result of a best-effort extraction: the usable space plus every leaf that
/// looked like an annotation but was skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionReport {
    pub space: ParameterSpace,
    pub skipped: Vec<SkippedLeaf>,
}

impl ExtractionReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Extract the parameter space from a config tree. Malformed annotations
/// are omitted; use [`extract_with_report`] to see them.
pub fn extract(tree: &ConfigNode) -> ParameterSpace {
    extract_with_report(tree).space
}

/// Depth-first extraction, mappings in key order and sequences in index
/// order.
pub fn extract_with_report(tree: &ConfigNode) -> ExtractionReport {
    let mut report = ExtractionReport::default();
    walk(tree, ParameterPath::root(), &mut report);
    report
}

fn walk(node: &ConfigNode, path: ParameterPath, report: &mut ExtractionReport) {
    match node {
        ConfigNode::Object(map) => {
            for (key, child) in map {
                walk(child, path.key(key.as_str()), report);
            }
        }
        ConfigNode::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                walk(child, path.index(idx), report);
            }
        }
        ConfigNode::String(text) if is_annotation(text) => match parse_annotation(text) {
            Ok(candidates) => {
                debug!(path = %path, candidates = candidates.len(), "found tunable parameter");
                report.space.insert(path, candidates);
            }
            Err(error) => {
                warn!(path = %path, %error, "skipping malformed annotation");
                report.skipped.push(SkippedLeaf {
                    path,
                    text: text.clone(),
                    error,
                });
            }
        },
        _ => {}
    }
}

fn serialize_error<S: serde::Serializer>(
    error: &SpaceError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}
