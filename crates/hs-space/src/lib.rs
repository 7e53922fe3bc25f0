//! # hs-space
//!
//! Search-space extraction and trial materialization for HyperSweep.
//!
//! Training configs mark tunable leaves with `optuna(v1, v2, [v3, v4])`
//! annotations. This crate parses those annotations, walks a config tree to
//! build a [`ParameterSpace`], and resolves one concrete [`Assignment`] back
//! into a runnable config with a deterministic trial name.

mod annotation;
mod discovery;
mod materialize;
mod space;
mod walker;

pub use annotation::{is_annotation, parse_annotation, ANNOTATION_KEYWORD};
pub use discovery::{discover_studies, StudyDir, STUDY_CONFIG_FILE, STUDY_SCRIPT_FILE};
pub use materialize::{materialize, trial_name, MaterializedTrial, ModelKind};
pub use space::{Assignment, CandidateSet, ParameterSpace};
pub use walker::{extract, extract_with_report, ExtractionReport, SkippedLeaf};
