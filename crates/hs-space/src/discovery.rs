//! Discovery of study directories (`opt_<Model>/` with a config and a job
//! script template).

use hs_types::{load_yaml, ConfigNode, HsResult};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::materialize::ModelKind;
use crate::walker::{extract_with_report, ExtractionReport};

pub const STUDY_DIR_PREFIX: &str = "opt";
pub const STUDY_CONFIG_FILE: &str = "config.yaml";
pub const STUDY_SCRIPT_FILE: &str = "job.sh";

/// A study directory and the search space extracted from its config.
#[derive(Debug, Clone)]
pub struct StudyDir {
    pub root: PathBuf,
    /// Suffix after the last `_` of the directory name, e.g. `Mace` for
    /// `opt_Mace`.
    pub model_name: String,
    pub base_config: ConfigNode,
    pub report: ExtractionReport,
}

impl StudyDir {
    /// Load a single study directory.
    pub fn load<P: AsRef<Path>>(root: P) -> HsResult<Self> {
        let root = root.as_ref().to_path_buf();
        let dir_name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let model_name = dir_name
            .rsplit('_')
            .next()
            .unwrap_or(dir_name.as_str())
            .to_string();

        let base_config = load_yaml(root.join(STUDY_CONFIG_FILE))?;
        let report = extract_with_report(&base_config);

        Ok(Self {
            root,
            model_name,
            base_config,
            report,
        })
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(STUDY_CONFIG_FILE)
    }

    pub fn script_path(&self) -> PathBuf {
        self.root.join(STUDY_SCRIPT_FILE)
    }

    /// Model kind named by the directory suffix, if supported.
    pub fn model_kind(&self) -> HsResult<ModelKind> {
        Ok(self.model_name.parse::<ModelKind>()?)
    }
}

/// Find every `opt*` directory under `root` that holds a config file,
/// sorted by name.
pub fn discover_studies<P: AsRef<Path>>(root: P) -> HsResult<Vec<StudyDir>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root.as_ref())?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .map(|n| n.to_string_lossy().starts_with(STUDY_DIR_PREFIX))
                    .unwrap_or(false)
                && path.join(STUDY_CONFIG_FILE).is_file()
        })
        .collect();
    dirs.sort();

    let mut studies = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let study = StudyDir::load(&dir)?;
        info!(
            study = %dir.display(),
            model = %study.model_name,
            parameters = study.report.space.len(),
            skipped = study.report.skipped.len(),
            "discovered study"
        );
        studies.push(study);
    }
    Ok(studies)
}
