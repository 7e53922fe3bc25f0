//! Parameter space and per-trial assignments.

use hs_types::{Literal, ParameterPath, SpaceError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered, non-empty candidate values for one tunable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Literal>", into = "Vec<Literal>")]
pub struct CandidateSet(Vec<Literal>);

impl CandidateSet {
    pub fn new(values: Vec<Literal>) -> Result<Self, SpaceError> {
        if values.is_empty() {
            return Err(SpaceError::Parse {
                offset: 0,
                message: "annotation has no candidate values".to_string(),
            });
        }
        Ok(Self(values))
    }

    pub fn values(&self) -> &[Literal] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, value: &Literal) -> bool {
        self.0.contains(value)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Literal> {
        self.0.iter()
    }
}

impl TryFrom<Vec<Literal>> for CandidateSet {
    type Error = SpaceError;

    fn try_from(values: Vec<Literal>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<CandidateSet> for Vec<Literal> {
    fn from(set: CandidateSet) -> Self {
        set.0
    }
}

/// Mapping from parameter path to its candidate values, in the order the
/// paths were discovered in the config tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpace {
    parameters: IndexMap<ParameterPath, CandidateSet>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion. A repeated path replaces the earlier entry
    /// in place.
    pub fn with_parameter(mut self, path: ParameterPath, candidates: CandidateSet) -> Self {
        self.parameters.insert(path, candidates);
        self
    }

    pub(crate) fn insert(&mut self, path: ParameterPath, candidates: CandidateSet) {
        self.parameters.insert(path, candidates);
    }

    pub fn get(&self, path: &ParameterPath) -> Option<&CandidateSet> {
        self.parameters.get(path)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &ParameterPath> {
        self.parameters.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParameterPath, &CandidateSet)> {
        self.parameters.iter()
    }

    /// Number of distinct assignments (`None` on overflow).
    pub fn grid_size(&self) -> Option<usize> {
        self.parameters
            .values()
            .try_fold(1usize, |total, set| total.checked_mul(set.len()))
    }

    /// Check that `assignment` covers exactly this space's paths and that
    /// every value is one of its path's candidates.
    pub fn admits(&self, assignment: &Assignment) -> Result<(), SpaceError> {
        for (path, value) in assignment.iter() {
            let candidates = self.get(path).ok_or_else(|| SpaceError::Resolution {
                path: path.to_string(),
            })?;
            if !candidates.contains(value) {
                return Err(SpaceError::NotInSpace {
                    path: path.to_string(),
                    value: value.to_string(),
                });
            }
        }
        if let Some(missing) = self.paths().find(|p| assignment.get(p).is_none()) {
            return Err(SpaceError::Resolution {
                path: missing.to_string(),
            });
        }
        Ok(())
    }
}

/// One concrete value per tunable path, proposed for a single trial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    values: IndexMap<ParameterPath, Literal>,
}

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: ParameterPath, value: impl Into<Literal>) -> Self {
        self.values.insert(path, value.into());
        self
    }

    pub fn insert(&mut self, path: ParameterPath, value: Literal) {
        self.values.insert(path, value);
    }

    pub fn get(&self, path: &ParameterPath) -> Option<&Literal> {
        self.values.get(path)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Pairs in insertion order, which is also the trial-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&ParameterPath, &Literal)> {
        self.values.iter()
    }
}

impl FromIterator<(ParameterPath, Literal)> for Assignment {
    fn from_iter<I: IntoIterator<Item = (ParameterPath, Literal)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ParameterPath {
        s.parse().unwrap()
    }

    fn sample_space() -> ParameterSpace {
        ParameterSpace::new()
            .with_parameter(
                path("lr"),
                CandidateSet::new(vec![Literal::Float(0.01), Literal::Float(0.1)]).unwrap(),
            )
            .with_parameter(
                path("model.layers[0]"),
                CandidateSet::new(vec![Literal::Int(2), Literal::Int(4), Literal::Int(8)])
                    .unwrap(),
            )
    }

    #[test]
    fn candidate_set_rejects_empty() {
        assert!(CandidateSet::new(vec![]).is_err());
        let json = "[]";
        assert!(serde_json::from_str::<CandidateSet>(json).is_err());
    }

    #[test]
    fn grid_size_multiplies_candidates() {
        assert_eq!(sample_space().grid_size(), Some(6));
        assert_eq!(ParameterSpace::new().grid_size(), Some(1));
    }

    #[test]
    fn paths_keep_insertion_order() {
        let space = sample_space();
        let order: Vec<String> = space.paths().map(|p| p.to_string()).collect();
        assert_eq!(order, ["lr", "model.layers[0]"]);
    }

    #[test]
    fn admits_checks_membership_and_coverage() {
        let space = sample_space();
        let ok = Assignment::new()
            .with(path("lr"), 0.1)
            .with(path("model.layers[0]"), 4i64);
        assert!(space.admits(&ok).is_ok());

        let foreign = Assignment::new()
            .with(path("lr"), 0.5)
            .with(path("model.layers[0]"), 4i64);
        assert!(matches!(
            space.admits(&foreign),
            Err(SpaceError::NotInSpace { .. })
        ));

        let partial = Assignment::new().with(path("lr"), 0.1);
        assert!(matches!(
            space.admits(&partial),
            Err(SpaceError::Resolution { .. })
        ));
    }

    #[test]
    fn space_serializes_with_string_keys() {
        let json = serde_json::to_value(sample_space()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"parameters": {"lr": [0.01, 0.1], "model.layers[0]": [2, 4, 8]}})
        );
    }
}
