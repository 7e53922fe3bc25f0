//! Candidate proposal strategies over a categorical parameter space.

use hs_space::{Assignment, ParameterSpace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::outcome::TrialOutcome;

/// Common trait for all search strategies.
pub trait SearchStrategy: Send + Sync {
    /// Next batch of at most `count` assignments. An empty batch means the
    /// strategy is exhausted.
    fn suggest(&mut self, count: usize) -> Vec<Assignment>;

    /// Report a finished trial so adaptive strategies can learn.
    fn report(&mut self, _assignment: &Assignment, _outcome: &TrialOutcome) {}

    /// Assignments left to propose, if finite.
    fn remaining(&self) -> Option<usize> {
        None
    }

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

/// Which built-in strategy a study uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Grid,
    Random,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grid => f.write_str("grid"),
            Self::Random => f.write_str("random"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "grid" => Ok(Self::Grid),
            "random" => Ok(Self::Random),
            other => Err(format!(
                "unknown search strategy '{other}' (expected grid or random)"
            )),
        }
    }
}

/// Construct a boxed strategy for `space`. `seed` only affects random search.
pub fn build_strategy(
    kind: StrategyKind,
    space: ParameterSpace,
    seed: Option<u64>,
) -> Box<dyn SearchStrategy> {
    match kind {
        StrategyKind::Grid => Box::new(GridSearch::new(space)),
        StrategyKind::Random => Box::new(RandomSearch::new(space, seed)),
    }
}

// ---- Grid search ----

/// Exhaustive cartesian product of every parameter's candidates, in
/// parameter order with the last parameter varying fastest.
///
/// Proposals are decoded from a cursor on demand, so only the requested
/// batch is ever held in memory.
#[derive(Debug, Clone)]
pub struct GridSearch {
    space: ParameterSpace,
    cursor: usize,
    total: usize,
}

impl GridSearch {
    pub fn new(space: ParameterSpace) -> Self {
        let total = if space.is_empty() {
            0
        } else {
            // A product past usize::MAX cannot be exhausted anyway.
            space.grid_size().unwrap_or(usize::MAX)
        };
        Self {
            space,
            cursor: 0,
            total,
        }
    }

    /// The `index`-th combination, read as a mixed-radix number whose last
    /// digit belongs to the last parameter.
    fn decode(&self, mut index: usize) -> Assignment {
        let mut picks: Vec<_> = self
            .space
            .iter()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .map(|(path, candidates)| {
                let value = candidates.values()[index % candidates.len()].clone();
                index /= candidates.len();
                (path.clone(), value)
            })
            .collect();
        picks.reverse();
        picks.into_iter().collect()
    }
}

impl SearchStrategy for GridSearch {
    fn suggest(&mut self, count: usize) -> Vec<Assignment> {
        let end = self.cursor.saturating_add(count).min(self.total);
        let batch = (self.cursor..end).map(|i| self.decode(i)).collect();
        self.cursor = end;
        batch
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.total - self.cursor)
    }

    fn name(&self) -> &str {
        "grid"
    }
}

// ---- Random search ----

/// Independent uniform sampling of one candidate per parameter. Never
/// exhausts unless the space is empty.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: ParameterSpace,
    rng: StdRng,
}

impl RandomSearch {
    pub fn new(space: ParameterSpace, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { space, rng }
    }

    fn sample_one(&mut self) -> Assignment {
        self.space
            .iter()
            .map(|(path, candidates)| {
                let idx = self.rng.random_range(0..candidates.len());
                (path.clone(), candidates.values()[idx].clone())
            })
            .collect()
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, count: usize) -> Vec<Assignment> {
        if self.space.is_empty() {
            return Vec::new();
        }
        (0..count).map(|_| self.sample_one()).collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_space::CandidateSet;
    use hs_types::{Literal, ParameterPath};

    fn path(s: &str) -> ParameterPath {
        s.parse().unwrap()
    }

    fn sample_space() -> ParameterSpace {
        ParameterSpace::new()
            .with_parameter(
                path("lr"),
                CandidateSet::new(vec![Literal::from(0.01), Literal::from(0.1)]).unwrap(),
            )
            .with_parameter(
                path("model.layers"),
                CandidateSet::new(vec![Literal::Int(2), Literal::Int(4), Literal::Int(8)])
                    .unwrap(),
            )
    }

    #[test]
    fn grid_search_produces_correct_count() {
        let space = sample_space();
        assert_eq!(space.grid_size(), Some(6));

        let mut gs = GridSearch::new(space);
        assert_eq!(gs.remaining(), Some(6));
        let batch = gs.suggest(100);
        assert_eq!(batch.len(), 6);
        assert_eq!(gs.remaining(), Some(0));
        assert!(gs.suggest(1).is_empty());
    }

    #[test]
    fn grid_search_varies_last_parameter_fastest() {
        let mut gs = GridSearch::new(sample_space());
        let batch = gs.suggest(4);
        let layers: Vec<_> = batch
            .iter()
            .map(|a| a.get(&path("model.layers")).unwrap().clone())
            .collect();
        assert_eq!(
            layers,
            vec![
                Literal::Int(2),
                Literal::Int(4),
                Literal::Int(8),
                Literal::Int(2)
            ]
        );
        assert_eq!(batch[3].get(&path("lr")), Some(&Literal::from(0.1)));
        let order: Vec<_> = batch[0].iter().map(|(p, _)| p.to_string()).collect();
        assert_eq!(order, vec!["lr", "model.layers"]);
    }

    #[test]
    fn grid_search_cursor_advances() {
        let mut gs = GridSearch::new(sample_space());
        assert_eq!(gs.suggest(4).len(), 4);
        assert_eq!(gs.suggest(10).len(), 2);
    }

    #[test]
    fn large_grid_is_decoded_lazily() {
        let mut space = ParameterSpace::new();
        for i in 0..10 {
            let values = (0..5).map(Literal::Int).collect();
            let candidates = CandidateSet::new(values).unwrap();
            space = space.with_parameter(path(&format!("p{i}")), candidates);
        }
        assert_eq!(space.grid_size(), Some(9_765_625));

        let mut gs = GridSearch::new(space.clone());
        let first = gs.suggest(1);
        assert_eq!(first.len(), 1);
        assert!(first[0].iter().all(|(_, v)| *v == Literal::Int(0)));
        assert_eq!(gs.remaining(), Some(9_765_624));

        let second = gs.suggest(1).remove(0);
        assert_eq!(second.get(&path("p9")), Some(&Literal::Int(1)));
        assert_eq!(second.get(&path("p8")), Some(&Literal::Int(0)));
        assert!(space.admits(&second).is_ok());
    }

    #[test]
    fn grid_search_matches_full_enumeration_order() {
        let mut gs = GridSearch::new(sample_space());
        let all = gs.suggest(6);
        let pairs: Vec<(Literal, Literal)> = all
            .iter()
            .map(|a| {
                (
                    a.get(&path("lr")).unwrap().clone(),
                    a.get(&path("model.layers")).unwrap().clone(),
                )
            })
            .collect();
        let mut expected = Vec::new();
        for lr in [Literal::from(0.01), Literal::from(0.1)] {
            for layers in [2, 4, 8] {
                expected.push((lr.clone(), Literal::Int(layers)));
            }
        }
        assert_eq!(pairs, expected);
    }

    #[test]
    fn empty_space_proposes_nothing() {
        assert!(GridSearch::new(ParameterSpace::new()).suggest(1).is_empty());
        assert!(RandomSearch::new(ParameterSpace::new(), Some(1))
            .suggest(1)
            .is_empty());
    }

    #[test]
    fn random_search_stays_in_space() {
        let space = sample_space();
        let mut rs = RandomSearch::new(space.clone(), Some(7));
        for assignment in rs.suggest(50) {
            assert!(space.admits(&assignment).is_ok());
        }
        assert_eq!(rs.remaining(), None);
    }

    #[test]
    fn random_search_is_reproducible_with_seed() {
        let a = RandomSearch::new(sample_space(), Some(42)).suggest(10);
        let b = RandomSearch::new(sample_space(), Some(42)).suggest(10);
        assert_eq!(a, b);
    }

    #[test]
    fn strategy_kind_parsing() {
        assert_eq!("grid".parse::<StrategyKind>().unwrap(), StrategyKind::Grid);
        assert_eq!("Random".parse::<StrategyKind>().unwrap(), StrategyKind::Random);
        assert!("bayesian".parse::<StrategyKind>().is_err());
        let strategy = build_strategy(StrategyKind::Random, sample_space(), None);
        assert_eq!(strategy.name(), "random");
    }
}
