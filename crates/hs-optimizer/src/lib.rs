//! # hs-optimizer
//!
//! Candidate proposal and study bookkeeping for HyperSweep.
//!
//! Provides categorical grid and seeded random search over a
//! [`hs_space::ParameterSpace`], trial tracking, and the [`Study`] loop that
//! feeds proposals to an [`Objective`] one trial at a time.

mod outcome;
mod search;
mod study;
mod trial;

pub use outcome::{PruneKind, PruneReason, TrialOutcome};
pub use search::{build_strategy, GridSearch, RandomSearch, SearchStrategy, StrategyKind};
pub use study::{Objective, Study, TrialProposal};
pub use trial::{
    ObjectiveDirection, StudyConfig, StudyId, StudyState, StudyStatus, Trial, TrialStatus,
};
