use serde::Serialize;
use std::cmp::Ordering;

use crate::config::MatchConfig;
use crate::core::types::Confidence;
use crate::matching::scoring::ScoredCandidate;

/// Outcome of scoring a candidate set
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", content = "candidates", rename_all = "snake_case")]
pub enum Decision {
    /// A single clear winner, eligible to be applied without confirmation
    StrongMatch(Box<ScoredCandidate>),
    /// Plausible candidates ordered by ascending distance; needs confirmation
    AmbiguousMatch(Vec<ScoredCandidate>),
    NoMatch,
}

impl Decision {
    #[must_use]
    pub fn confidence(&self) -> Confidence {
        match self {
            Self::StrongMatch(_) => Confidence::Strong,
            Self::AmbiguousMatch(_) => Confidence::Ambiguous,
            Self::NoMatch => Confidence::None,
        }
    }

    /// Best candidate, if any was recommended
    #[must_use]
    pub fn best(&self) -> Option<&ScoredCandidate> {
        match self {
            Self::StrongMatch(c) => Some(c),
            Self::AmbiguousMatch(cs) => cs.first(),
            Self::NoMatch => None,
        }
    }

    /// Candidates carried by the decision, best first
    #[must_use]
    pub fn candidates(&self) -> &[ScoredCandidate] {
        match self {
            Self::StrongMatch(c) => std::slice::from_ref(c.as_ref()),
            Self::AmbiguousMatch(cs) => cs,
            Self::NoMatch => &[],
        }
    }
}

/// Ranking order: distance, then backend priority, then candidate id
pub fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    a.total()
        .total_cmp(&b.total())
        .then(a.source_priority.cmp(&b.source_priority))
        .then_with(|| a.release.id.cmp(&b.release.id))
}

/// Sort candidates into ranking order
pub fn rank(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(rank_order);
}

/// Classify a scored candidate set.
///
/// - empty: no match
/// - best within `strong_threshold` and the runner-up more than
///   `near_tie_margin` behind: strong match
/// - best within `acceptance_ceiling`: ambiguous, carrying the `top_n` best
/// - otherwise: no match
///
/// Input order does not matter; candidates are ranked first.
#[must_use]
pub fn recommend(mut candidates: Vec<ScoredCandidate>, config: &MatchConfig) -> Decision {
    rank(&mut candidates);

    let Some(best) = candidates.first() else {
        return Decision::NoMatch;
    };
    let best_total = best.total();

    let near_tie = candidates
        .get(1)
        .is_some_and(|second| second.total() - best_total <= config.near_tie_margin);

    if best_total <= config.strong_threshold && !near_tie {
        let best = candidates.swap_remove(0);
        return Decision::StrongMatch(Box::new(best));
    }

    if best_total <= config.acceptance_ceiling {
        candidates.truncate(config.top_n);
        return Decision::AmbiguousMatch(candidates);
    }

    Decision::NoMatch
}
