//! Minimum-cost alignment between local tracks and candidate tracks.
//!
//! The problem is solved as a square assignment over `m + n` rows and columns:
//!
//! ```text
//!                 candidates (n)        local-unmatched (m)
//! local (m)     [ pair costs      |  P on diagonal, else ∞ ]
//! cand-unm. (n) [ P on diag, else ∞ |  0                   ]
//! ```
//!
//! Leaving a track unmatched costs `P`, so two tracks are only paired when their
//! distance is below `2P`. Costs are quantized to integers and each pair cell
//! also carries the displacement between the local track's ordinal and the
//! candidate position, scaled below one cost unit. Equal-cost assignments are
//! therefore resolved toward the one that best preserves track order, and the
//! result is bit-for-bit reproducible.

use serde::Serialize;
use thiserror::Error;

use crate::utils::validation::MAX_TRACKS;

/// Resolution of quantized costs (one unit = 1e-6 distance)
const COST_SCALE: f64 = 1_000_000.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignmentError {
    #[error("Too many tracks to align: {local} local, {candidate} candidate (max {MAX_TRACKS})")]
    TooManyTracks { local: usize, candidate: usize },

    #[error("Non-finite cost between local track {local} and candidate track {candidate}")]
    NonFiniteCost { local: usize, candidate: usize },
}

/// Dense row-major matrix of pair costs (rows = local, cols = candidate)
#[derive(Debug, Clone)]
pub struct CostMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl CostMatrix {
    pub fn from_fn(rows: usize, cols: usize, mut cost: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                data.push(cost(i, j));
            }
        }
        Self { rows, cols, data }
    }

    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }
}

/// One matched (local, candidate) pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackPair {
    pub local: usize,
    pub candidate: usize,
    pub cost: f64,
}

/// Mapping from local tracks to candidate tracks, by index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alignment {
    /// Matched pairs ordered by local index
    pub pairs: Vec<TrackPair>,
    pub unmatched_local: Vec<usize>,
    pub unmatched_candidate: Vec<usize>,
    /// Sum of pair costs plus `P` for every unmatched track
    pub cost: f64,
    /// Whether the positional shortcut produced this alignment
    #[serde(skip)]
    pub positional: bool,
}

impl Alignment {
    /// Alignment where nothing is paired
    #[must_use]
    pub fn unmatched(local: usize, candidate: usize, unmatched_cost: f64) -> Self {
        Self {
            pairs: Vec::new(),
            unmatched_local: (0..local).collect(),
            unmatched_candidate: (0..candidate).collect(),
            cost: unmatched_cost * crate::utils::validation::count_to_f64(local + candidate),
            positional: false,
        }
    }

    /// A lone local track paired with one candidate track
    #[must_use]
    pub fn single(candidate: usize, cost: f64) -> Self {
        Self {
            pairs: vec![TrackPair {
                local: 0,
                candidate,
                cost,
            }],
            unmatched_local: Vec::new(),
            unmatched_candidate: Vec::new(),
            cost,
            positional: false,
        }
    }

    /// Mean cost over matched pairs, None if nothing matched
    #[must_use]
    pub fn mean_pair_cost(&self) -> Option<f64> {
        if self.pairs.is_empty() {
            return None;
        }
        let total: f64 = self.pairs.iter().map(|p| p.cost).sum();
        Some(total / crate::utils::validation::count_to_f64(self.pairs.len()))
    }

    /// Candidate track matched to a local track
    #[must_use]
    pub fn candidate_for(&self, local: usize) -> Option<usize> {
        self.pairs
            .iter()
            .find(|p| p.local == local)
            .map(|p| p.candidate)
    }
}

/// Compute the minimum-cost alignment.
///
/// `local_ordinals[i]` is the candidate index local track `i` is expected at;
/// it only influences which of several equal-cost alignments is returned.
/// Ordinals need not be distinct and may point past the last candidate.
///
/// # Errors
///
/// Returns `AlignmentError::TooManyTracks` if either side exceeds
/// [`MAX_TRACKS`], or `AlignmentError::NonFiniteCost` if a cost is NaN or
/// infinite.
pub fn align(
    costs: &CostMatrix,
    local_ordinals: &[usize],
    unmatched_cost: f64,
) -> Result<Alignment, AlignmentError> {
    let m = costs.rows();
    let n = costs.cols();

    if m > MAX_TRACKS || n > MAX_TRACKS {
        return Err(AlignmentError::TooManyTracks {
            local: m,
            candidate: n,
        });
    }
    for i in 0..m {
        for j in 0..n {
            if !costs.get(i, j).is_finite() {
                return Err(AlignmentError::NonFiniteCost {
                    local: i,
                    candidate: j,
                });
            }
        }
    }

    if m == 0 || n == 0 {
        return Ok(Alignment::unmatched(m, n, unmatched_cost));
    }

    if let Some(alignment) = positional_alignment(costs, local_ordinals) {
        return Ok(alignment);
    }

    let assignment = solve(&build_matrix(costs, local_ordinals, unmatched_cost));

    let mut pairs = Vec::new();
    let mut matched_candidate = vec![false; n];
    for (i, &col) in assignment.iter().take(m).enumerate() {
        if col < n {
            pairs.push(TrackPair {
                local: i,
                candidate: col,
                cost: clamp_cost(costs.get(i, col)),
            });
            matched_candidate[col] = true;
        }
    }

    Ok(finish(pairs, &matched_candidate, m, unmatched_cost))
}

/// Shortcut when local and candidate track lists already line up perfectly.
///
/// Applies when both sides have the same length, the ordinals are a
/// permutation of the candidate indices, and every local track costs nothing
/// against the candidate at its ordinal. That assignment has zero
/// cost and zero displacement, so it is the unique optimum of the full solve.
fn positional_alignment(costs: &CostMatrix, local_ordinals: &[usize]) -> Option<Alignment> {
    let m = costs.rows();
    if m != costs.cols() || local_ordinals.len() != m {
        return None;
    }

    let mut pairs = Vec::with_capacity(m);
    let mut taken = vec![false; m];
    for (i, &ordinal) in local_ordinals.iter().enumerate() {
        if ordinal >= m || taken[ordinal] || quantize(costs.get(i, ordinal)) != 0 {
            return None;
        }
        taken[ordinal] = true;
        pairs.push(TrackPair {
            local: i,
            candidate: ordinal,
            cost: clamp_cost(costs.get(i, ordinal)),
        });
    }

    let mut alignment = finish(pairs, &vec![true; m], m, 0.0);
    alignment.positional = true;
    Some(alignment)
}

fn finish(
    pairs: Vec<TrackPair>,
    matched_candidate: &[bool],
    local_count: usize,
    unmatched_cost: f64,
) -> Alignment {
    let mut matched_local = vec![false; local_count];
    for pair in &pairs {
        matched_local[pair.local] = true;
    }
    let unmatched_local: Vec<usize> = (0..local_count).filter(|&i| !matched_local[i]).collect();
    let unmatched_candidate: Vec<usize> = matched_candidate
        .iter()
        .enumerate()
        .filter(|(_, &matched)| !matched)
        .map(|(j, _)| j)
        .collect();

    let pair_cost: f64 = pairs.iter().map(|p| p.cost).sum();
    let unmatched = unmatched_local.len() + unmatched_candidate.len();
    let cost = pair_cost + unmatched_cost * crate::utils::validation::count_to_f64(unmatched);

    Alignment {
        pairs,
        unmatched_local,
        unmatched_candidate,
        cost,
        positional: false,
    }
}

fn clamp_cost(cost: f64) -> f64 {
    cost.clamp(0.0, 1.0)
}

#[allow(clippy::cast_possible_truncation)] // costs are clamped to [0, 1]
fn quantize(cost: f64) -> i128 {
    (clamp_cost(cost) * COST_SCALE).round() as i128
}

/// Build the square integer matrix described in the module docs
fn build_matrix(costs: &CostMatrix, local_ordinals: &[usize], unmatched_cost: f64) -> Vec<Vec<i128>> {
    let m = costs.rows();
    let n = costs.cols();
    let size = m + n;

    // Total displacement of any assignment is below size^2, so scaling costs by
    // this factor keeps displacement strictly subordinate to cost.
    let displacement_scale = (size * size) as i128 + 1;
    let unmatched = quantize(unmatched_cost) * displacement_scale;
    // Never cheaper than leaving every track unmatched
    let forbidden = (size as i128 + 1) * (quantize(1.0).max(quantize(unmatched_cost)) + 1) * displacement_scale;

    let mut matrix = vec![vec![0i128; size]; size];
    for (i, row) in matrix.iter_mut().enumerate().take(m) {
        let ordinal = local_ordinals.get(i).copied().unwrap_or(i);
        for (j, cell) in row.iter_mut().enumerate().take(n) {
            let displacement = ordinal.abs_diff(j) as i128;
            *cell = quantize(costs.get(i, j)) * displacement_scale + displacement;
        }
        for (k, cell) in row.iter_mut().skip(n).enumerate() {
            *cell = if k == i { unmatched } else { forbidden };
        }
    }
    for (k, row) in matrix.iter_mut().skip(m).enumerate() {
        for (j, cell) in row.iter_mut().enumerate().take(n) {
            *cell = if k == j { unmatched } else { forbidden };
        }
    }
    matrix
}

/// Hungarian algorithm with potentials, O(size^3).
///
/// Returns, for every row, the column assigned to it.
fn solve(matrix: &[Vec<i128>]) -> Vec<usize> {
    let size = matrix.len();
    let inf = i128::MAX / 4;

    // 1-based internally; index 0 is the virtual start column
    let mut u = vec![0i128; size + 1];
    let mut v = vec![0i128; size + 1];
    let mut row_of_col = vec![0usize; size + 1];
    let mut way = vec![0usize; size + 1];

    for i in 1..=size {
        row_of_col[0] = i;
        let mut j0 = 0usize;
        let mut min_v = vec![inf; size + 1];
        let mut used = vec![false; size + 1];

        loop {
            used[j0] = true;
            let i0 = row_of_col[j0];
            let mut delta = inf;
            let mut j1 = 0usize;

            for j in 1..=size {
                if used[j] {
                    continue;
                }
                let cur = matrix[i0 - 1][j - 1] - u[i0] - v[j];
                if cur < min_v[j] {
                    min_v[j] = cur;
                    way[j] = j0;
                }
                if min_v[j] < delta {
                    delta = min_v[j];
                    j1 = j;
                }
            }

            for j in 0..=size {
                if used[j] {
                    u[row_of_col[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_v[j] -= delta;
                }
            }

            j0 = j1;
            if row_of_col[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            row_of_col[j0] = row_of_col[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut col_of_row = vec![0usize; size];
    for j in 1..=size {
        if row_of_col[j] > 0 {
            col_of_row[row_of_col[j] - 1] = j - 1;
        }
    }
    col_of_row
}
