//! Linear rank-assignment estimator
//!
//! Detected emission-time estimates `y_1 < y_2 < … < y_n` are modelled as
//!
//! ```text
//! y_i ≈ m · x_i,   x_i ∈ ℤ,   xmin ≤ x_1,   x_{i+1} ≥ x_i + 1,   x_n ≤ xmax
//! ```
//!
//! where `x_i` is the (unknown) emission rank of the i-th detected particle
//! and `m` the mean inter-emission interval. Particles that were emitted but
//! never detected simply leave gaps in the rank sequence.
//!
//! For a fixed `m` the optimal ranks are found by dynamic programming over
//! the candidate ranks:
//!
//! ```text
//! dp[i][x] = (y_i − m·x)² + min_{x' < x} dp[i−1][x']
//! ```
//!
//! The inner minimum is a running prefix minimum, so one pass costs
//! O(n·V) with V = xmax − xmin + 1. The slope itself is found by a
//! coarse-to-fine grid search.

use crate::error::EstimatorError;

/// Number of grid points on the fine sub-grid `[1e-6, m_max]`.
const FINE_GRID_POINTS: usize = 50;
/// Number of grid points on the coarse sub-grid `[m_max, 3·m_max]`.
const COARSE_GRID_POINTS: usize = 30;
/// Smallest slope tried by the default grid.
const MIN_SLOPE: f64 = 1e-6;
/// Extra ranks added above `xmin + n` when no `xmax` is given.
const DEFAULT_RANK_HEADROOM: i64 = 50;

const NO_PARENT: usize = usize::MAX;

/// Result of the slope / rank search.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearFit {
    /// Slope with the lowest DP cost (seconds per emission).
    pub best_m: f64,
    /// Optimal rank sequence for `best_m`.
    pub best_x: Vec<i64>,
    /// Sum of squared residuals for `best_m` and `best_x`.
    pub best_cost: f64,
}

impl LinearFit {
    /// Emission rate implied by the fitted interval, `1 / best_m`.
    pub fn rate(&self) -> f64 {
        1.0 / self.best_m
    }
}

/// Estimator for the scale `m` of the model `y = m · x`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearEstimator;

impl LinearEstimator {
    /// Compute the optimal strictly increasing integer ranks for a fixed `m`.
    ///
    /// # Arguments
    /// * `y` - Observations, in increasing order
    /// * `m` - Candidate slope
    /// * `xmin` - Smallest admissible rank
    /// * `xmax` - Largest admissible rank
    ///
    /// # Returns
    /// `(x, cost)` where `cost = Σ (y_i − m·x_i)²`.
    ///
    /// # Performance
    /// O(n × (xmax − xmin + 1)) time and memory (parent pointers).
    pub fn best_x_for_m(
        y: &[f64],
        m: f64,
        xmin: i64,
        xmax: i64,
    ) -> Result<(Vec<i64>, f64), EstimatorError> {
        validate_observations(y)?;
        validate_window(y.len(), xmin, xmax)?;

        let n = y.len();
        let width = (xmax - xmin + 1) as usize;
        let rank = |j: usize| (xmin + j as i64) as f64;

        let mut dp_prev: Vec<f64> = (0..width).map(|j| (y[0] - m * rank(j)).powi(2)).collect();
        let mut dp = vec![f64::INFINITY; width];
        let mut parents: Vec<Vec<usize>> = Vec::with_capacity(n);
        parents.push(vec![NO_PARENT; width]);

        for &yi in &y[1..] {
            let mut parent = vec![NO_PARENT; width];
            // The smallest rank has no admissible predecessor.
            dp[0] = f64::INFINITY;

            let mut best_idx = 0;
            for j in 1..width {
                if dp_prev[j - 1] < dp_prev[best_idx] {
                    best_idx = j - 1;
                }
                dp[j] = (yi - m * rank(j)).powi(2) + dp_prev[best_idx];
                parent[j] = best_idx;
            }

            parents.push(parent);
            std::mem::swap(&mut dp, &mut dp_prev);
        }

        let mut last = 0;
        for j in 1..width {
            if dp_prev[j] < dp_prev[last] {
                last = j;
            }
        }
        let cost = dp_prev[last];
        if !cost.is_finite() {
            return Err(EstimatorError::InvalidArgument(format!(
                "no finite rank assignment for m = {m}"
            )));
        }

        let mut idx = vec![0usize; n];
        idx[n - 1] = last;
        for i in (1..n).rev() {
            idx[i - 1] = parents[i][idx[i]];
        }

        Ok((idx.into_iter().map(|j| xmin + j as i64).collect(), cost))
    }

    /// Estimate `m` and the rank sequence by grid search over `m` with the
    /// DP assignment for every candidate.
    ///
    /// # Arguments
    /// * `y` - Observations, in increasing order
    /// * `xmin` - Smallest admissible rank (usually 1)
    /// * `xmax` - Largest admissible rank; defaults to `xmin + n + 50`
    /// * `m_grid` - Candidate slopes; defaults to 50 points on
    ///   `[1e-6, m_max]` followed by 30 points on `[m_max, 3·m_max]`
    ///   with `m_max = max(1, max|y| / max(1, xmin))`
    ///
    /// Ties keep the first candidate reaching the lowest cost.
    ///
    /// # Aliasing
    /// A fit `(m, x)` is matched almost as well by `(m / k, k·x)` for any
    /// integer `k` that keeps the ranks inside the window. When the true
    /// slope is not on the grid, a smaller grid slope with sparser ranks can
    /// therefore win: on the default grid `y = [2, 4, 6, 8]` yields
    /// `m ≈ 0.163` with ranks `[12, 24, 37, 49]` rather than `m = 2`. Pass
    /// an explicit `m_grid` bracketing the expected period to avoid it.
    pub fn estimate(
        y: &[f64],
        xmin: i64,
        xmax: Option<i64>,
        m_grid: Option<&[f64]>,
    ) -> Result<LinearFit, EstimatorError> {
        validate_observations(y)?;
        let n = y.len();
        let xmax = xmax.unwrap_or(xmin + n as i64 + DEFAULT_RANK_HEADROOM);
        validate_window(n, xmin, xmax)?;

        let default_grid;
        let grid = match m_grid {
            Some(grid) => grid,
            None => {
                default_grid = default_slope_grid(y, xmin);
                default_grid.as_slice()
            }
        };
        if grid.is_empty() {
            return Err(EstimatorError::EmptyData("slope grid"));
        }

        let mut best: Option<LinearFit> = None;
        for &m in grid {
            let (x, cost) = match Self::best_x_for_m(y, m, xmin, xmax) {
                Ok(found) => found,
                Err(EstimatorError::InvalidArgument(_)) => continue,
                Err(e) => return Err(e),
            };
            let improves = best.as_ref().map_or(true, |b| cost < b.best_cost);
            if improves {
                best = Some(LinearFit {
                    best_m: m,
                    best_x: x,
                    best_cost: cost,
                });
            }
        }

        best.ok_or_else(|| {
            EstimatorError::InvalidArgument("no slope in the grid produced a finite cost".into())
        })
    }
}

fn validate_observations(y: &[f64]) -> Result<(), EstimatorError> {
    if y.is_empty() {
        return Err(EstimatorError::EmptyData("observations"));
    }
    if let Some(bad) = y.iter().find(|v| !v.is_finite()) {
        return Err(EstimatorError::InvalidArgument(format!(
            "non-finite observation {bad}"
        )));
    }
    Ok(())
}

fn validate_window(n: usize, xmin: i64, xmax: i64) -> Result<(), EstimatorError> {
    if xmax < xmin || ((xmax - xmin + 1) as u64) < n as u64 {
        return Err(EstimatorError::RankWindowTooSmall { xmin, xmax, n });
    }
    Ok(())
}

/// Evenly spaced values over `[start, stop]`, endpoints included.
fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num).map(|i| start + step * i as f64).collect()
        }
    }
}

fn default_slope_grid(y: &[f64], xmin: i64) -> Vec<f64> {
    let ymax = y.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
    let m_max = (ymax / xmin.max(1) as f64).max(1.0);

    let mut grid = linspace(MIN_SLOPE, m_max, FINE_GRID_POINTS);
    grid.extend(linspace(m_max, 3.0 * m_max, COARSE_GRID_POINTS));
    grid
}
