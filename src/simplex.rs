//! One downhill-simplex round over normalized parameter coordinates.
//!
//! The simplex moves in the subspace of non-frozen coordinates; frozen ones
//! stay pinned at zero in every vertex. Candidate points that the objective
//! rejects as out of bounds score [SENTINEL_SCORE], so the simplex retreats
//! from the walls on its own; only a shrink step landing out of bounds aborts
//! the round, since shrinking can no longer escape.

use crate::error::{BoundaryViolation, SENTINEL_SCORE};
use crate::params::{Freeze, ParamKind, ParamTable, Periodicity, SearchStage};

use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// Standard Nelder-Mead coefficients
const ALPHA: f64 = 1.0;
const GAMMA: f64 = 2.0;
const RHO: f64 = 0.5;
const SIGMA: f64 = 0.5;

/// Margin keeping initial vertices strictly inside the unit box.
const SMALL: f64 = 1e-8;

const fn default_max_iterations() -> usize {
    5000
}

const fn default_size2_tol() -> f64 {
    1e-14
}

const fn default_dx_ini() -> f64 {
    1e-3
}

const fn default_d2x_ini() -> f64 {
    3.0
}

const fn default_dx_rand() -> f64 {
    1e-2
}

/// Tuning knobs of a single simplex round.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct SimplexConfig {
    /// Iteration cap of one round
    pub max_iterations: usize,
    /// Convergence threshold on the mean squared vertex distance from the
    /// centroid
    pub size2_tol: f64,
    /// Base edge length of the initial simplex
    pub dx_ini: f64,
    /// Log-range of the randomized initial edge length: the edge along each
    /// coordinate is `dx_ini * exp(d2x_ini * u)` with uniform `u`
    pub d2x_ini: f64,
    /// Half-width of the per-coordinate perturbation applied to a
    /// reoptimization seed
    pub dx_rand: f64,
}

impl Default for SimplexConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            size2_tol: default_size2_tol(),
            dx_ini: default_dx_ini(),
            d2x_ini: default_d2x_ini(),
            dx_rand: default_dx_rand(),
        }
    }
}

/// How a simplex round ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum RoundStatus {
    /// The simplex collapsed below the size threshold
    Converged,
    /// The iteration cap was hit first
    Exhausted,
    /// A shrink step left the allowed region
    Failed,
}

/// Outcome of one round: the best vertex seen and how the round ended.
#[derive(Clone, Debug, PartialEq)]
pub struct RoundResult {
    pub status: RoundStatus,
    pub chi2: f64,
    pub x: Vec<f64>,
    pub iterations: usize,
}

/// A single-threaded simplex minimizer over the normalized coordinates of
/// one parameter table.
///
/// The objective reports [BoundaryViolation] for candidate points it refuses
/// to evaluate; any other failure mode is expected to be folded into the
/// returned score by the caller.
pub struct SimplexSearch<'a, F> {
    objective: F,
    table: &'a ParamTable,
    config: SimplexConfig,
    stage: SearchStage,
}

impl<'a, F> SimplexSearch<'a, F>
where
    F: Fn(&[f64]) -> Result<f64, BoundaryViolation>,
{
    pub fn new(
        objective: F,
        table: &'a ParamTable,
        config: SimplexConfig,
        stage: SearchStage,
    ) -> Self {
        Self {
            objective,
            table,
            config,
            stage,
        }
    }

    /// Objective value with boundary rejections and non-finite results folded
    /// into the sentinel.
    fn score(&self, x: &[f64]) -> f64 {
        match (self.objective)(x) {
            Ok(f) if f.is_finite() => f.min(SENTINEL_SCORE),
            _ => SENTINEL_SCORE,
        }
    }

    /// Random scan placement of one coordinate, strictly inside the unit box
    /// with room for the initial simplex edge.
    fn scan_coord(&self, rng: &mut impl Rng) -> f64 {
        let margin = self.config.dx_ini + SMALL;
        margin + rng.random::<f64>() * (1.0 - 2.0 * margin)
    }

    /// First vertex of the simplex.
    fn initial_point(&self, rng: &mut impl Rng, seed: Option<&[f64]>) -> Vec<f64> {
        let mut x0 = vec![0.0; self.table.len()];
        for (i, d) in self.table.descriptors().iter().enumerate() {
            x0[i] = match (d.freeze, self.stage, seed) {
                (Freeze::Frozen, _, _) => 0.0,
                // Relaxed coordinates forget the seed and rescan
                (Freeze::Relaxed, _, _) => self.scan_coord(rng),
                (Freeze::Active, SearchStage::Refine, Some(seed)) => {
                    let jitter = (2.0 * rng.random::<f64>() - 1.0) * self.config.dx_rand;
                    let x = seed[i] + jitter;
                    // Only hard limits pin the seed; periodic coordinates may
                    // cross the box and wrap at conversion time
                    match d.periodicity {
                        Periodicity::HardBoth => x.clamp(SMALL, 1.0 - SMALL),
                        Periodicity::HardLeft => x.max(SMALL),
                        Periodicity::HardRight => x.min(1.0 - SMALL),
                        _ => x,
                    }
                }
                (Freeze::Active, _, _) => self.scan_coord(rng),
            };
        }
        // A scan starts with the photometric axes at the kinematic ones and
        // lets the simplex pull them apart
        if self.stage == SearchStage::Scan {
            for (i, d) in self.table.descriptors().iter().enumerate() {
                let tied = match d.kind {
                    ParamKind::PhotoC => self.table.slot(ParamKind::CTumb, d.segment),
                    ParamKind::PhotoB => self.table.slot(ParamKind::BTumb, d.segment),
                    _ => None,
                };
                if let Some(src) = tied {
                    if d.freeze == Freeze::Active {
                        x0[i] = x0[src];
                    }
                }
            }
        }
        x0
    }

    /// Run one round from a fresh random simplex (scan) or around `seed`
    /// (reoptimization).
    pub fn run_round(&self, rng: &mut impl Rng, seed: Option<&[f64]>) -> RoundResult {
        let movable: Vec<usize> = self
            .table
            .descriptors()
            .iter()
            .enumerate()
            .filter(|(_, d)| d.freeze != Freeze::Frozen)
            .map(|(i, _)| i)
            .collect();
        let n = movable.len();

        let x0 = self.initial_point(rng, seed);
        if n == 0 {
            // Everything frozen: nothing to search
            let chi2 = self.score(&x0);
            return RoundResult {
                status: RoundStatus::Converged,
                chi2,
                x: x0,
                iterations: 0,
            };
        }
        let mut vertices: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
        vertices.push(x0.clone());
        for &coord in &movable {
            let mut v = x0.clone();
            let mag = self.config.dx_ini * (self.config.d2x_ini * rng.random::<f64>()).exp();
            let mut dx = if rng.random::<bool>() { mag } else { -mag };
            // Step the other way when the drawn side has no room
            if v[coord] + dx > 1.0 - SMALL || v[coord] + dx < SMALL {
                dx = -dx;
            }
            v[coord] += dx;
            vertices.push(v);
        }
        let mut scores: Vec<f64> = vertices.iter().map(|v| self.score(v)).collect();

        let mut iterations = 0;
        let status = loop {
            // Stable sort keeps the earlier vertex first on ties
            let mut order: Vec<usize> = (0..=n).collect();
            order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));
            let best = order[0];
            let second_worst = order[n.saturating_sub(1)];
            let worst = order[n];

            // Centroid of all n + 1 vertices
            let mut centroid = vec![0.0; self.table.len()];
            for v in &vertices {
                for &k in &movable {
                    centroid[k] += v[k];
                }
            }
            for &k in &movable {
                centroid[k] /= (n + 1) as f64;
            }

            let size2 = vertices
                .iter()
                .map(|v| {
                    movable
                        .iter()
                        .map(|&k| (v[k] - centroid[k]).powi(2))
                        .sum::<f64>()
                })
                .sum::<f64>()
                / n as f64;
            if size2 < self.config.size2_tol {
                break RoundStatus::Converged;
            }
            if iterations >= self.config.max_iterations {
                break RoundStatus::Exhausted;
            }
            iterations += 1;

            let moved = |coef: f64| -> Vec<f64> {
                let mut x = centroid.clone();
                for &k in &movable {
                    x[k] = centroid[k] + coef * (centroid[k] - vertices[worst][k]);
                }
                x
            };

            let xr = moved(ALPHA);
            let fr = self.score(&xr);
            if fr < scores[best] {
                let xe = moved(GAMMA);
                let fe = self.score(&xe);
                if fe < fr {
                    vertices[worst] = xe;
                    scores[worst] = fe;
                } else {
                    vertices[worst] = xr;
                    scores[worst] = fr;
                }
                continue;
            }
            if fr < scores[second_worst] {
                vertices[worst] = xr;
                scores[worst] = fr;
                continue;
            }
            let xc = moved(-RHO);
            let fc = self.score(&xc);
            if fc < scores[worst] {
                vertices[worst] = xc;
                scores[worst] = fc;
                continue;
            }

            // Shrink toward the best vertex
            let best_v = vertices[best].clone();
            let mut failed = false;
            for (j, v) in vertices.iter_mut().enumerate() {
                if j == best {
                    continue;
                }
                for &k in &movable {
                    v[k] = best_v[k] + SIGMA * (v[k] - best_v[k]);
                }
                match (self.objective)(v) {
                    Ok(f) if f.is_finite() => scores[j] = f.min(SENTINEL_SCORE),
                    Ok(_) => scores[j] = SENTINEL_SCORE,
                    Err(BoundaryViolation) => {
                        failed = true;
                        break;
                    }
                }
            }
            if failed {
                break RoundStatus::Failed;
            }
        };

        let best = (0..=n)
            .min_by(|&a, &b| scores[a].total_cmp(&scores[b]))
            .unwrap_or(0);
        // An aborted round carries no usable score: some vertices may have
        // moved without being rescored
        let chi2 = if status == RoundStatus::Failed {
            SENTINEL_SCORE
        } else {
            scores[best]
        };
        RoundResult {
            status,
            chi2,
            x: vertices[best].clone(),
            iterations,
        }
    }
}
