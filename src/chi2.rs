//! Chi-squared scoring of one physical parameter vector against an
//! observation set.
//!
//! For every observation the rotation state is integrated to the epoch, the
//! body orientation assembled, and the active brightness law evaluated in the
//! body frame. Per-filter magnitude offsets are free (linear) parameters, so
//! they are marginalized in closed form rather than searched: for filter `m`
//! with residuals `y` and weights `w`,
//!
//! ```text
//! chi2 = sum_m (sum(y^2 w) - sum(y w)^2 / sum(w)) / (N - N_free - N_filters)
//! ```
//!
//! which is the exact minimum over all per-filter constant shifts.

use crate::data::ObservationSet;
use crate::error::{EvalError, TableError};
use crate::model::{
    BodyFrame, BrightnessLawTrait, BrightnessModel, Dynamics, Inertia, MomentumFrame,
    RotationState, Shape, initial_body_rates, initial_theta, phase_angle,
};
use crate::params::{ParamKind, ParamTable};

use ndarray::Array1;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const fn default_max_step() -> f64 {
    0.01
}

/// Physics settings shared by all workers of a run.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct Chi2Config {
    /// Brightness law applied to every observation
    pub brightness: BrightnessModel,
    /// Upper bound on the RK4 integration step, days
    pub max_step: f64,
}

impl Default for Chi2Config {
    fn default() -> Self {
        Self {
            brightness: BrightnessModel::default(),
            max_step: default_max_step(),
        }
    }
}

/// Result of one successful evaluation: the reduced chi-squared and the
/// marginalized per-filter magnitude offsets.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Score {
    pub chi2: f64,
    pub offsets: Vec<f64>,
}

/// Parameters of the eight kinds every model needs, regardless of the
/// optional extensions present in the table.
const REQUIRED: [ParamKind; 8] = [
    ParamKind::ThetaM,
    ParamKind::PhiM,
    ParamKind::Phi0,
    ParamKind::Momentum,
    ParamKind::CTumb,
    ParamKind::BTumb,
    ParamKind::Energy,
    ParamKind::Psi0,
];

/// Scores physical parameter vectors against one observation set.
///
/// Holds shared references only, so one instance can be used concurrently
/// from every worker thread.
#[derive(Clone, Copy, Debug)]
pub struct Evaluator<'a> {
    set: &'a ObservationSet,
    table: &'a ParamTable,
    config: Chi2Config,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        set: &'a ObservationSet,
        table: &'a ParamTable,
        config: Chi2Config,
    ) -> Result<Self, TableError> {
        for kind in REQUIRED {
            if !table.has(kind) {
                return Err(TableError::MissingParam { kind });
            }
        }
        if set.n_segments() > table.n_segments() {
            return Err(TableError::SegmentMismatch {
                set_segments: set.n_segments(),
                table_segments: table.n_segments(),
            });
        }
        Ok(Self { set, table, config })
    }

    #[inline]
    pub fn set(&self) -> &ObservationSet {
        self.set
    }

    #[inline]
    pub fn table(&self) -> &ParamTable {
        self.table
    }

    /// Reduced chi-squared of `phys`, with offsets marginalized per filter.
    pub fn score(&self, phys: &[f64]) -> Result<Score, EvalError> {
        let n_filters = self.set.n_filters();
        let mut sum_y2 = vec![0.0; n_filters];
        let mut sum_y = vec![0.0; n_filters];
        let mut sum_w = vec![0.0; n_filters];

        let mags = self.model_mags(phys);
        for (o, &m) in self.set.observations().iter().zip(mags.iter()) {
            if !m.is_finite() {
                return Err(EvalError::NonFiniteModel);
            }
            let y = o.mag - m;
            sum_y2[o.filter] += y * y * o.weight;
            sum_y[o.filter] += y * o.weight;
            sum_w[o.filter] += o.weight;
        }

        let n_obs = self.set.len();
        let n_free = self.table.n_fitted();
        if n_obs <= n_free + n_filters {
            return Err(EvalError::NonPositiveDof {
                n_obs,
                n_free,
                n_filters,
            });
        }
        let dof = (n_obs - n_free - n_filters) as f64;

        let mut chi2 = 0.0;
        let mut offsets = Vec::with_capacity(n_filters);
        for m in 0..n_filters {
            if sum_w[m] <= 0.0 {
                return Err(EvalError::ZeroWeightFilter { filter: m });
            }
            chi2 += sum_y2[m] - sum_y[m] * sum_y[m] / sum_w[m];
            offsets.push(sum_y[m] / sum_w[m]);
        }
        Ok(Score {
            chi2: chi2 / dof,
            offsets,
        })
    }

    /// Predicted apparent magnitudes of the whole set, with the given
    /// per-filter offsets applied.
    pub fn predict(&self, phys: &[f64], offsets: &[f64]) -> Array1<f64> {
        let mut mags = self.model_mags(phys);
        for (o, m) in self.set.observations().iter().zip(mags.iter_mut()) {
            *m += offsets[o.filter];
        }
        mags
    }

    /// Raw model magnitudes, before any filter offset.
    fn model_mags(&self, phys: &[f64]) -> Array1<f64> {
        let table = self.table;
        let mut mags = Array1::zeros(self.set.len());

        for iseg in 0..self.set.n_segments() {
            let (start, seg_obs) = self.set.segment(iseg);
            let req = |kind| {
                table
                    .value(phys, kind, iseg)
                    .expect("checked at evaluator construction")
            };

            let c_tumb = req(ParamKind::CTumb);
            let b_tumb = req(ParamKind::BTumb);
            let es = req(ParamKind::Energy);
            let psi0 = req(ParamKind::Psi0);
            let l = req(ParamKind::Momentum);
            let phi0 = req(ParamKind::Phi0);

            let inertia = Inertia::from_axes(b_tumb, c_tumb);
            let theta0 = initial_theta(es, psi0, &inertia);
            let mframe = MomentumFrame::new(req(ParamKind::ThetaM), req(ParamKind::PhiM));

            let torqued = table.has(ParamKind::TorqueI);
            let (mut dynamics, mut state) = if torqued {
                let torque = [
                    table.value(phys, ParamKind::TorqueI, iseg).unwrap_or(0.0),
                    table.value(phys, ParamKind::TorqueS, iseg).unwrap_or(0.0),
                    table.value(phys, ParamKind::TorqueL, iseg).unwrap_or(0.0),
                ];
                (
                    Dynamics::torqued(&inertia, torque),
                    RotationState::torqued(
                        initial_body_rates(l, &inertia, theta0, psi0),
                        phi0,
                        theta0,
                        psi0,
                    ),
                )
            } else {
                (
                    Dynamics::free(l, &inertia),
                    RotationState::free(phi0, theta0, psi0),
                )
            };

            // Two-phase torque: the triple switches once, at a fraction of
            // the segment time span
            let split = if torqued && table.has(ParamKind::Torque2I) {
                let frac = table.value(phys, ParamKind::TorqueSplit, iseg).unwrap_or(0.5);
                let t_first = seg_obs[0].mjd;
                let t_last = seg_obs[seg_obs.len() - 1].mjd;
                Some((
                    t_first + frac * (t_last - t_first),
                    [
                        table.value(phys, ParamKind::Torque2I, iseg).unwrap_or(0.0),
                        table.value(phys, ParamKind::Torque2S, iseg).unwrap_or(0.0),
                        table.value(phys, ParamKind::Torque2L, iseg).unwrap_or(0.0),
                    ],
                ))
            } else {
                None
            };

            let secondary = table.has(ParamKind::ThetaR);
            let (b_photo, c_photo) = if table.has(ParamKind::PhotoC) {
                (
                    table.value(phys, ParamKind::PhotoB, iseg).unwrap_or(b_tumb),
                    req(ParamKind::PhotoC),
                )
            } else {
                (b_tumb, c_tumb)
            };
            let shape = Shape {
                b: b_photo,
                c: c_photo,
                kappa: table.value(phys, ParamKind::Kappa, iseg).unwrap_or(1.0),
            };
            let trend = table.value(phys, ParamKind::Trend, iseg);

            let mut t = seg_obs[0].mjd;
            let mut switched = false;
            for (k, o) in seg_obs.iter().enumerate() {
                if let Some((t_split, torque2)) = split {
                    if !switched {
                        if t_split <= t {
                            dynamics.set_torque(torque2);
                            switched = true;
                        } else if t_split < o.mjd {
                            dynamics.advance(&mut state, t, t_split, self.config.max_step);
                            dynamics.set_torque(torque2);
                            switched = true;
                            t = t_split;
                        }
                    }
                }
                dynamics.advance(&mut state, t, o.mjd, self.config.max_step);
                t = o.mjd;

                let (phi, theta, psi) = state.euler_angles();
                let mut bframe = BodyFrame::from_euler(&mframe, phi, theta, psi);
                if secondary {
                    bframe = bframe.rotated(
                        table.value(phys, ParamKind::ThetaR, iseg).unwrap_or(0.0),
                        table.value(phys, ParamKind::PhiR, iseg).unwrap_or(0.0),
                        table.value(phys, ParamKind::PsiR, iseg).unwrap_or(0.0),
                    );
                }

                let sun_b = bframe.to_body(o.sun);
                let earth_b = bframe.to_body(o.earth);
                let mut mag = self.config.brightness.magnitude(&shape, sun_b, earth_b);
                if let Some(a) = trend {
                    mag -= a * phase_angle(o.sun, o.earth);
                }
                mags[start + k] = mag;
            }
        }
        mags
    }
}
