//! Bidirectional mapping between physical parameter vectors and the
//! normalized search coordinates consumed by the simplex.
//!
//! Every searched coordinate is independently boxed to `[0, 1]`; angles wrap
//! modulo 1. Dependent parameters (the intermediate axis, the energy, the
//! nutation-bounded psi_0, the stage-dependent momentum) are reconstructed
//! from their governing parameters in table order and never stored
//! independently, so the two representations cannot diverge.

use crate::error::BoundaryViolation;
use crate::model::Inertia;
use crate::params::{Freeze, ParamKind, ParamTable, Periodicity, Scale};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// Optimizer stage: independent random placement, or local reoptimization of
/// a previous winner. The transition is one-way within a run, and it changes
/// the meaning of the momentum coordinate when the table enables period
/// search.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum SearchStage {
    Scan,
    Refine,
}

/// Complete elliptic integral of the first kind `K(k^2)` by the
/// arithmetic-geometric-mean iteration.
///
/// Five iterations converge to better than 1e-10 for `k^2` up to
/// 1 - 2e-7.
pub fn complete_elliptic_k(k2: f64) -> f64 {
    let mut a: f64 = 1.0;
    let mut g = (1.0 - k2).sqrt();
    for _ in 0..5 {
        let a1 = 0.5 * (a + g);
        let g1 = (a * g).sqrt();
        a = a1;
        g = g1;
    }
    PI / (a + g)
}

#[inline]
fn lin_to_unit(par: f64, (lo, hi): (f64, f64)) -> f64 {
    (par - lo) / (hi - lo)
}

#[inline]
fn unit_to_lin(x: f64, (lo, hi): (f64, f64)) -> f64 {
    x * (hi - lo) + lo
}

/// Rotation regime implied by the normalized energy coordinate of one
/// segment: `true` for LAM (x >= 0.5), `false` for SAM. Absent or frozen
/// energy is treated as LAM, which disables the conditional psi_0 bound.
fn lam_of(table: &ParamTable, x: &[f64], segment: usize) -> bool {
    match table.slot(ParamKind::Energy, segment) {
        Some(slot) if table.descriptor(slot).freeze != Freeze::Frozen => x[slot] >= 0.5,
        _ => true,
    }
}

fn segment_inertia(table: &ParamTable, phys: &[f64], segment: usize) -> Inertia {
    let b = table
        .value(phys, ParamKind::BTumb, segment)
        .expect("BTumb validated at table construction");
    let c = table
        .value(phys, ParamKind::CTumb, segment)
        .expect("CTumb validated at table construction");
    Inertia::from_axes(b, c)
}

/// SAM bound on the initial rotation angle psi_0.
fn psi_max_sam(inertia: &Inertia, es: f64) -> f64 {
    let einv = 1.0 / es;
    let (ii, is) = (inertia.ii(), inertia.is());
    (ii * (is - einv) / (is * (einv - ii))).sqrt().atan()
}

/// Map a physical parameter vector to normalized search coordinates.
///
/// Frozen slots map to 0; their value never reaches the evaluator through
/// the search vector.
pub fn to_normalized(table: &ParamTable, phys: &[f64]) -> Vec<f64> {
    let mut x = vec![0.0; table.len()];
    for (i, d) in table.descriptors().iter().enumerate() {
        if d.freeze == Freeze::Frozen {
            continue;
        }
        let p = phys[i];
        x[i] = match d.kind {
            ParamKind::BTumb => {
                let c = table
                    .value(phys, ParamKind::CTumb, d.segment)
                    .expect("validated");
                let bounds = table.bounds().get(d.kind).expect("validated");
                lin_to_unit(p.ln() / c.ln(), bounds)
            }
            ParamKind::Energy => {
                let inertia = segment_inertia(table, phys, d.segment);
                let (ii_inv, is_inv) = (inertia.ii_inv(), inertia.is_inv());
                if p > ii_inv {
                    // LAM: Es in (1/Ii, 1], x in [0.5, 1]
                    0.5 * ((p - ii_inv) / (1.0 - ii_inv) + 1.0)
                } else {
                    // SAM: Es in [1/Is, 1/Ii], x in [0, 0.5]
                    0.5 * (p - is_inv) / (ii_inv - is_inv)
                }
            }
            ParamKind::Psi0 => {
                let inertia = segment_inertia(table, phys, d.segment);
                let es = table
                    .value(phys, ParamKind::Energy, d.segment)
                    .expect("validated");
                if es > inertia.ii_inv() {
                    p / TAU
                } else {
                    let psi_max = psi_max_sam(&inertia, es);
                    (p + psi_max) / (2.0 * psi_max)
                }
            }
            ParamKind::PhotoB => {
                let c_photo = table
                    .value(phys, ParamKind::PhotoC, d.segment)
                    .expect("validated");
                let bounds = table.bounds().get(d.kind).expect("validated");
                lin_to_unit(p.ln() / c_photo.ln(), bounds)
            }
            _ if d.periodicity == Periodicity::Periodic => (p / TAU).rem_euclid(1.0),
            kind => {
                let bounds = table.bounds().get(kind).expect("validated");
                let par = match kind.scale() {
                    Scale::Linear => p,
                    Scale::Log => p.ln(),
                };
                lin_to_unit(par, bounds)
            }
        };
    }
    x
}

/// Map normalized search coordinates to a physical parameter vector.
///
/// The boundary pre-check is cheap and runs before any conversion work, so
/// the expensive ODE evaluation is never attempted for an out-of-range
/// candidate. Reports [BoundaryViolation] for hard-bounded coordinates
/// outside `[0, 1]` and for photometric axes deviating beyond the configured
/// maximum from the kinematic ones.
pub fn to_physical(
    table: &ParamTable,
    x: &[f64],
    stage: SearchStage,
) -> Result<Vec<f64>, BoundaryViolation> {
    let momentum_as_period = table.momentum_by_period() && stage == SearchStage::Scan;

    for (i, d) in table.descriptors().iter().enumerate() {
        if d.freeze == Freeze::Frozen {
            continue;
        }
        // In period-search mode the scan-stage momentum coordinate is not a
        // boxed physical momentum yet, so its limits are not enforced here
        if momentum_as_period && d.kind == ParamKind::Momentum {
            continue;
        }
        if d.periodicity.violates(x[i], lam_of(table, x, d.segment)) {
            return Err(BoundaryViolation);
        }
    }

    let mut phys = vec![0.0; table.len()];
    for (i, d) in table.descriptors().iter().enumerate() {
        if d.freeze == Freeze::Frozen {
            phys[i] = table.frozen_value(i);
            continue;
        }
        phys[i] = match d.kind {
            ParamKind::BTumb => {
                let c = table
                    .value(&phys, ParamKind::CTumb, d.segment)
                    .expect("validated");
                let bounds = table.bounds().get(d.kind).expect("validated");
                (c.ln() * unit_to_lin(x[i], bounds)).exp()
            }
            ParamKind::Energy => {
                let inertia = segment_inertia(table, &phys, d.segment);
                let (ii_inv, is_inv) = (inertia.ii_inv(), inertia.is_inv());
                if x[i] >= 0.5 {
                    2.0 * (x[i] - 0.5) * (1.0 - ii_inv) + ii_inv
                } else {
                    2.0 * x[i] * (ii_inv - is_inv) + is_inv
                }
            }
            ParamKind::Psi0 => {
                let inertia = segment_inertia(table, &phys, d.segment);
                let es = table
                    .value(&phys, ParamKind::Energy, d.segment)
                    .expect("validated");
                if es >= inertia.ii_inv() {
                    x[i] * TAU
                } else {
                    let psi_max = psi_max_sam(&inertia, es);
                    x[i] * 2.0 * psi_max - psi_max
                }
            }
            ParamKind::PhotoC => {
                let c_tumb = table
                    .value(&phys, ParamKind::CTumb, d.segment)
                    .expect("validated");
                let bounds = table.bounds().get(d.kind).expect("validated");
                let ln_cp = unit_to_lin(x[i], bounds);
                if (ln_cp - c_tumb.ln()).abs() > table.photo_dev_max() {
                    return Err(BoundaryViolation);
                }
                ln_cp.exp()
            }
            ParamKind::PhotoB => {
                let c_photo = table
                    .value(&phys, ParamKind::PhotoC, d.segment)
                    .expect("validated");
                let b_tumb = table
                    .value(&phys, ParamKind::BTumb, d.segment)
                    .expect("validated");
                let bounds = table.bounds().get(d.kind).expect("validated");
                let ln_bp = c_photo.ln() * unit_to_lin(x[i], bounds);
                if (ln_bp - b_tumb.ln()).abs() > table.photo_dev_max() {
                    return Err(BoundaryViolation);
                }
                ln_bp.exp()
            }
            _ if d.periodicity == Periodicity::Periodic => x[i] * TAU,
            kind => {
                let bounds = table.bounds().get(kind).expect("validated");
                let par = unit_to_lin(x[i], bounds);
                match kind.scale() {
                    Scale::Linear => par,
                    Scale::Log => par.exp(),
                }
            }
        };
    }

    // The scan-stage momentum coordinate holds an inverse precession period;
    // converting it to a physical momentum requires the energy and inertia
    // ratios, so it runs after everything else
    if momentum_as_period {
        for (i, d) in table.descriptors().iter().enumerate() {
            if d.kind != ParamKind::Momentum || d.freeze == Freeze::Frozen {
                continue;
            }
            let inertia = segment_inertia(table, &phys, d.segment);
            let (ii, is) = (inertia.ii(), inertia.is());
            let es = table
                .value(&phys, ParamKind::Energy, d.segment)
                .expect("validated");
            let einv = 1.0 / es;
            let lam = es >= inertia.ii_inv();
            let (k2, denom) = if lam {
                (
                    (is - ii) * (einv - 1.0) / ((ii - 1.0) * (is - einv)),
                    (ii - 1.0) * (is - einv),
                )
            } else {
                (
                    (ii - 1.0) * (is - einv) / ((is - ii) * (einv - 1.0)),
                    (is - ii) * (einv - 1.0),
                )
            };
            let inv_period = phys[i];
            phys[i] = 4.0 * inv_period * complete_elliptic_k(k2) * (ii * is / (es * denom)).sqrt();
        }
    }

    Ok(phys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Bounds, ParamDescriptor, Periodicity};
    use crate::tests::{free_tumbler_table, slot_of, true_params};

    use approx::assert_relative_eq;

    #[test]
    fn roundtrip_preserves_in_bounds_vectors() {
        let table = free_tumbler_table();
        let phys = true_params(&table);
        let x = to_normalized(&table, &phys);
        assert!(x.iter().all(|&v| (0.0..=1.0).contains(&v)));
        let back = to_physical(&table, &x, SearchStage::Refine).unwrap();
        for (&orig, &rec) in phys.iter().zip(back.iter()) {
            assert_relative_eq!(orig, rec, epsilon = 1e-10, max_relative = 1e-10);
        }
    }

    #[test]
    fn hard_bounded_coordinate_outside_unit_interval_fails() {
        let table = free_tumbler_table();
        let phys = true_params(&table);
        let momentum = slot_of(&table, ParamKind::Momentum);

        for bad in [-0.01, 1.01] {
            let mut x = to_normalized(&table, &phys);
            x[momentum] = bad;
            assert_eq!(
                to_physical(&table, &x, SearchStage::Refine),
                Err(BoundaryViolation)
            );
        }
    }

    #[test]
    fn periodic_coordinate_wraps_instead_of_failing() {
        let table = free_tumbler_table();
        let phys = true_params(&table);
        let phi0 = slot_of(&table, ParamKind::Phi0);
        let mut x = to_normalized(&table, &phys);
        x[phi0] += 1.0;
        let converted = to_physical(&table, &x, SearchStage::Refine).unwrap();
        // One extra turn of a periodic angle
        assert_relative_eq!(converted[phi0], phys[phi0] + TAU, epsilon = 1e-9);
    }

    #[test]
    fn psi0_bound_is_conditional_on_regime() {
        let table = free_tumbler_table();
        let phys = true_params(&table);
        let energy = slot_of(&table, ParamKind::Energy);
        let psi0 = slot_of(&table, ParamKind::Psi0);

        let mut x = to_normalized(&table, &phys);
        x[psi0] = 1.01;
        // LAM: psi_0 is periodic, no violation
        x[energy] = 0.7;
        assert!(to_physical(&table, &x, SearchStage::Refine).is_ok());
        // SAM: psi_0 is hard-bounded
        x[energy] = 0.3;
        assert_eq!(
            to_physical(&table, &x, SearchStage::Refine),
            Err(BoundaryViolation)
        );
    }

    #[test]
    fn psi0_regime_is_resolved_per_segment() {
        let mut bounds = Bounds::new();
        bounds.set(ParamKind::CTumb, (0.3_f64).ln(), (0.95_f64).ln());
        bounds.set(ParamKind::BTumb, 0.0, 1.0);
        let descriptors = vec![
            ParamDescriptor::new(ParamKind::CTumb, 0, true, Periodicity::HardBoth),
            ParamDescriptor::new(ParamKind::BTumb, 0, false, Periodicity::HardBoth),
            ParamDescriptor::new(ParamKind::Energy, 0, false, Periodicity::HardBoth),
            ParamDescriptor::new(ParamKind::Psi0, 0, false, Periodicity::PeriodicLam),
            ParamDescriptor::new(ParamKind::Energy, 1, false, Periodicity::HardBoth),
            ParamDescriptor::new(ParamKind::Psi0, 1, false, Periodicity::PeriodicLam),
        ];
        let table = ParamTable::new(descriptors, bounds, 2).unwrap();

        // Segment 0 in LAM, segment 1 in SAM: the first psi_0 wraps freely
        // while the second is hard-bounded
        let mut x = vec![0.2, 0.5, 0.7, 1.01, 0.3, 0.5];
        assert!(to_physical(&table, &x, SearchStage::Refine).is_ok());
        x[5] = 1.01;
        assert_eq!(
            to_physical(&table, &x, SearchStage::Refine),
            Err(BoundaryViolation)
        );
    }

    #[test]
    fn dependent_params_are_reconstructed_not_stored() {
        let table = free_tumbler_table();
        let phys = true_params(&table);
        let x = to_normalized(&table, &phys);
        let back = to_physical(&table, &x, SearchStage::Refine).unwrap();

        let b = back[slot_of(&table, ParamKind::BTumb)];
        let c = back[slot_of(&table, ParamKind::CTumb)];
        let es = back[slot_of(&table, ParamKind::Energy)];
        // c < b < 1 and the energy stays within the physical window
        assert!(c < b && b < 1.0);
        let inertia = Inertia::from_axes(b, c);
        assert!(es > inertia.is_inv() && es <= 1.0);
    }

    #[test]
    fn agm_complete_elliptic_integral() {
        assert_relative_eq!(complete_elliptic_k(0.0), PI / 2.0, epsilon = 1e-12);
        // K(m = 0.5), Abramowitz & Stegun 17.3.34 tables
        assert_relative_eq!(complete_elliptic_k(0.5), 1.8540746773013719, epsilon = 1e-9);
    }

    #[test]
    fn scan_stage_momentum_is_an_inverse_period() {
        let table = free_tumbler_table().with_momentum_by_period(true);
        let phys = true_params(&table);
        let momentum = slot_of(&table, ParamKind::Momentum);

        let mut x = to_normalized(&table, &phys);
        // Out-of-range momentum is tolerated during the scan stage
        x[momentum] = 1.2;
        let scanned = to_physical(&table, &x, SearchStage::Scan).unwrap();
        // The converted momentum is a physical value, not the raw linear map
        let bounds = table.bounds().get(ParamKind::Momentum).unwrap();
        assert!((scanned[momentum] - unit_to_lin(1.2, bounds)).abs() > 1e-6);
        // The refine stage enforces the limits again
        assert_eq!(
            to_physical(&table, &x, SearchStage::Refine),
            Err(BoundaryViolation)
        );
    }

    #[test]
    fn photometric_axis_deviation_guard() {
        let mut bounds = Bounds::new();
        bounds.set(ParamKind::Momentum, 5.0, 50.0);
        bounds.set(ParamKind::CTumb, (0.3_f64).ln(), (0.95_f64).ln());
        bounds.set(ParamKind::BTumb, 0.0, 1.0);
        bounds.set(ParamKind::PhotoC, (0.3_f64).ln(), (0.95_f64).ln());
        bounds.set(ParamKind::PhotoB, 0.0, 1.0);
        let descriptors = vec![
            ParamDescriptor::new(ParamKind::CTumb, 0, true, Periodicity::HardBoth),
            ParamDescriptor::new(ParamKind::BTumb, 0, false, Periodicity::HardBoth),
            ParamDescriptor::new(ParamKind::PhotoC, 0, true, Periodicity::HardBoth),
            ParamDescriptor::new(ParamKind::PhotoB, 0, false, Periodicity::HardBoth),
        ];
        let table = ParamTable::new(descriptors, bounds, 1)
            .unwrap()
            .with_photo_dev_max(0.1);

        // Photometric c far away from the kinematic one
        let x = vec![0.2, 0.5, 0.9, 0.5];
        assert_eq!(
            to_physical(&table, &x, SearchStage::Refine),
            Err(BoundaryViolation)
        );
        // Identical coordinates pass the guard
        let x = vec![0.2, 0.5, 0.2, 0.5];
        assert!(to_physical(&table, &x, SearchStage::Refine).is_ok());
    }

    #[test]
    fn frozen_slots_take_the_supplied_value() {
        let mut table = free_tumbler_table();
        let phys = true_params(&table);
        let theta_m = slot_of(&table, ParamKind::ThetaM);
        table.freeze(ParamKind::ThetaM, 0, 1.25);

        let x = to_normalized(&table, &phys);
        assert_eq!(x[theta_m], 0.0);
        let back = to_physical(&table, &x, SearchStage::Refine).unwrap();
        assert_eq!(back[theta_m], 1.25);
    }
}
