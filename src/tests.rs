//! Shared test fixtures: the canonical free-tumbler parameter table and a
//! synthetic observation set generated from known parameters.

use crate::chi2::{Chi2Config, Evaluator};
use crate::data::{Observation, ObservationSet};
use crate::params::{Bounds, ParamDescriptor, ParamKind, ParamTable, Periodicity};

/// Eight-parameter single-segment table of a freely tumbling body.
pub(crate) fn free_tumbler_table() -> ParamTable {
    shared_free_tumbler_table(1)
}

/// The same eight parameters, all on segment 0, for a set of `n_segments`
/// segments sharing them.
pub(crate) fn shared_free_tumbler_table(n_segments: usize) -> ParamTable {
    let mut bounds = Bounds::new();
    bounds.set(ParamKind::Momentum, 5.0, 50.0);
    bounds.set(ParamKind::CTumb, (0.3_f64).ln(), (0.95_f64).ln());
    bounds.set(ParamKind::BTumb, 0.0, 1.0);
    let descriptors = vec![
        ParamDescriptor::new(ParamKind::ThetaM, 0, true, Periodicity::Periodic),
        ParamDescriptor::new(ParamKind::PhiM, 0, true, Periodicity::Periodic),
        ParamDescriptor::new(ParamKind::Phi0, 0, true, Periodicity::Periodic),
        ParamDescriptor::new(ParamKind::Momentum, 0, true, Periodicity::HardBoth),
        ParamDescriptor::new(ParamKind::CTumb, 0, true, Periodicity::HardBoth),
        ParamDescriptor::new(ParamKind::BTumb, 0, false, Periodicity::HardBoth),
        ParamDescriptor::new(ParamKind::Energy, 0, false, Periodicity::HardBoth),
        ParamDescriptor::new(ParamKind::Psi0, 0, false, Periodicity::PeriodicLam),
    ];
    ParamTable::new(descriptors, bounds, n_segments).unwrap()
}

/// Ground-truth physical values for any table built from the fixture kinds;
/// optional extensions default to inert values (zero torque and trend,
/// photometric axes equal to the kinematic ones).
pub(crate) fn true_params(table: &ParamTable) -> Vec<f64> {
    table
        .descriptors()
        .iter()
        .map(|d| match d.kind {
            ParamKind::ThetaM => 1.0,
            ParamKind::PhiM => 2.0,
            ParamKind::Phi0 => 0.5,
            ParamKind::Momentum => 20.0,
            ParamKind::CTumb => 0.5,
            ParamKind::BTumb => 0.7,
            // LAM regime for b = 0.7, c = 0.5
            ParamKind::Energy => 0.8,
            ParamKind::Psi0 => 1.2,
            ParamKind::TorqueSplit => 0.4,
            ParamKind::PhotoC => 0.5,
            ParamKind::PhotoB => 0.7,
            ParamKind::Kappa => 0.5,
            _ => 0.0,
        })
        .collect()
}

pub(crate) fn slot_of(table: &ParamTable, kind: ParamKind) -> usize {
    table.slot(kind, 0).unwrap()
}

/// Single-filter set of `n` epochs over two days whose magnitudes are the
/// model prediction for `phys` plus a 15 mag offset.
pub(crate) fn synthetic_set(table: &ParamTable, phys: &[f64], n: usize) -> ObservationSet {
    let blank: Vec<Observation> = (0..n)
        .map(|k| Observation {
            mjd: 2.0 * k as f64 / n as f64,
            mag: 0.0,
            weight: 1.0,
            filter: 0,
            sun: [1.0, 0.2, 0.1],
            earth: [0.9, 0.3, 0.15],
        })
        .collect();
    let set = ObservationSet::new(blank, 1).unwrap();
    let eval = Evaluator::new(&set, table, Chi2Config::default()).unwrap();
    let mags = eval.predict(phys, &[15.0]);

    let obs = set
        .observations()
        .iter()
        .zip(mags.iter())
        .map(|(o, &mag)| Observation { mag, ..o.clone() })
        .collect();
    ObservationSet::new(obs, 1).unwrap()
}
