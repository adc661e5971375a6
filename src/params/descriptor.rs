//! Parameter descriptors, bounds and the shared read-only parameter table.
//!
//! Every slot of the physical parameter vector carries a type tag, a segment
//! index, an independence flag, a periodicity class and a frozen/relaxed
//! flag, all fixed at setup and shared read-only by the workers.

use crate::error::TableError;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Type tag of one physical parameter slot.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Polar angle of the angular-momentum direction, rad
    ThetaM,
    /// Azimuth of the angular-momentum direction, rad
    PhiM,
    /// Initial precession Euler angle, rad
    Phi0,
    /// Angular momentum magnitude, rad/day (inverse precession period in the
    /// scan stage when the table enables period search)
    Momentum,
    /// Shortest physical axis `c`, stored bounds are in ln units
    CTumb,
    /// Intermediate physical axis `b`, searched as `ln b / ln c`
    BTumb,
    /// Dimensionless rotational energy
    Energy,
    /// Initial rotation Euler angle, rad; periodic only in LAM
    Psi0,
    /// Brightness de-trend coefficient, mag/rad of phase angle
    Trend,
    /// First-phase torque components, rad/day^2
    TorqueI,
    TorqueS,
    TorqueL,
    /// Second-phase torque components, rad/day^2
    Torque2I,
    Torque2S,
    Torque2L,
    /// Torque switch epoch as a fraction of the segment time span
    TorqueSplit,
    /// Photometric short axis, decoupled from `CTumb`
    PhotoC,
    /// Photometric intermediate axis, searched as `ln b / ln c_photo`
    PhotoB,
    /// Dark-hemisphere albedo of the two-tone sphere, stored bounds in ln units
    Kappa,
    /// Secondary rotation of the photometric frame, rad
    ThetaR,
    PhiR,
    PsiR,
}

impl ParamKind {
    pub const COUNT: usize = 22;

    pub const ALL: [ParamKind; Self::COUNT] = [
        Self::ThetaM,
        Self::PhiM,
        Self::Phi0,
        Self::Momentum,
        Self::CTumb,
        Self::BTumb,
        Self::Energy,
        Self::Psi0,
        Self::Trend,
        Self::TorqueI,
        Self::TorqueS,
        Self::TorqueL,
        Self::Torque2I,
        Self::Torque2S,
        Self::Torque2L,
        Self::TorqueSplit,
        Self::PhotoC,
        Self::PhotoB,
        Self::Kappa,
        Self::ThetaR,
        Self::PhiR,
        Self::PsiR,
    ];

    #[inline]
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|&k| k == self).unwrap()
    }

    /// Conversion strategy between physical units and the bounded linear
    /// range; adding a parameter type is an edit of this table.
    pub fn scale(self) -> Scale {
        match self {
            Self::CTumb | Self::PhotoC | Self::Kappa => Scale::Log,
            _ => Scale::Linear,
        }
    }

    /// The parameter this kind is derived from, if any; the governing
    /// parameter must precede it in the table.
    pub fn governed_by(self) -> Option<ParamKind> {
        match self {
            Self::BTumb => Some(Self::CTumb),
            Self::Energy => Some(Self::BTumb),
            Self::Psi0 => Some(Self::Energy),
            Self::PhotoB => Some(Self::PhotoC),
            _ => None,
        }
    }
}

/// How an independent non-periodic coordinate maps between physical units and
/// its bounds.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum Scale {
    Linear,
    Log,
}

/// Periodicity class of a normalized coordinate, consumed by the boundary
/// check of `to_physical`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum Periodicity {
    /// No boundary enforcement
    Free,
    /// Wraps modulo 1
    Periodic,
    /// Periodic in LAM, hard-bounded on both sides in SAM
    PeriodicLam,
    HardLeft,
    HardRight,
    HardBoth,
}

impl Periodicity {
    /// Whether a normalized coordinate `x` violates the hard limits, given
    /// the current rotation regime.
    #[inline]
    pub fn violates(self, x: f64, lam: bool) -> bool {
        let hard_left = matches!(self, Self::HardBoth | Self::HardLeft)
            || (!lam && self == Self::PeriodicLam);
        let hard_right = matches!(self, Self::HardBoth | Self::HardRight)
            || (!lam && self == Self::PeriodicLam);
        (x < 0.0 && hard_left) || (x > 1.0 && hard_right)
    }
}

/// Whether a slot takes part in the search.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum Freeze {
    /// Searched normally
    Active,
    /// Pinned to a supplied value, excluded from all simplex moves
    Frozen,
    /// Searched, and re-randomized over the full interval even during
    /// reoptimization
    Relaxed,
}

/// Descriptor of one physical parameter slot.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ParamDescriptor {
    pub kind: ParamKind,
    pub segment: usize,
    /// Directly optimized, as opposed to derived from a governing parameter
    pub independent: bool,
    pub periodicity: Periodicity,
    pub freeze: Freeze,
}

impl ParamDescriptor {
    pub fn new(
        kind: ParamKind,
        segment: usize,
        independent: bool,
        periodicity: Periodicity,
    ) -> Self {
        Self {
            kind,
            segment,
            independent,
            periodicity,
            freeze: Freeze::Active,
        }
    }
}

/// Per-type lower/upper physical bounds, in the units of [ParamKind::scale].
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Bounds {
    lo: Vec<Option<f64>>,
    hi: Vec<Option<f64>>,
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new()
    }
}

impl Bounds {
    pub fn new() -> Self {
        Self {
            lo: vec![None; ParamKind::COUNT],
            hi: vec![None; ParamKind::COUNT],
        }
    }

    pub fn set(&mut self, kind: ParamKind, lo: f64, hi: f64) -> &mut Self {
        self.lo[kind.index()] = Some(lo);
        self.hi[kind.index()] = Some(hi);
        self
    }

    pub fn get(&self, kind: ParamKind) -> Option<(f64, f64)> {
        Some((self.lo[kind.index()]?, self.hi[kind.index()]?))
    }
}

/// Shared read-only table of descriptors and bounds; one instance per run,
/// loaded once and read by every worker.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ParamTable {
    descriptors: Vec<ParamDescriptor>,
    bounds: Bounds,
    n_segments: usize,
    /// kind-major slot lookup: `kind.index() * n_segments + segment`
    index: Vec<Option<usize>>,
    frozen_values: Vec<f64>,
    /// Maximum allowed `|ln b_photo - ln b_tumb|` (and the `c` analogue)
    /// before a candidate is rejected
    photo_dev_max: f64,
    /// Scan-stage momentum coordinate carries an inverse precession period
    /// instead of a physical momentum
    momentum_by_period: bool,
}

impl ParamTable {
    pub fn new(
        descriptors: Vec<ParamDescriptor>,
        bounds: Bounds,
        n_segments: usize,
    ) -> Result<Self, TableError> {
        let mut index = vec![None; ParamKind::COUNT * n_segments];
        for (slot, d) in descriptors.iter().enumerate() {
            if d.segment >= n_segments {
                return Err(TableError::BadSegment {
                    segment: d.segment,
                    n_segments,
                });
            }
            let i = d.kind.index() * n_segments + d.segment;
            if index[i].is_some() {
                return Err(TableError::DuplicateParam {
                    kind: d.kind,
                    segment: d.segment,
                });
            }
            index[i] = Some(slot);
            // Dependent parameters are reconstructed in table order, so their
            // governing parameters must already be converted
            if let Some(requires) = d.kind.governed_by() {
                let governing = index[requires.index() * n_segments]
                    .or(index[requires.index() * n_segments + d.segment]);
                if governing.is_none_or(|g| g >= slot) {
                    return Err(TableError::MissingDependency {
                        kind: d.kind,
                        requires,
                    });
                }
            }
            // Ratio-mapped kinds read their bounds whatever the periodicity
            let needs_bounds = (d.periodicity != Periodicity::Periodic
                || matches!(d.kind, ParamKind::BTumb | ParamKind::PhotoB))
                && !matches!(d.kind, ParamKind::Energy | ParamKind::Psi0);
            if needs_bounds && bounds.get(d.kind).is_none() {
                return Err(TableError::MissingBounds { kind: d.kind });
            }
        }
        let frozen_values = vec![0.0; descriptors.len()];
        Ok(Self {
            descriptors,
            bounds,
            n_segments,
            index,
            frozen_values,
            photo_dev_max: f64::INFINITY,
            momentum_by_period: false,
        })
    }

    pub fn with_photo_dev_max(mut self, dev: f64) -> Self {
        self.photo_dev_max = dev;
        self
    }

    pub fn with_momentum_by_period(mut self, enabled: bool) -> Self {
        self.momentum_by_period = enabled;
        self
    }

    /// Pin a slot to `value` and exclude it from the search.
    pub fn freeze(&mut self, kind: ParamKind, segment: usize, value: f64) {
        if let Some(slot) = self.slot(kind, segment) {
            self.descriptors[slot].freeze = Freeze::Frozen;
            self.frozen_values[slot] = value;
        }
    }

    /// Number of parameter slots (the simplex dimension).
    #[inline]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Number of slots actually searched (frozen ones excluded); enters the
    /// chi-squared degrees of freedom.
    pub fn n_fitted(&self) -> usize {
        self.descriptors
            .iter()
            .filter(|d| d.freeze != Freeze::Frozen)
            .count()
    }

    #[inline]
    pub fn n_segments(&self) -> usize {
        self.n_segments
    }

    pub fn descriptors(&self) -> &[ParamDescriptor] {
        &self.descriptors
    }

    #[inline]
    pub fn descriptor(&self, slot: usize) -> &ParamDescriptor {
        &self.descriptors[slot]
    }

    #[inline]
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    #[inline]
    pub fn photo_dev_max(&self) -> f64 {
        self.photo_dev_max
    }

    #[inline]
    pub fn momentum_by_period(&self) -> bool {
        self.momentum_by_period
    }

    #[inline]
    pub fn frozen_value(&self, slot: usize) -> f64 {
        self.frozen_values[slot]
    }

    /// Slot of `(kind, segment)`, falling back to segment 0 for parameters
    /// shared between segments. Segment indices beyond the declared count
    /// resolve to segment 0 as well, never to another kind's slot.
    pub fn slot(&self, kind: ParamKind, segment: usize) -> Option<usize> {
        let segment = if segment < self.n_segments { segment } else { 0 };
        self.index[kind.index() * self.n_segments + segment]
            .or(self.index[kind.index() * self.n_segments])
    }

    /// Physical value of `(kind, segment)` in `phys`, if the table has it.
    pub fn value(&self, phys: &[f64], kind: ParamKind, segment: usize) -> Option<f64> {
        self.slot(kind, segment).map(|slot| phys[slot])
    }

    pub fn has(&self, kind: ParamKind) -> bool {
        self.index[kind.index() * self.n_segments..(kind.index() + 1) * self.n_segments]
            .iter()
            .any(Option::is_some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::free_tumbler_table;

    #[test]
    fn canonical_table_shape() {
        let table = free_tumbler_table();
        assert_eq!(table.len(), 8);
        assert_eq!(table.n_fitted(), 8);
        assert!(table.has(ParamKind::Energy));
        assert!(!table.has(ParamKind::Trend));
    }

    #[test]
    fn duplicate_slot_is_rejected() {
        let mut bounds = Bounds::new();
        bounds.set(ParamKind::Momentum, 5.0, 50.0);
        let descriptors = vec![
            ParamDescriptor::new(ParamKind::Momentum, 0, true, Periodicity::HardBoth),
            ParamDescriptor::new(ParamKind::Momentum, 0, true, Periodicity::HardBoth),
        ];
        let err = ParamTable::new(descriptors, bounds, 1).unwrap_err();
        assert_eq!(
            err,
            TableError::DuplicateParam {
                kind: ParamKind::Momentum,
                segment: 0
            }
        );
    }

    #[test]
    fn dependent_param_requires_governing_one() {
        let mut bounds = Bounds::new();
        bounds.set(ParamKind::BTumb, 0.0, 1.0);
        let descriptors = vec![ParamDescriptor::new(
            ParamKind::BTumb,
            0,
            false,
            Periodicity::HardBoth,
        )];
        let err = ParamTable::new(descriptors, bounds, 1).unwrap_err();
        assert_eq!(
            err,
            TableError::MissingDependency {
                kind: ParamKind::BTumb,
                requires: ParamKind::CTumb
            }
        );
    }

    #[test]
    fn missing_bounds_are_rejected() {
        let descriptors = vec![ParamDescriptor::new(
            ParamKind::Momentum,
            0,
            true,
            Periodicity::HardBoth,
        )];
        let err = ParamTable::new(descriptors, Bounds::new(), 1).unwrap_err();
        assert_eq!(
            err,
            TableError::MissingBounds {
                kind: ParamKind::Momentum
            }
        );
    }

    #[test]
    fn out_of_range_segment_resolves_to_the_shared_slot() {
        let table = free_tumbler_table();
        // An over-long segment index must land on segment 0 of the same
        // kind, not on a neighbouring kind's slot.
        assert_eq!(table.slot(ParamKind::CTumb, 3), table.slot(ParamKind::CTumb, 0));
        assert_eq!(table.slot(ParamKind::Psi0, 7), table.slot(ParamKind::Psi0, 0));
        assert_eq!(table.slot(ParamKind::Trend, 5), None);
    }

    #[test]
    fn frozen_slots_leave_the_fit() {
        let mut table = free_tumbler_table();
        table.freeze(ParamKind::ThetaM, 0, 1.0);
        assert_eq!(table.n_fitted(), 7);
        assert_eq!(table.descriptor(0).freeze, Freeze::Frozen);
        assert_eq!(table.frozen_value(0), 1.0);
    }

    #[test]
    fn periodicity_boundary_rules() {
        assert!(Periodicity::HardBoth.violates(-0.01, true));
        assert!(Periodicity::HardBoth.violates(1.01, true));
        assert!(!Periodicity::HardLeft.violates(1.01, true));
        assert!(Periodicity::HardLeft.violates(-0.01, true));
        assert!(!Periodicity::HardRight.violates(-0.01, true));
        assert!(Periodicity::HardRight.violates(1.01, true));
        // psi_0 is only bounded in SAM
        assert!(Periodicity::PeriodicLam.violates(1.01, false));
        assert!(!Periodicity::PeriodicLam.violates(1.01, true));
        assert!(!Periodicity::Periodic.violates(1.01, false));
        assert!(!Periodicity::Free.violates(-5.0, false));
    }
}
