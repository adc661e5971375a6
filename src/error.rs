/// Score assigned to candidate points that cannot be evaluated.
///
/// Any non-finite chi-squared is mapped to this value before it takes part in
/// a minimum comparison, so NaN can never win a reduction.
pub const SENTINEL_SCORE: f64 = 1e30;

/// Error returned from [crate::Evaluator]
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EvalError {
    #[error("filter {filter} has zero total weight")]
    ZeroWeightFilter { filter: usize },

    #[error(
        "non-positive degrees of freedom: {n_obs} observations, {n_free} free parameters, \
         {n_filters} filters"
    )]
    NonPositiveDof {
        n_obs: usize,
        n_free: usize,
        n_filters: usize,
    },

    #[error("model magnitude is not finite")]
    NonFiniteModel,
}

/// A candidate search point landed outside the hard parameter limits.
///
/// This is an expected, frequent outcome of random placement and simplex
/// moves; the optimizer converts it to [SENTINEL_SCORE] and carries on.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("candidate point is outside the hard parameter limits")]
pub struct BoundaryViolation;

/// Error returned from [crate::ObservationSet] constructors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DataError {
    #[error("observation set is empty")]
    Empty,

    #[error("epochs must increase monotonically within a segment (observation {index})")]
    UnsortedEpochs { index: usize },

    #[error("filter index {filter} of observation {index} is out of range ({n_filters} filters)")]
    FilterOutOfRange {
        index: usize,
        filter: usize,
        n_filters: usize,
    },

    #[error("segment boundaries must start at zero and increase within the set")]
    BadSegmentBounds,
}

/// Error returned from [crate::ParamTable] construction
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TableError {
    #[error("parameter {kind:?} appears twice for segment {segment}")]
    DuplicateParam {
        kind: crate::params::ParamKind,
        segment: usize,
    },

    #[error("parameter {kind:?} requires {requires:?} earlier in the table")]
    MissingDependency {
        kind: crate::params::ParamKind,
        requires: crate::params::ParamKind,
    },

    #[error("parameter {kind:?} has no bounds")]
    MissingBounds { kind: crate::params::ParamKind },

    #[error("parameter segment {segment} exceeds the declared segment count {n_segments}")]
    BadSegment { segment: usize, n_segments: usize },

    #[error("parameter {kind:?} is required by the evaluator but missing from the table")]
    MissingParam { kind: crate::params::ParamKind },

    #[error(
        "observation set has {set_segments} segments but the table declares {table_segments}"
    )]
    SegmentMismatch {
        set_segments: usize,
        table_segments: usize,
    },
}
